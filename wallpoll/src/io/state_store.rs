//! Storage for the last-applied wallpaper record.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::StateRecord;

/// Load the state record. A missing file means nothing has been applied yet.
pub fn load_state(path: &Path) -> Result<Option<StateRecord>> {
    debug!(path = %path.display(), "loading state");
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let record: StateRecord = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;
    debug!(identifier = %record.identifier, "state loaded");
    Ok(Some(record))
}

/// Atomically write the state record to disk (temp file + rename).
pub fn write_state(path: &Path, record: &StateRecord) -> Result<()> {
    debug!(path = %path.display(), identifier = %record.identifier, "writing state");
    let mut buf = serde_json::to_string_pretty(record)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Sibling written before the rename onto `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = temp_path(path);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace state {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> StateRecord {
        StateRecord {
            source: "https://example.test/metadata.txt".to_string(),
            identifier: "wall.jpg".to_string(),
            sha256: Some("00ff".to_string()),
            local_path: "/cache/wall.jpg".to_string(),
            updated_at: "2026-10-19T08:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn missing_state_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let loaded = load_state(&temp.path().join("state.json")).expect("load");
        assert_eq!(loaded, None);
    }

    #[test]
    fn state_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/state.json");

        write_state(&path, &record()).expect("write");
        let loaded = load_state(&path).expect("load");
        assert_eq!(loaded, Some(record()));
        assert!(!path.with_extension("json.tmp").exists());
    }

    /// Guards against accidental changes to the on-disk field order.
    #[test]
    fn state_format_is_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");

        write_state(&path, &record()).expect("write");
        let contents = fs::read_to_string(&path).expect("read");
        let expected = "{\n  \"source\": \"https://example.test/metadata.txt\",\n  \"identifier\": \"wall.jpg\",\n  \"sha256\": \"00ff\",\n  \"local_path\": \"/cache/wall.jpg\",\n  \"updated_at\": \"2026-10-19T08:00:00+00:00\"\n}\n";
        assert_eq!(contents, expected);
    }

    #[test]
    fn corrupt_state_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");
        fs::write(&path, "wall.jpg\n").expect("write");

        let err = load_state(&path).expect_err("corrupt");
        assert!(format!("{err:#}").contains("parse state"));
    }
}
