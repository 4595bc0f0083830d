//! Orchestration for a single poll cycle.
//!
//! A cycle resolves the remote descriptor, decides whether anything changed,
//! downloads and applies the image when needed, and persists the state record.
//! The record is written only after a successful apply, so a failed cycle is
//! retried from scratch on the next tick.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::decision::{Action, Precheck, after_download, precheck};
use crate::core::descriptor::validate_file_name;
use crate::core::digest::sha256_hex;
use crate::core::types::{CompareMode, StateRecord};
use crate::io::config::{SourceConfig, WallpollConfig};
use crate::io::desktop::WallpaperSetter;
use crate::io::http::Fetcher;
use crate::io::paths::AppPaths;
use crate::io::source::resolve_remote;
use crate::io::state_store::{load_state, temp_path, write_state};

const IMAGES_DIR: &str = "images";

/// Everything a cycle needs besides its I/O adapters.
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub source: SourceConfig,
    pub compare: CompareMode,
    pub cache_dir: PathBuf,
    pub state_path: PathBuf,
}

impl CycleContext {
    pub fn new(cfg: &WallpollConfig, paths: &AppPaths) -> Self {
        Self {
            source: cfg.source.clone(),
            compare: cfg.compare,
            cache_dir: paths.cache_dir.clone(),
            state_path: paths.state_path.clone(),
        }
    }

    /// Downloaded images live here, apart from the state file.
    pub fn images_dir(&self) -> PathBuf {
        self.cache_dir.join(IMAGES_DIR)
    }
}

/// Result of a single cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The remote still names the applied image; nothing was downloaded.
    Unchanged { identifier: String },
    /// A new identifier was downloaded but its bytes match the applied image.
    SameContent { identifier: String },
    /// A new image was downloaded and applied.
    Updated {
        identifier: String,
        path: PathBuf,
        sha256: String,
    },
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unchanged { .. } => "unchanged",
            Self::SameContent { .. } => "same-content",
            Self::Updated { .. } => "updated",
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            Self::Unchanged { identifier }
            | Self::SameContent { identifier }
            | Self::Updated { identifier, .. } => identifier,
        }
    }
}

/// Run one poll cycle.
#[instrument(skip_all, fields(state = %ctx.state_path.display()))]
pub fn run_cycle(
    ctx: &CycleContext,
    fetcher: &dyn Fetcher,
    setter: &dyn WallpaperSetter,
) -> Result<CycleOutcome> {
    info!("checking for updates");
    let resolved = resolve_remote(&ctx.source, fetcher)?;
    let remote = resolved.image;
    validate_file_name(&remote.file_name)?;

    let previous = load_state(&ctx.state_path)?;
    let cached_file_exists = previous
        .as_ref()
        .is_some_and(|record| Path::new(&record.local_path).is_file());
    if precheck(
        previous.as_ref(),
        &resolved.source_url,
        &remote,
        cached_file_exists,
    ) == Precheck::UpToDate
    {
        info!(identifier = %remote.identifier, "wallpaper is already up to date");
        return Ok(CycleOutcome::Unchanged {
            identifier: remote.identifier,
        });
    }

    // Taken before the download, which may overwrite the applied file in place.
    let previous_digest = match (ctx.compare, previous.as_ref()) {
        (CompareMode::Hash, Some(record)) => applied_digest(record),
        _ => None,
    };

    let dest = ctx.images_dir().join(&remote.file_name);
    if dest == ctx.state_path || dest == temp_path(&ctx.state_path) {
        bail!(
            "image {} would overwrite the state file {}",
            remote.file_name,
            ctx.state_path.display()
        );
    }
    let download = fetcher
        .download(&remote.url, &dest)
        .context("download wallpaper")?;
    let local_path = absolute_string(&download.path)?;

    if after_download(ctx.compare, previous_digest.as_deref(), &download.sha256)
        == Action::SkipSameContent
    {
        let updated_at = previous
            .as_ref()
            .map(|record| record.updated_at.clone())
            .unwrap_or_else(now_rfc3339);
        let record = StateRecord {
            source: resolved.source_url,
            identifier: remote.identifier.clone(),
            sha256: Some(download.sha256),
            local_path,
            updated_at,
        };
        write_state(&ctx.state_path, &record).context("update local wallpaper record")?;
        if let Some(prev) = &previous {
            prune_previous(&ctx.cache_dir, prev, &download.path);
        }
        info!(identifier = %remote.identifier, "content unchanged, skipping apply");
        return Ok(CycleOutcome::SameContent {
            identifier: remote.identifier,
        });
    }

    setter
        .apply(&download.path)
        .context("apply wallpaper")?;

    let record = StateRecord {
        source: resolved.source_url,
        identifier: remote.identifier.clone(),
        sha256: Some(download.sha256.clone()),
        local_path,
        updated_at: now_rfc3339(),
    };
    write_state(&ctx.state_path, &record).context("update local wallpaper record")?;
    if let Some(prev) = &previous {
        prune_previous(&ctx.cache_dir, prev, &download.path);
    }

    info!(identifier = %remote.identifier, "wallpaper updated");
    Ok(CycleOutcome::Updated {
        identifier: remote.identifier,
        path: download.path,
        sha256: download.sha256,
    })
}

/// Digest of the applied image: recorded, or recomputed from the cached file.
fn applied_digest(record: &StateRecord) -> Option<String> {
    if let Some(digest) = &record.sha256 {
        return Some(digest.clone());
    }
    match fs::read(&record.local_path) {
        Ok(bytes) => Some(sha256_hex(&bytes)),
        Err(err) => {
            debug!(err = %err, path = %record.local_path, "applied image not readable");
            None
        }
    }
}

/// Remove the previously applied image when it was replaced by a different file
/// inside the cache directory.
fn prune_previous(cache_dir: &Path, previous: &StateRecord, current: &Path) {
    let old = Path::new(&previous.local_path);
    if old == current || !old.starts_with(cache_dir) || !old.is_file() {
        return;
    }
    match fs::remove_file(old) {
        Ok(()) => debug!(path = %old.display(), "removed previous wallpaper"),
        Err(err) => warn!(err = %err, path = %old.display(), "failed to remove previous wallpaper"),
    }
}

fn absolute_string(path: &Path) -> Result<String> {
    let abs = std::path::absolute(path)
        .with_context(|| format!("resolve absolute path of {}", path.display()))?;
    abs.to_str()
        .map(str::to_string)
        .with_context(|| format!("path is not valid UTF-8: {}", abs.display()))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingSetter, ScriptedFetcher};

    const META_URL: &str = "https://walls.test/main/metadata.txt";

    fn context(root: &Path, compare: CompareMode) -> CycleContext {
        CycleContext {
            source: SourceConfig::Raw {
                base_url: "https://walls.test/main".to_string(),
                metadata_file: "metadata.txt".to_string(),
            },
            compare,
            cache_dir: root.join("cache"),
            state_path: root.join("cache/state.json"),
        }
    }

    fn publish(fetcher: &ScriptedFetcher, name: &str, bytes: &[u8]) {
        fetcher.set_text(META_URL, &format!("wallpaper: {name}\n"));
        fetcher.set_file(&format!("https://walls.test/main/{name}"), bytes);
    }

    #[test]
    fn first_cycle_downloads_applies_and_records() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = context(temp.path(), CompareMode::Hash);
        let fetcher = ScriptedFetcher::new();
        publish(&fetcher, "a.jpg", b"aaa");
        let setter = RecordingSetter::new();

        let outcome = run_cycle(&ctx, &fetcher, &setter).expect("cycle");

        let expected_path = temp.path().join("cache/images/a.jpg");
        assert_eq!(
            outcome,
            CycleOutcome::Updated {
                identifier: "a.jpg".to_string(),
                path: expected_path.clone(),
                sha256: sha256_hex(b"aaa"),
            }
        );
        assert_eq!(setter.applied(), vec![expected_path.clone()]);

        let record = load_state(&ctx.state_path).expect("load").expect("record");
        assert_eq!(record.source, META_URL);
        assert_eq!(record.identifier, "a.jpg");
        assert_eq!(record.sha256, Some(sha256_hex(b"aaa")));
        assert_eq!(record.local_path, expected_path.display().to_string());
    }

    #[test]
    fn image_named_like_state_file_cannot_clobber_it() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = context(temp.path(), CompareMode::Hash);
        let fetcher = ScriptedFetcher::new();
        publish(&fetcher, "state.json", b"\xff\xd8 not json");
        let setter = RecordingSetter::new();
        setter.set_failing(true);

        run_cycle(&ctx, &fetcher, &setter).expect_err("apply fails");
        assert!(!ctx.state_path.exists());

        setter.set_failing(false);
        let outcome = run_cycle(&ctx, &fetcher, &setter).expect("retry");
        assert_eq!(outcome.label(), "updated");
        let record = load_state(&ctx.state_path).expect("load").expect("record");
        assert_eq!(record.identifier, "state.json");
        assert_eq!(
            fs::read(temp.path().join("cache/images/state.json")).expect("image"),
            b"\xff\xd8 not json"
        );
    }

    #[test]
    fn state_path_inside_images_dir_is_refused() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ctx = context(temp.path(), CompareMode::Hash);
        ctx.state_path = temp.path().join("cache/images/wall.json");
        let fetcher = ScriptedFetcher::new();
        publish(&fetcher, "wall.json.tmp", b"bytes");
        let setter = RecordingSetter::new();

        let err = run_cycle(&ctx, &fetcher, &setter).expect_err("collision");
        assert!(err.to_string().contains("would overwrite the state file"));
        assert!(fetcher.downloads().is_empty());

        publish(&fetcher, "wall.json", b"bytes");
        run_cycle(&ctx, &fetcher, &setter).expect_err("collision");
        assert!(fetcher.downloads().is_empty());
        assert!(setter.applied().is_empty());
    }

    #[test]
    fn unchanged_descriptor_skips_download_and_apply() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = context(temp.path(), CompareMode::Hash);
        let fetcher = ScriptedFetcher::new();
        publish(&fetcher, "a.jpg", b"aaa");
        let setter = RecordingSetter::new();

        run_cycle(&ctx, &fetcher, &setter).expect("first");
        let before = fs::read_to_string(&ctx.state_path).expect("state");
        let outcome = run_cycle(&ctx, &fetcher, &setter).expect("second");

        assert_eq!(outcome.label(), "unchanged");
        assert_eq!(fetcher.text_requests(), vec![META_URL.to_string(); 2]);
        assert_eq!(fetcher.downloads().len(), 1);
        assert_eq!(setter.applied().len(), 1);
        assert_eq!(fs::read_to_string(&ctx.state_path).expect("state"), before);
    }

    #[test]
    fn new_wallpaper_is_applied_and_old_one_pruned() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = context(temp.path(), CompareMode::Hash);
        let fetcher = ScriptedFetcher::new();
        publish(&fetcher, "a.jpg", b"aaa");
        let setter = RecordingSetter::new();
        run_cycle(&ctx, &fetcher, &setter).expect("first");

        publish(&fetcher, "b.jpg", b"bbb");
        let outcome = run_cycle(&ctx, &fetcher, &setter).expect("second");

        assert_eq!(outcome.label(), "updated");
        assert_eq!(outcome.identifier(), "b.jpg");
        assert_eq!(setter.applied().len(), 2);
        assert!(!temp.path().join("cache/images/a.jpg").exists());
        assert!(temp.path().join("cache/images/b.jpg").is_file());
    }

    #[test]
    fn hash_mode_skips_apply_for_renamed_identical_image() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = context(temp.path(), CompareMode::Hash);
        let fetcher = ScriptedFetcher::new();
        publish(&fetcher, "a.jpg", b"same");
        let setter = RecordingSetter::new();
        run_cycle(&ctx, &fetcher, &setter).expect("first");
        let first = load_state(&ctx.state_path).expect("load").expect("record");

        publish(&fetcher, "copy.jpg", b"same");
        let outcome = run_cycle(&ctx, &fetcher, &setter).expect("second");

        assert_eq!(
            outcome,
            CycleOutcome::SameContent {
                identifier: "copy.jpg".to_string()
            }
        );
        assert_eq!(setter.applied().len(), 1);
        let record = load_state(&ctx.state_path).expect("load").expect("record");
        assert_eq!(record.identifier, "copy.jpg");
        assert_eq!(record.updated_at, first.updated_at);
    }

    #[test]
    fn name_mode_applies_renamed_identical_image() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = context(temp.path(), CompareMode::Name);
        let fetcher = ScriptedFetcher::new();
        publish(&fetcher, "a.jpg", b"same");
        let setter = RecordingSetter::new();
        run_cycle(&ctx, &fetcher, &setter).expect("first");

        publish(&fetcher, "copy.jpg", b"same");
        let outcome = run_cycle(&ctx, &fetcher, &setter).expect("second");

        assert_eq!(outcome.label(), "updated");
        assert_eq!(setter.applied().len(), 2);
    }

    #[test]
    fn failed_apply_leaves_record_untouched_and_retries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = context(temp.path(), CompareMode::Hash);
        let fetcher = ScriptedFetcher::new();
        publish(&fetcher, "a.jpg", b"aaa");
        let setter = RecordingSetter::new();
        setter.set_failing(true);

        let err = run_cycle(&ctx, &fetcher, &setter).expect_err("apply fails");
        assert!(format!("{err:#}").contains("apply wallpaper"));
        assert!(!ctx.state_path.exists());

        setter.set_failing(false);
        let outcome = run_cycle(&ctx, &fetcher, &setter).expect("retry");
        assert_eq!(outcome.label(), "updated");
        assert_eq!(fetcher.downloads().len(), 2);
    }

    #[test]
    fn missing_cached_file_triggers_redownload() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = context(temp.path(), CompareMode::Hash);
        let fetcher = ScriptedFetcher::new();
        publish(&fetcher, "a.jpg", b"aaa");
        let setter = RecordingSetter::new();
        run_cycle(&ctx, &fetcher, &setter).expect("first");

        fs::remove_file(temp.path().join("cache/images/a.jpg")).expect("remove");
        let outcome = run_cycle(&ctx, &fetcher, &setter).expect("second");

        // Same bytes as the recorded digest: restored without re-applying.
        assert_eq!(outcome.label(), "same-content");
        assert_eq!(fetcher.downloads().len(), 2);
        assert!(temp.path().join("cache/images/a.jpg").is_file());
    }

    #[test]
    fn unsafe_file_name_is_rejected_before_download() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = context(temp.path(), CompareMode::Hash);
        let fetcher = ScriptedFetcher::new().with_text(META_URL, "wallpaper: ../../.bashrc\n");
        let setter = RecordingSetter::new();

        let err = run_cycle(&ctx, &fetcher, &setter).expect_err("unsafe name");
        assert!(err.to_string().contains("path separators"));
        assert!(fetcher.downloads().is_empty());
        assert!(setter.applied().is_empty());
    }

    #[test]
    fn record_without_digest_is_rehashed_from_cache() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ctx = context(temp.path(), CompareMode::Hash);
        let cached = temp.path().join("cache/old.jpg");
        fs::create_dir_all(cached.parent().expect("parent")).expect("mkdir");
        fs::write(&cached, b"same").expect("seed");
        write_state(
            &ctx.state_path,
            &StateRecord {
                source: META_URL.to_string(),
                identifier: "old.jpg".to_string(),
                sha256: None,
                local_path: cached.display().to_string(),
                updated_at: "2026-01-01T00:00:00+00:00".to_string(),
            },
        )
        .expect("seed state");

        let fetcher = ScriptedFetcher::new();
        publish(&fetcher, "new.jpg", b"same");
        let setter = RecordingSetter::new();
        let outcome = run_cycle(&ctx, &fetcher, &setter).expect("cycle");

        assert_eq!(outcome.label(), "same-content");
        assert!(setter.applied().is_empty());
    }
}
