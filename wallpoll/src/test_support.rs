//! Test-only doubles for the network and the desktop.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::core::digest::sha256_hex;
use crate::core::types::CompareMode;
use crate::cycle::CycleContext;
use crate::io::config::SourceConfig;
use crate::io::desktop::WallpaperSetter;
use crate::io::http::{Download, Fetcher, TextRequest};

/// A cycle context polling `<base_url>/metadata.txt`, with cache and state in a
/// fresh temp dir. Keep the returned `TempDir` alive for the test's duration.
pub fn raw_context(
    base_url: &str,
    compare: CompareMode,
) -> Result<(tempfile::TempDir, CycleContext)> {
    let temp = tempfile::tempdir().context("create temp dir")?;
    let ctx = CycleContext {
        source: SourceConfig::Raw {
            base_url: base_url.to_string(),
            metadata_file: "metadata.txt".to_string(),
        },
        compare,
        cache_dir: temp.path().join("cache"),
        state_path: temp.path().join("state.json"),
    };
    Ok((temp, ctx))
}

/// Serves canned bodies keyed by URL and records every request.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    texts: RefCell<HashMap<String, String>>,
    files: RefCell<HashMap<String, Vec<u8>>>,
    text_requests: RefCell<Vec<String>>,
    downloads: RefCell<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, url: &str, body: &str) -> Self {
        self.set_text(url, body);
        self
    }

    pub fn with_file(self, url: &str, bytes: &[u8]) -> Self {
        self.set_file(url, bytes);
        self
    }

    /// Replace the body served for `url` (e.g. to publish a new wallpaper).
    pub fn set_text(&self, url: &str, body: &str) {
        self.texts
            .borrow_mut()
            .insert(url.to_string(), body.to_string());
    }

    pub fn set_file(&self, url: &str, bytes: &[u8]) {
        self.files
            .borrow_mut()
            .insert(url.to_string(), bytes.to_vec());
    }

    /// URLs passed to `download`, in call order.
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.borrow().clone()
    }

    pub fn text_requests(&self) -> Vec<String> {
        self.text_requests.borrow().clone()
    }
}

impl Fetcher for ScriptedFetcher {
    fn get_text(&self, request: &TextRequest<'_>) -> Result<String> {
        self.text_requests.borrow_mut().push(request.url.to_string());
        self.texts
            .borrow()
            .get(request.url)
            .cloned()
            .ok_or_else(|| anyhow!("GET {} failed: HTTP 404", request.url))
    }

    fn download(&self, url: &str, dest: &Path) -> Result<Download> {
        self.downloads.borrow_mut().push(url.to_string());
        let bytes = self
            .files
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("GET {url} failed: HTTP 404"))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(dest, &bytes).with_context(|| format!("write {}", dest.display()))?;
        Ok(Download {
            path: dest.to_path_buf(),
            sha256: sha256_hex(&bytes),
            bytes: bytes.len() as u64,
        })
    }
}

/// Records applied paths instead of touching the desktop.
#[derive(Debug, Default)]
pub struct RecordingSetter {
    applied: RefCell<Vec<PathBuf>>,
    fail: Cell<bool>,
}

impl RecordingSetter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `apply` calls fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.set(fail);
    }

    pub fn applied(&self) -> Vec<PathBuf> {
        self.applied.borrow().clone()
    }
}

impl WallpaperSetter for RecordingSetter {
    fn apply(&self, image: &Path) -> Result<()> {
        if self.fail.get() {
            return Err(anyhow!("gsettings exited with status Some(1)"));
        }
        self.applied.borrow_mut().push(image.to_path_buf());
        Ok(())
    }
}
