//! Configuration stored in `config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::descriptor::DEFAULT_ASSET_PATTERN;
use crate::core::types::CompareMode;

pub const DEFAULT_BASE_URL: &str = "https://raw.githubusercontent.com/toymakerftw/wallpaper/main";
pub const DEFAULT_METADATA_FILE: &str = "metadata.txt";
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// Wallpoll configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// the values the service has always shipped with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WallpollConfig {
    /// Seconds to sleep between poll cycles.
    pub poll_interval_secs: u64,

    /// How a downloaded image is compared against the applied one.
    pub compare: CompareMode,

    /// Per-request HTTP timeout in seconds.
    pub http_timeout_secs: u64,

    /// Directory holding downloaded images. Defaults to `$XDG_CACHE_HOME/wallpoll`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// State record location. Defaults to `<cache_dir>/state.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,

    /// Append logs to this file instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    pub source: SourceConfig,

    pub apply: ApplyConfig,
}

/// Where the current wallpaper is published.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A static directory with a `metadata.txt` naming the current image.
    Raw {
        base_url: String,
        #[serde(default = "default_metadata_file")]
        metadata_file: String,
    },
    /// The latest release of a GitHub repository.
    GithubRelease {
        /// `owner/name`.
        repo: String,
        #[serde(default = "default_github_api")]
        api_base: String,
        #[serde(default = "default_asset_pattern")]
        asset_pattern: String,
        /// Environment variable holding an API token, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_env: Option<String>,
    },
}

fn default_metadata_file() -> String {
    DEFAULT_METADATA_FILE.to_string()
}

fn default_github_api() -> String {
    DEFAULT_GITHUB_API.to_string()
}

fn default_asset_pattern() -> String {
    DEFAULT_ASSET_PATTERN.to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::Raw {
            base_url: DEFAULT_BASE_URL.to_string(),
            metadata_file: default_metadata_file(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyBackend {
    /// `gsettings` on `org.gnome.desktop.background`.
    #[default]
    Gnome,
    /// An arbitrary command with `{path}` / `{uri}` placeholders.
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApplyConfig {
    pub backend: ApplyBackend,

    /// Command for the `command` backend (e.g. `["feh", "--bg-fill", "{path}"]`).
    pub command: Vec<String>,

    /// Wall-clock limit for each setter invocation in seconds.
    pub timeout_secs: u64,

    /// `DISPLAY` handed to the setter when the service runs without one.
    /// An empty string disables the fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    /// GNOME `picture-options` value (e.g. `zoom`), set best-effort.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture_options: Option<String>,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            backend: ApplyBackend::Gnome,
            command: Vec::new(),
            timeout_secs: 10,
            display: Some(":0".to_string()),
            picture_options: None,
        }
    }
}

impl ApplyConfig {
    /// Configured `DISPLAY` fallback, if any.
    pub fn display_fallback(&self) -> Option<&str> {
        self.display
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

impl Default for WallpollConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            compare: CompareMode::Hash,
            http_timeout_secs: 30,
            cache_dir: None,
            state_path: None,
            log_file: None,
            source: SourceConfig::default(),
            apply: ApplyConfig::default(),
        }
    }
}

impl WallpollConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("poll_interval_secs must be > 0"));
        }
        if self.http_timeout_secs == 0 {
            return Err(anyhow!("http_timeout_secs must be > 0"));
        }
        if self.apply.timeout_secs == 0 {
            return Err(anyhow!("apply.timeout_secs must be > 0"));
        }
        if self.apply.backend == ApplyBackend::Command
            && (self.apply.command.is_empty() || self.apply.command[0].trim().is_empty())
        {
            return Err(anyhow!(
                "apply.command must be a non-empty array for backend \"command\""
            ));
        }
        match &self.source {
            SourceConfig::Raw {
                base_url,
                metadata_file,
            } => {
                if base_url.trim().is_empty() {
                    return Err(anyhow!("source.base_url must not be empty"));
                }
                if metadata_file.trim().is_empty() {
                    return Err(anyhow!("source.metadata_file must not be empty"));
                }
            }
            SourceConfig::GithubRelease {
                repo,
                api_base,
                asset_pattern,
                ..
            } => {
                let valid_repo = repo
                    .split_once('/')
                    .is_some_and(|(owner, name)| {
                        !owner.is_empty() && !name.is_empty() && !name.contains('/')
                    });
                if !valid_repo {
                    return Err(anyhow!("source.repo must look like \"owner/name\""));
                }
                if api_base.trim().is_empty() {
                    return Err(anyhow!("source.api_base must not be empty"));
                }
                Regex::new(asset_pattern).context("source.asset_pattern")?;
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WallpollConfig::default()`.
pub fn load_config(path: &Path) -> Result<WallpollConfig> {
    if !path.exists() {
        let cfg = WallpollConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WallpollConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &WallpollConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
