//! Resolution of the config, cache and state locations.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::io::config::WallpollConfig;

const APP_DIR: &str = "wallpoll";

/// Resolved filesystem locations used by a wallpoll process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub cache_dir: PathBuf,
    pub state_path: PathBuf,
}

/// Config file location: `--config` override, then `$XDG_CONFIG_HOME`, then `~/.config`.
pub fn config_path<F>(override_path: Option<&Path>, env: F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<OsString>,
{
    if let Some(path) = override_path {
        return Ok(path.to_path_buf());
    }
    Ok(xdg_dir(&env, "XDG_CONFIG_HOME", ".config")?
        .join(APP_DIR)
        .join("config.toml"))
}

impl AppPaths {
    /// Fill in unset locations from the XDG cache directory. Relative paths are
    /// made absolute against the working directory.
    pub fn resolve<F>(cfg: &WallpollConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let cache_dir = match &cfg.cache_dir {
            Some(dir) => dir.clone(),
            None => xdg_dir(&env, "XDG_CACHE_HOME", ".cache")?.join(APP_DIR),
        };
        let cache_dir = absolute(&cache_dir)?;
        let state_path = match &cfg.state_path {
            Some(path) => absolute(path)?,
            None => cache_dir.join("state.json"),
        };
        Ok(Self {
            cache_dir,
            state_path,
        })
    }

    /// Resolve against the real process environment.
    pub fn from_env(cfg: &WallpollConfig) -> Result<Self> {
        Self::resolve(cfg, |key| std::env::var_os(key))
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("resolve {}", path.display()))
}

fn xdg_dir<F>(env: &F, var: &str, home_fallback: &str) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<OsString>,
{
    if let Some(dir) = env(var).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = env("HOME")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow!("neither {var} nor HOME is set"))?;
    Ok(PathBuf::from(home).join(home_fallback))
}
