//! Desktop wallpaper setters.
//!
//! [`WallpaperSetter`] is the seam between the update cycle and the desktop.
//! The GNOME setter drives `gsettings`; the command setter runs a user-supplied
//! argv for every other environment.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::Url;
use tracing::{debug, info, instrument, warn};

use crate::io::config::{ApplyBackend, ApplyConfig};
use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, run_command_with_timeout};

pub const GNOME_BACKGROUND_SCHEMA: &str = "org.gnome.desktop.background";
/// Keys set for the light and dark theme, in order.
pub const GNOME_PICTURE_KEYS: [&str; 2] = ["picture-uri", "picture-uri-dark"];

const PATH_PLACEHOLDER: &str = "{path}";
const URI_PLACEHOLDER: &str = "{uri}";

/// Applies an image as the desktop wallpaper.
pub trait WallpaperSetter {
    fn apply(&self, image: &Path) -> Result<()>;
}

/// Build the setter described by `cfg`.
pub fn setter_from_config(cfg: &ApplyConfig) -> Box<dyn WallpaperSetter> {
    let timeout = Duration::from_secs(cfg.timeout_secs);
    match cfg.backend {
        ApplyBackend::Gnome => Box::new(GnomeSetter {
            timeout,
            display: cfg.display_fallback().map(str::to_string),
            picture_options: cfg.picture_options.clone(),
        }),
        ApplyBackend::Command => Box::new(CommandSetter {
            argv: cfg.command.clone(),
            timeout,
            display: cfg.display_fallback().map(str::to_string),
        }),
    }
}

/// Sets `picture-uri` and `picture-uri-dark` through `gsettings`.
#[derive(Debug, Clone)]
pub struct GnomeSetter {
    pub timeout: Duration,
    pub display: Option<String>,
    pub picture_options: Option<String>,
}

impl WallpaperSetter for GnomeSetter {
    #[instrument(skip_all, fields(image = %image.display()))]
    fn apply(&self, image: &Path) -> Result<()> {
        let abs = absolute_image_path(image)?;
        let uri = file_uri(&abs)?;
        let overrides = session_overrides(|key| std::env::var_os(key), self.display.as_deref());

        for key in GNOME_PICTURE_KEYS {
            run_setter(gsettings_command(key, &uri, &overrides), self.timeout)
                .with_context(|| format!("gsettings set {key}"))?;
        }

        if let Some(options) = &self.picture_options
            && let Err(err) = run_setter(
                gsettings_command("picture-options", options, &overrides),
                self.timeout,
            )
        {
            warn!(err = %format!("{err:#}"), "failed to set picture-options");
        }

        info!(uri = %uri, "wallpaper applied for light and dark themes");
        Ok(())
    }
}

/// Runs a configured argv with `{path}` and `{uri}` substituted.
#[derive(Debug, Clone)]
pub struct CommandSetter {
    pub argv: Vec<String>,
    pub timeout: Duration,
    pub display: Option<String>,
}

impl CommandSetter {
    fn command_for(&self, image: &Path) -> Result<Command> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("setter command is empty"))?;
        let path = image
            .to_str()
            .ok_or_else(|| anyhow!("path is not valid UTF-8"))?;
        let uri = file_uri(image)?;

        let mut cmd = Command::new(program);
        for arg in args {
            cmd.arg(
                arg.replace(PATH_PLACEHOLDER, path)
                    .replace(URI_PLACEHOLDER, &uri),
            );
        }
        for (key, value) in session_overrides(|key| std::env::var_os(key), self.display.as_deref()) {
            cmd.env(key, value);
        }
        Ok(cmd)
    }
}

impl WallpaperSetter for CommandSetter {
    #[instrument(skip_all, fields(image = %image.display()))]
    fn apply(&self, image: &Path) -> Result<()> {
        let abs = absolute_image_path(image)?;
        let cmd = self.command_for(&abs)?;
        run_setter(cmd, self.timeout).with_context(|| format!("run setter {:?}", self.argv[0]))?;
        info!(path = %abs.display(), "wallpaper applied");
        Ok(())
    }
}

fn absolute_image_path(image: &Path) -> Result<PathBuf> {
    std::path::absolute(image)
        .with_context(|| format!("resolve absolute path of {}", image.display()))
}

/// GNOME expects a percent-encoded `file://` URI.
pub fn file_uri(path: &Path) -> Result<String> {
    let url = Url::from_file_path(path)
        .map_err(|()| anyhow!("not an absolute path: {}", path.display()))?;
    Ok(url.to_string())
}

pub fn gsettings_command(key: &str, value: &str, overrides: &[(String, String)]) -> Command {
    let mut cmd = Command::new("gsettings");
    cmd.arg("set").arg(GNOME_BACKGROUND_SCHEMA).arg(key).arg(value);
    for (k, v) in overrides {
        cmd.env(k, v);
    }
    cmd
}

/// Session variables a setter needs when the service was started outside the
/// graphical session (e.g. from a plain systemd unit).
///
/// `DISPLAY` falls back to the configured value. `DBUS_SESSION_BUS_ADDRESS`
/// falls back to the per-user bus socket under `$XDG_RUNTIME_DIR`.
pub fn session_overrides<F>(env: F, display: Option<&str>) -> Vec<(String, String)>
where
    F: Fn(&str) -> Option<OsString>,
{
    let mut overrides = Vec::new();
    let is_set = |key: &str| env(key).is_some_and(|v| !v.is_empty());

    if !is_set("DISPLAY")
        && let Some(display) = display
    {
        overrides.push(("DISPLAY".to_string(), display.to_string()));
    }

    if !is_set("DBUS_SESSION_BUS_ADDRESS")
        && let Some(runtime) = env("XDG_RUNTIME_DIR").filter(|v| !v.is_empty())
    {
        let bus = PathBuf::from(runtime).join("bus");
        if bus.exists() {
            overrides.push((
                "DBUS_SESSION_BUS_ADDRESS".to_string(),
                format!("unix:path={}", bus.display()),
            ));
        }
    }

    debug!(?overrides, "setter session overrides");
    overrides
}

fn run_setter(cmd: Command, timeout: Duration) -> Result<()> {
    let output = run_command_with_timeout(cmd, timeout, DEFAULT_OUTPUT_LIMIT_BYTES)?;
    if output.timed_out {
        bail!("timed out after {timeout:?}");
    }
    if !output.status.success() {
        bail!(
            "exited with status {:?}: {}",
            output.status.code(),
            output.diagnostics()
        );
    }
    Ok(())
}
