//! Parsing of remote descriptors (`metadata.txt` listings and release JSON).

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde::Deserialize;

/// Key naming the current image in a raw `metadata.txt` listing.
pub const METADATA_KEY: &str = "wallpaper";

/// Default pattern used to pick an image asset out of a release.
pub const DEFAULT_ASSET_PATTERN: &str = r"(?i)\.(jpe?g|png|webp|bmp)$";

/// Extract the wallpaper file name from a raw listing.
///
/// Lines look like `wallpaper: name.jpg`. Later lines override earlier ones;
/// lines with other keys are ignored.
pub fn parse_metadata(text: &str) -> Result<String> {
    let mut wallpaper = None;
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim() == METADATA_KEY {
            wallpaper = Some(value.trim().to_string());
        }
    }

    match wallpaper {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(anyhow!("wallpaper not specified in metadata")),
    }
}

/// Subset of the GitHub "latest release" payload that wallpoll reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

impl Release {
    /// Identifier recorded for an asset of this release.
    pub fn identifier_for(&self, asset: &ReleaseAsset) -> String {
        format!("{}/{}", self.tag_name, asset.name)
    }
}

pub fn parse_release(json: &str) -> Result<Release> {
    serde_json::from_str(json).context("parse release json")
}

/// Pick the first asset whose name matches `pattern`.
pub fn select_asset<'a>(release: &'a Release, pattern: &Regex) -> Result<&'a ReleaseAsset> {
    release
        .assets
        .iter()
        .find(|asset| pattern.is_match(&asset.name))
        .ok_or_else(|| {
            anyhow!(
                "release {} has no asset matching {}",
                release.tag_name,
                pattern.as_str()
            )
        })
}

/// Reject remote-supplied names that are not a single plain path component.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        bail!("invalid image file name {name:?}");
    }
    if name.contains(['/', '\\', '\0']) {
        bail!("image file name must not contain path separators: {name:?}");
    }
    // Dot files are reserved for partial downloads.
    if name.starts_with('.') {
        bail!("image file name must not start with '.': {name:?}");
    }
    Ok(())
}
