//! Shared deterministic types for the update cycle.
//!
//! These types define stable contracts between core components and the
//! persisted state file. They must not depend on external state or I/O.

use serde::{Deserialize, Serialize};

/// The image a remote descriptor currently points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteImage {
    /// Remote name for the image: the file name for raw listings,
    /// `<tag>/<asset>` for releases.
    pub identifier: String,
    /// File name used for the local cached copy (single path component).
    pub file_name: String,
    /// Absolute URL the image is downloaded from.
    pub url: String,
}

/// How a freshly downloaded image is compared against the applied one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    /// Apply whenever the remote identifier changes.
    Name,
    /// Apply only when the downloaded bytes differ from the applied image.
    #[default]
    Hash,
}

/// Persisted record of the last applied wallpaper (`state.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Descriptor URL the image was resolved from.
    pub source: String,
    /// Remote identifier of the applied image.
    pub identifier: String,
    /// Hex SHA-256 of the applied image content.
    pub sha256: Option<String>,
    /// Absolute path of the cached image handed to the desktop.
    pub local_path: String,
    /// RFC 3339 UTC timestamp of the last successful apply.
    pub updated_at: String,
}
