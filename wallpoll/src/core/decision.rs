//! Update decisions: whether a cycle needs to download, and whether a
//! downloaded image needs to be applied.

use crate::core::types::{CompareMode, RemoteImage, StateRecord};

/// Decision taken before any download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precheck {
    /// The previous record already covers this remote image.
    UpToDate,
    /// The image must be downloaded.
    Fetch,
}

/// Decision taken once the image has been downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Apply,
    /// Content is byte-identical to the applied image; only the record changes.
    SkipSameContent,
}

/// Compare the previous record against the resolved remote image.
///
/// Up to date only when the source and identifier match and the cached file
/// the record points at still exists.
pub fn precheck(
    previous: Option<&StateRecord>,
    source: &str,
    remote: &RemoteImage,
    cached_file_exists: bool,
) -> Precheck {
    match previous {
        Some(record)
            if record.source == source
                && record.identifier == remote.identifier
                && cached_file_exists =>
        {
            Precheck::UpToDate
        }
        _ => Precheck::Fetch,
    }
}

pub fn after_download(
    mode: CompareMode,
    previous_digest: Option<&str>,
    new_digest: &str,
) -> Action {
    match (mode, previous_digest) {
        (CompareMode::Hash, Some(prev)) if prev.eq_ignore_ascii_case(new_digest) => {
            Action::SkipSameContent
        }
        _ => Action::Apply,
    }
}
