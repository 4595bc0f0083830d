//! Resolve the configured source into the image it currently publishes.

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use reqwest::Url;
use tracing::{debug, instrument};

use crate::core::descriptor::{parse_metadata, parse_release, select_asset};
use crate::core::types::RemoteImage;
use crate::io::config::SourceConfig;
use crate::io::http::{Fetcher, TextRequest};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// A resolved remote image together with the descriptor URL it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub source_url: String,
    pub image: RemoteImage,
}

/// Descriptor URL polled for `source`.
pub fn descriptor_url(source: &SourceConfig) -> String {
    match source {
        SourceConfig::Raw {
            base_url,
            metadata_file,
        } => join_url(base_url, metadata_file),
        SourceConfig::GithubRelease { repo, api_base, .. } => {
            join_url(api_base, &format!("repos/{repo}/releases/latest"))
        }
    }
}

/// Fetch the descriptor for `source` and work out which image it names.
#[instrument(skip_all)]
pub fn resolve_remote(source: &SourceConfig, fetcher: &dyn Fetcher) -> Result<Resolved> {
    let source_url = descriptor_url(source);
    let image = match source {
        SourceConfig::Raw { base_url, .. } => {
            let text = fetcher
                .get_text(&TextRequest::new(&source_url))
                .context("fetch metadata")?;
            let name = parse_metadata(&text).context("parse metadata")?;
            RemoteImage {
                url: sibling_url(base_url, &name)?,
                file_name: name.clone(),
                identifier: name,
            }
        }
        SourceConfig::GithubRelease {
            asset_pattern,
            token_env,
            ..
        } => {
            let pattern = Regex::new(asset_pattern).context("compile asset_pattern")?;
            let token = token_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|t| !t.trim().is_empty());
            let json = fetcher
                .get_text(&TextRequest {
                    url: &source_url,
                    accept: Some(GITHUB_ACCEPT),
                    bearer_token: token.as_deref(),
                })
                .context("fetch latest release")?;
            let release = parse_release(&json)?;
            let asset = select_asset(&release, &pattern)?;
            RemoteImage {
                identifier: release.identifier_for(asset),
                file_name: asset.name.clone(),
                url: asset.browser_download_url.clone(),
            }
        }
    };
    debug!(identifier = %image.identifier, url = %image.url, "remote image resolved");
    Ok(Resolved { source_url, image })
}

/// `base_url` extended by `name` as one percent-encoded path segment.
fn sibling_url(base_url: &str, name: &str) -> Result<String> {
    let mut url = Url::parse(base_url).with_context(|| format!("parse base_url {base_url}"))?;
    url.path_segments_mut()
        .map_err(|()| anyhow!("base_url cannot carry a path: {base_url}"))?
        .pop_if_empty()
        .push(name);
    Ok(url.to_string())
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
