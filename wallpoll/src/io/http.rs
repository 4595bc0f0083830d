//! Blocking HTTP access to the remote source.
//!
//! The [`Fetcher`] trait decouples the update cycle from the network. Tests
//! use scripted fetchers that serve canned bodies without opening sockets.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use tracing::{debug, info, instrument, warn};

use crate::core::digest::HashingWriter;

/// A text GET request (descriptor fetches).
#[derive(Debug, Clone, Copy)]
pub struct TextRequest<'a> {
    pub url: &'a str,
    pub accept: Option<&'a str>,
    pub bearer_token: Option<&'a str>,
}

impl<'a> TextRequest<'a> {
    pub fn new(url: &'a str) -> Self {
        Self {
            url,
            accept: None,
            bearer_token: None,
        }
    }
}

/// A completed image download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub path: PathBuf,
    pub sha256: String,
    pub bytes: u64,
}

/// Abstraction over HTTP GET.
pub trait Fetcher {
    /// GET `request.url` and return the body as text. Non-2xx is an error.
    fn get_text(&self, request: &TextRequest<'_>) -> Result<String>;

    /// GET `url` into `dest`, replacing it only once the body is complete.
    fn download(&self, url: &str, dest: &Path) -> Result<Download>;
}

/// Fetcher backed by a blocking `reqwest` client.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wallpoll/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    #[instrument(skip_all, fields(url = %request.url))]
    fn get_text(&self, request: &TextRequest<'_>) -> Result<String> {
        let mut req = self.client.get(request.url);
        if let Some(accept) = request.accept {
            req = req.header(ACCEPT, accept);
        }
        if let Some(token) = request.bearer_token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let resp = req
            .send()
            .with_context(|| format!("GET {}", request.url))?;
        let resp = ensure_success(resp, request.url)?;
        let body = resp
            .text()
            .with_context(|| format!("read body of {}", request.url))?;
        debug!(bytes = body.len(), "descriptor fetched");
        Ok(body)
    }

    #[instrument(skip_all, fields(url = %url, dest = %dest.display()))]
    fn download(&self, url: &str, dest: &Path) -> Result<Download> {
        info!("downloading image");
        let resp = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?;
        let mut resp = ensure_success(resp, url)?;

        let part_path = part_path(dest)?;
        let result = write_body(&mut resp, &part_path, url);
        let (sha256, bytes) = match result {
            Ok(done) => done,
            Err(err) => {
                if let Err(e) = fs::remove_file(&part_path) {
                    warn!(err = %e, path = %part_path.display(), "failed to remove partial download");
                }
                return Err(err);
            }
        };
        fs::rename(&part_path, dest)
            .with_context(|| format!("replace {}", dest.display()))?;

        info!(bytes, sha256 = %sha256, "image downloaded");
        Ok(Download {
            path: dest.to_path_buf(),
            sha256,
            bytes,
        })
    }
}

fn ensure_success(resp: Response, url: &str) -> Result<Response> {
    let status = resp.status();
    if !status.is_success() {
        warn!(status = status.as_u16(), url, "http request failed");
        return Err(anyhow!("GET {url} failed: HTTP {}", status.as_u16()));
    }
    Ok(resp)
}

/// `<dir>/.<name>.part`, next to `dest` so the final rename stays on one filesystem.
fn part_path(dest: &Path) -> Result<PathBuf> {
    let dir = dest
        .parent()
        .with_context(|| format!("download path missing parent {}", dest.display()))?;
    let name = dest
        .file_name()
        .and_then(|s| s.to_str())
        .with_context(|| format!("download path missing file name {}", dest.display()))?;
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    Ok(dir.join(format!(".{name}.part")))
}

fn write_body(resp: &mut Response, part_path: &Path, url: &str) -> Result<(String, u64)> {
    let file = File::create(part_path)
        .with_context(|| format!("create {}", part_path.display()))?;
    let mut writer = HashingWriter::new(BufWriter::new(file));
    resp.copy_to(&mut writer)
        .with_context(|| format!("read body of {url}"))?;
    writer.flush().context("flush download")?;
    let (_, sha256, bytes) = writer.finish();
    Ok((sha256, bytes))
}
