//! Image downloads
//!
//! Images are stored under a deterministic name derived from their URL, so
//! re-running a crawl maps every image to the same file. A file that already
//! exists with the advertised size is reused instead of being written again.

use crate::config::ImageConfig;
use crate::output::ImageRecord;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use url::Url;

/// Extension used when the URL path does not carry a usable one
const DEFAULT_EXTENSION: &str = "jpg";

/// Downloads images into a single directory
#[derive(Debug, Clone)]
pub struct ImageDownloader {
    client: Client,
    dest_dir: PathBuf,
    max_bytes: u64,
    timeout: Duration,
}

impl ImageDownloader {
    pub fn new(client: Client, dest_dir: impl Into<PathBuf>, config: &ImageConfig) -> Self {
        Self {
            client,
            dest_dir: dest_dir.into(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
        }
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Path the image at `url` is stored under
    pub fn local_path(&self, url: &Url) -> PathBuf {
        self.dest_dir.join(file_name_for(url))
    }

    /// Downloads one image; failures are reported in the record, never raised
    pub async fn download(&self, url: &Url) -> ImageRecord {
        let path = self.local_path(url);
        let local = path.display().to_string();

        match self.try_download(url, &path).await {
            Ok((byte_size, from_cache)) => {
                if from_cache {
                    tracing::debug!("Reusing {} for {}", local, url);
                } else {
                    tracing::debug!("Saved {} ({} bytes) to {}", url, byte_size, local);
                }
                ImageRecord::saved(url.as_str(), local, byte_size, from_cache)
            }
            Err(reason) => {
                tracing::warn!("Image {} failed: {}", url, reason);
                ImageRecord::failed(url.as_str(), local, reason)
            }
        }
    }

    async fn try_download(&self, url: &Url, path: &Path) -> Result<(u64, bool), String> {
        let mut response = self
            .client
            .get(url.as_str())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(describe_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            return Err(format!("not an image (content-type {:?})", content_type));
        }

        let advertised = response.content_length();
        if let Some(length) = advertised {
            if length > self.max_bytes {
                return Err(format!(
                    "too large ({} bytes, limit {})",
                    length, self.max_bytes
                ));
            }
            if existing_size(path).await == Some(length) {
                return Ok((length, true));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(describe_error)? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(format!("too large (over {} bytes)", self.max_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        let byte_size = body.len() as u64;
        let dir = self.dest_dir.clone();
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &body))
            .await
            .map_err(|e| format!("write task failed: {}", e))?
            .map_err(|e| format!("write failed: {}", e))?;

        Ok((byte_size, false))
    }
}

/// Deterministic file name: SHA-256 of the URL plus the path's extension
pub fn file_name_for(url: &Url) -> String {
    let digest = hex::encode(Sha256::digest(url.as_str().as_bytes()));
    format!("{}.{}", digest, extension_of(url))
}

fn extension_of(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| Path::new(last).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 5)
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

async fn existing_size(path: &Path) -> Option<u64> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

fn describe_error(error: reqwest::Error) -> String {
    if error.is_timeout() {
        "timeout".to_string()
    } else {
        format!("request failed: {}", error)
    }
}
