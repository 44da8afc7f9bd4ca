//! Records produced by a crawl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One successfully fetched and extracted page
///
/// Produced exactly once per page and never modified afterwards; the result
/// sink owns it until it has been flushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Normalized page URL
    pub url: String,

    /// Contents of `<title>`, if any
    pub title: Option<String>,

    /// Visible text, whitespace-collapsed
    pub text: String,

    /// Absolute URLs of every image referenced by the page
    pub image_refs: Vec<String>,

    /// Download results for the images that were attempted
    #[serde(default)]
    pub images: Vec<ImageRecord>,

    pub fetched_at: DateTime<Utc>,

    /// HTTP status code of the page response
    pub status: u16,

    /// Discovery depth (seeds are 0)
    #[serde(default)]
    pub depth: u32,
}

/// Result of one image download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub source_url: String,

    /// Where the file lives (or would have lived) on disk
    pub local_path: String,

    /// Size of the file on disk; 0 for failed downloads
    pub byte_size: u64,

    pub status: ImageStatus,

    /// True when an existing file of matching size was reused
    #[serde(skip)]
    pub from_cache: bool,
}

impl ImageRecord {
    pub fn saved(source_url: &str, local_path: String, byte_size: u64, from_cache: bool) -> Self {
        Self {
            source_url: source_url.to_string(),
            local_path,
            byte_size,
            status: ImageStatus::Saved,
            from_cache,
        }
    }

    pub fn failed(source_url: &str, local_path: String, reason: impl Into<String>) -> Self {
        Self {
            source_url: source_url.to_string(),
            local_path,
            byte_size: 0,
            status: ImageStatus::Failed {
                reason: reason.into(),
            },
            from_cache: false,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self.status, ImageStatus::Saved)
    }
}

/// Final status of an image download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImageStatus {
    Saved,
    Failed { reason: String },
}
