//! Crawler module for page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The frontier of pending URLs and the visited set
//! - HTTP fetching with failure classification
//! - HTML extraction of text, links and images
//! - Image downloads with on-disk reuse
//! - Per-worker pacing and backoff
//! - The worker pool and overall run coordination

mod coordinator;
mod extractor;
mod fetcher;
mod frontier;
mod images;
mod throttle;
mod worker;

pub use coordinator::{run_crawl, Coordinator, CrawlReport, FailureEvent};
pub use extractor::{extract, ExtractedPage};
pub use fetcher::{
    build_http_client, fetch_page, is_html_content_type, FailureKind, FetchResult, FetchedPage,
};
pub use frontier::{Claim, CrawlTask, Frontier, Rejection};
pub use images::{file_name_for, ImageDownloader};
pub use throttle::Throttle;

use crate::config::Config;
use crate::HarvestError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Normalize the seeds and open the result file
/// 2. Build the HTTP client
/// 3. Run the worker pool until the frontier is exhausted or a stop
///    condition fires
/// 4. Flush the remaining records
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The run finished, possibly as `Aborted`
/// * `Err(HarvestError)` - The run could not start
pub async fn crawl(config: Config) -> Result<CrawlReport, HarvestError> {
    run_crawl(config).await
}
