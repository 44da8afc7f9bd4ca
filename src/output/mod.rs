//! Output module for crawl results
//!
//! This module handles:
//! - The page and image record types written to disk
//! - Buffered, atomic persistence of records as a JSON array
//! - Recording crawl statistics

mod records;
mod sink;
pub mod stats;
mod traits;

pub use records::{ImageRecord, ImageStatus, PageRecord};
pub use sink::{FlushOutcome, ResultSink};
pub use stats::{print_statistics, CrawlStatistics, CrawlStats};
pub use traits::{JsonFileStore, OutputError, OutputResult, RecordStore};
