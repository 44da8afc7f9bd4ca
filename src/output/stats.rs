//! Crawl statistics
//!
//! Workers bump lock-free counters while the run is in progress; a snapshot
//! is taken at the end and printed by the binary.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by all workers
#[derive(Debug, Default)]
pub struct CrawlStats {
    pub pages_recorded: AtomicU64,
    pub content_mismatch: AtomicU64,
    pub no_content: AtomicU64,
    pub http_errors: AtomicU64,
    pub network_failures: AtomicU64,
    pub rate_limited: AtomicU64,
    pub retries: AtomicU64,
    pub terminal_failures: AtomicU64,
    pub duplicates_skipped: AtomicU64,
    pub depth_exceeded: AtomicU64,
    pub out_of_scope: AtomicU64,
    pub images_saved: AtomicU64,
    pub images_cached: AtomicU64,
    pub images_failed: AtomicU64,
    pub flushes: AtomicU64,
    pub flush_failures: AtomicU64,
}

impl CrawlStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments `counter` by one and returns the new value
    pub fn bump(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> CrawlStatistics {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CrawlStatistics {
            pages_recorded: load(&self.pages_recorded),
            content_mismatch: load(&self.content_mismatch),
            no_content: load(&self.no_content),
            http_errors: load(&self.http_errors),
            network_failures: load(&self.network_failures),
            rate_limited: load(&self.rate_limited),
            retries: load(&self.retries),
            terminal_failures: load(&self.terminal_failures),
            duplicates_skipped: load(&self.duplicates_skipped),
            depth_exceeded: load(&self.depth_exceeded),
            out_of_scope: load(&self.out_of_scope),
            images_saved: load(&self.images_saved),
            images_cached: load(&self.images_cached),
            images_failed: load(&self.images_failed),
            flushes: load(&self.flushes),
            flush_failures: load(&self.flush_failures),
        }
    }
}

/// Crawl statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlStatistics {
    /// Pages that produced a record
    pub pages_recorded: u64,

    /// Fetched pages skipped because they were not HTML
    pub content_mismatch: u64,

    /// Fetched pages skipped because they had no visible text
    pub no_content: u64,

    /// Non-retryable HTTP errors
    pub http_errors: u64,

    /// Timeouts and connection failures (every attempt)
    pub network_failures: u64,

    /// 403/429 responses (every attempt)
    pub rate_limited: u64,

    /// Tasks put back into the frontier for another attempt
    pub retries: u64,

    /// Tasks that failed after exhausting their retries
    pub terminal_failures: u64,

    /// Discovered URLs dropped because they were already known
    pub duplicates_skipped: u64,

    /// Discovered URLs dropped because of the depth limit
    pub depth_exceeded: u64,

    /// Discovered URLs dropped by the scope policy
    pub out_of_scope: u64,

    pub images_saved: u64,
    pub images_cached: u64,
    pub images_failed: u64,

    pub flushes: u64,
    pub flush_failures: u64,
}

impl CrawlStatistics {
    /// Tasks that reached a final outcome after a successful fetch
    pub fn pages_fetched(&self) -> u64 {
        self.pages_recorded + self.content_mismatch + self.no_content
    }

    /// Returns the success rate as a percentage of finished tasks
    pub fn success_rate(&self) -> f64 {
        let finished = self.pages_fetched() + self.http_errors + self.terminal_failures;
        if finished == 0 {
            return 0.0;
        }
        (self.pages_recorded as f64 / finished as f64) * 100.0
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Pages:");
    println!("  Recorded: {}", stats.pages_recorded);
    println!("  Skipped (not HTML): {}", stats.content_mismatch);
    println!("  Skipped (no text): {}", stats.no_content);
    println!("  HTTP errors: {}", stats.http_errors);
    println!("  Failed after retries: {}", stats.terminal_failures);
    println!();

    println!("Frontier:");
    println!("  Duplicates skipped: {}", stats.duplicates_skipped);
    println!("  Beyond max depth: {}", stats.depth_exceeded);
    println!("  Out of scope: {}", stats.out_of_scope);
    println!();

    if stats.network_failures + stats.rate_limited > 0 {
        println!("Backoff:");
        println!("  Network failures: {}", stats.network_failures);
        println!("  Rate limited: {}", stats.rate_limited);
        println!("  Retries: {}", stats.retries);
        println!();
    }

    println!("Images:");
    println!("  Saved: {}", stats.images_saved);
    println!("  Reused from disk: {}", stats.images_cached);
    println!("  Failed: {}", stats.images_failed);
    println!();

    println!(
        "Flushes: {} ({} failed)",
        stats.flushes, stats.flush_failures
    );

    println!(
        "Success Rate: {:.1}% ({} pages recorded)",
        stats.success_rate(),
        stats.pages_recorded
    );
}
