use crate::url::ScopePolicy;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Seed URLs, crawled in order at depth 0
    #[serde(default)]
    pub seeds: Vec<String>,
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub images: ImageConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent workers
    #[serde(rename = "max-workers", default = "default_max_workers")]
    pub max_workers: u32,

    /// Minimum delay between two requests of the same worker (seconds)
    #[serde(rename = "delay-seconds", default = "default_delay_seconds")]
    pub delay_seconds: f64,

    /// Upper bound of the random jitter added to each delay (seconds)
    #[serde(rename = "delay-jitter-seconds", default)]
    pub delay_jitter_seconds: f64,

    /// Maximum discovery depth from a seed; unbounded when absent
    #[serde(rename = "max-depth", default)]
    pub max_depth: Option<u32>,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-seconds", default = "default_timeout_seconds")]
    pub timeout_seconds: f64,

    /// Retry budget for network failures and rate limiting
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Stop after this many pages have been recorded
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u64>,

    /// Stop the whole run after this many seconds
    #[serde(rename = "run-timeout-seconds", default)]
    pub run_timeout_seconds: Option<f64>,

    /// Consecutive failed fetches that abort the run
    #[serde(
        rename = "max-consecutive-failures",
        default = "default_max_consecutive_failures"
    )]
    pub max_consecutive_failures: u32,

    /// Host scope policy for discovered links
    #[serde(default)]
    pub scope: ScopePolicy,

    /// Extra domain patterns (e.g. "*.example.com") that are always in scope
    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,
}

impl CrawlerConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_seconds)
    }

    pub fn delay_jitter(&self) -> Duration {
        Duration::from_secs_f64(self.delay_jitter_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_seconds.map(Duration::from_secs_f64)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            delay_seconds: default_delay_seconds(),
            delay_jitter_seconds: 0.0,
            max_depth: None,
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            max_pages: None,
            run_timeout_seconds: None,
            max_consecutive_failures: default_max_consecutive_failures(),
            scope: ScopePolicy::SameHost,
            allowed_domains: Vec::new(),
        }
    }
}

/// Delay escalation applied after rate-limit and network failures
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    /// Factor applied to a worker's delay on each failure signal
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Cap on the escalated delay (seconds)
    #[serde(rename = "max-delay-seconds", default = "default_max_delay_seconds")]
    pub max_delay_seconds: f64,
}

impl BackoffConfig {
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs_f64(self.max_delay_seconds)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            multiplier: default_multiplier(),
            max_delay_seconds: default_max_delay_seconds(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path of the JSON array of page records
    #[serde(rename = "data-path")]
    pub data_path: String,

    /// Directory that receives downloaded images
    #[serde(rename = "image-dir")]
    pub image_dir: String,

    /// Flush after this many new records
    #[serde(rename = "save-interval", default = "default_save_interval")]
    pub save_interval: u32,

    /// Consecutive failed flushes tolerated before the run aborts
    #[serde(rename = "max-flush-failures", default = "default_max_flush_failures")]
    pub max_flush_failures: u32,

    /// Keep records already present in `data-path`
    #[serde(rename = "keep-existing", default)]
    pub keep_existing: bool,
}

/// Image download configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Apply the crawl scope to image URLs as well
    #[serde(rename = "respect-scope", default = "default_true")]
    pub respect_scope: bool,

    /// Largest accepted image body (bytes)
    #[serde(rename = "max-bytes", default = "default_image_max_bytes")]
    pub max_bytes: u64,

    /// Per-image request timeout (seconds)
    #[serde(rename = "timeout-seconds", default = "default_image_timeout_seconds")]
    pub timeout_seconds: f64,
}

impl ImageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            respect_scope: true,
            max_bytes: default_image_max_bytes(),
            timeout_seconds: default_image_timeout_seconds(),
        }
    }
}

fn default_max_workers() -> u32 {
    4
}

fn default_delay_seconds() -> f64 {
    2.0
}

fn default_timeout_seconds() -> f64 {
    10.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_consecutive_failures() -> u32 {
    20
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_seconds() -> f64 {
    60.0
}

fn default_save_interval() -> u32 {
    1
}

fn default_max_flush_failures() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_image_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_image_timeout_seconds() -> f64 {
    5.0
}
