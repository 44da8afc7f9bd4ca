//! Crawler coordinator - main crawl orchestration logic
//!
//! This module wires every component of a run together:
//! - Normalizing seeds and building the scope, HTTP client and result sink
//! - Spawning the worker pool and the failure log sink
//! - Owning the run state machine and the stop signal
//! - Performing the mandatory final flush and producing the report

use crate::config::{BackoffConfig, Config, CrawlerConfig};
use crate::crawler::fetcher::{build_http_client, FailureKind};
use crate::crawler::frontier::Frontier;
use crate::crawler::images::ImageDownloader;
use crate::crawler::worker::run_worker;
use crate::output::{CrawlStatistics, CrawlStats, FlushOutcome, JsonFileStore, ResultSink};
use crate::state::{RunState, StopReason};
use crate::url::{normalize_url, Scope};
use crate::{ConfigError, HarvestError};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// A failed fetch attempt, reported to the failure log sink
#[derive(Debug, Clone)]
pub struct FailureEvent {
    pub url: String,
    pub kind: FailureKind,

    /// Attempt number of the failed try (0 for the first)
    pub attempt: u32,

    pub timestamp: DateTime<Utc>,

    /// Worker delay after this failure was taken into account
    pub backoff: Duration,
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// `Completed` or `Aborted`
    pub state: RunState,

    pub stop_reason: StopReason,

    pub statistics: CrawlStatistics,

    /// Every failure event in the order it was received
    pub failures: Vec<FailureEvent>,

    /// Records in the output file as of the last successful flush
    pub records_persisted: usize,

    pub elapsed: Duration,
}

/// Limits and switches workers consult on every task
#[derive(Debug, Clone)]
pub(crate) struct WorkerSettings {
    pub crawler: CrawlerConfig,
    pub backoff: BackoffConfig,
    pub request_timeout: Duration,
    pub images_respect_scope: bool,
}

/// State shared by the coordinator and all workers
pub(crate) struct CrawlContext {
    pub frontier: Frontier,
    pub client: Client,
    pub images: Option<ImageDownloader>,
    pub scope: Scope,
    pub sink: tokio::sync::Mutex<ResultSink>,
    pub stats: CrawlStats,
    pub settings: WorkerSettings,
    pub consecutive_failures: AtomicU32,
    pub cancel: CancellationToken,
    state: Mutex<RunState>,
    stop_reason: Mutex<Option<StopReason>>,
}

impl CrawlContext {
    /// Stops the run: the first reason wins, later calls only re-signal
    pub fn stop(&self, reason: StopReason) {
        {
            let mut current = lock(&self.stop_reason);
            if current.is_none() {
                info!("Stopping crawl: {}", reason);
                *current = Some(reason);
            }
        }

        {
            let mut state = lock(&self.state);
            if *state == RunState::Running {
                debug!("Run state {} -> {}", *state, RunState::Draining);
                *state = RunState::Draining;
            }
        }

        self.cancel.cancel();
        self.frontier.wake_all();
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        *lock(&self.stop_reason)
    }

    fn transition(&self, to: RunState) -> Result<(), HarvestError> {
        let mut state = lock(&self.state);
        if !state.can_transition_to(to) {
            return Err(HarvestError::InvalidTransition { from: *state, to });
        }
        debug!("Run state {} -> {}", *state, to);
        *state = to;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Config,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(config: Config) -> Self {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Creates a coordinator whose run stops when `cancel` fires
    ///
    /// A run stopped this way ends as `Completed` with
    /// `StopReason::Interrupted`.
    pub fn with_cancellation(config: Config, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the crawl to completion
    ///
    /// Errors are only returned for problems detected before any worker
    /// starts (bad seeds, unusable output file, HTTP client setup). Once
    /// running, every problem ends up in the returned report.
    pub async fn run(self) -> Result<CrawlReport, HarvestError> {
        let started = Instant::now();
        let config = self.config;

        let seeds = normalize_seeds(&config.seeds)?;
        let scope = Scope::new(
            config.crawler.scope,
            seeds.iter(),
            &config.crawler.allowed_domains,
        );

        let client = build_http_client(&config.user_agent)?;

        let data_path = config.output.data_path.clone();
        let sink = ResultSink::open(
            Box::new(JsonFileStore::new(&data_path)),
            config.output.save_interval as usize,
            config.output.max_flush_failures,
            config.output.keep_existing,
        )
        .map_err(|e| HarvestError::Persistence {
            path: data_path.clone(),
            message: e.to_string(),
        })?;

        let images = config.images.enabled.then(|| {
            ImageDownloader::new(client.clone(), &config.output.image_dir, &config.images)
        });

        let frontier = Frontier::new(config.crawler.max_depth);
        for seed in &seeds {
            if frontier.offer(seed.clone(), 0, None).is_err() {
                debug!("Ignoring repeated seed {}", seed);
            }
        }

        let ctx = Arc::new(CrawlContext {
            frontier,
            client,
            images,
            scope,
            sink: tokio::sync::Mutex::new(sink),
            stats: CrawlStats::new(),
            settings: WorkerSettings {
                crawler: config.crawler.clone(),
                backoff: config.backoff.clone(),
                request_timeout: config.crawler.timeout(),
                images_respect_scope: config.images.respect_scope,
            },
            consecutive_failures: AtomicU32::new(0),
            cancel: self.cancel,
            state: Mutex::new(RunState::Idle),
            stop_reason: Mutex::new(None),
        });

        ctx.transition(RunState::Running)?;
        info!(
            "Starting crawl: {} seeds, {} workers, scope {:?}, output {}",
            seeds.len(),
            config.crawler.max_workers,
            ctx.scope.policy(),
            data_path
        );

        let (failure_tx, failure_rx) = mpsc::unbounded_channel();
        let log_sink = tokio::spawn(collect_failures(failure_rx));

        let timer = config.crawler.run_timeout().map(|limit| {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => ctx.stop(StopReason::RunTimeout),
                    _ = ctx.cancel.cancelled() => {}
                }
            })
        });

        let mut workers = JoinSet::new();
        for id in 0..config.crawler.max_workers as usize {
            workers.spawn(run_worker(id, ctx.clone(), failure_tx.clone()));
        }
        drop(failure_tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }

        if let Some(timer) = timer {
            timer.abort();
        }

        // External cancellation does not go through `stop`
        if ctx.stop_reason().is_none() {
            ctx.stop(StopReason::Interrupted);
        }
        let mut stop_reason = ctx.stop_reason().unwrap_or(StopReason::Interrupted);

        let (final_flush, records_persisted) = {
            let mut sink = ctx.sink.lock().await;
            (sink.flush(), sink.persisted())
        };
        let final_flush_ok = match final_flush {
            FlushOutcome::Failed { message, .. } => {
                error!("Final flush to {} failed: {}", data_path, message);
                CrawlStats::bump(&ctx.stats.flush_failures);
                false
            }
            FlushOutcome::Flushed { .. } => {
                CrawlStats::bump(&ctx.stats.flushes);
                true
            }
            FlushOutcome::Skipped => true,
        };
        if !final_flush_ok && !stop_reason.is_abort() {
            stop_reason = StopReason::PersistenceFailure;
        }

        let failures = match log_sink.await {
            Ok(failures) => failures,
            Err(e) => {
                error!("Failure log sink failed: {}", e);
                Vec::new()
            }
        };

        let final_state = if stop_reason.is_abort() {
            RunState::Aborted
        } else {
            RunState::Completed
        };
        ctx.transition(final_state)?;

        let statistics = ctx.stats.snapshot();
        let elapsed = started.elapsed();
        info!(
            "Crawl {} ({}): {} pages recorded in {:?}",
            final_state, stop_reason, statistics.pages_recorded, elapsed
        );

        Ok(CrawlReport {
            state: final_state,
            stop_reason,
            statistics,
            failures,
            records_persisted,
            elapsed,
        })
    }
}

/// Runs the main crawl operation with a private stop signal
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::config::load_config;
/// use sumi_harvest::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("harvest.toml"))?;
/// let report = run_crawl(config).await?;
/// println!("{} ({})", report.state, report.stop_reason);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config) -> Result<CrawlReport, HarvestError> {
    Coordinator::new(config).run().await
}

fn normalize_seeds(raw: &[String]) -> Result<Vec<Url>, HarvestError> {
    let seeds = raw
        .iter()
        .map(|seed| normalize_url(seed))
        .collect::<Result<Vec<_>, _>>()?;

    if seeds.is_empty() {
        return Err(ConfigError::Validation("at least one seed URL is required".to_string()).into());
    }

    Ok(seeds)
}

/// Logs failure events as they arrive and returns them once every worker is done
async fn collect_failures(mut events: mpsc::UnboundedReceiver<FailureEvent>) -> Vec<FailureEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        warn!(
            "Fetch failed: {} ({}, attempt {}, next delay {:?})",
            event.url, event.kind, event.attempt, event.backoff
        );
        collected.push(event);
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ImageConfig, OutputConfig, UserAgentConfig};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(dir: &TempDir, seeds: Vec<String>) -> Config {
        Config {
            seeds,
            crawler: CrawlerConfig {
                max_workers: 2,
                delay_seconds: 0.0,
                timeout_seconds: 5.0,
                ..Default::default()
            },
            backoff: BackoffConfig::default(),
            user_agent: UserAgentConfig {
                crawler_name: "TestCrawler".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
            output: OutputConfig {
                data_path: dir.path().join("records.json").display().to_string(),
                image_dir: dir.path().join("images").display().to_string(),
                save_interval: 1,
                max_flush_failures: 3,
                keep_existing: false,
            },
            images: ImageConfig {
                enabled: false,
                ..Default::default()
            },
        }
    }

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/html")
            .set_body_string(format!("<html><body>{}</body></html>", body))
    }

    #[test]
    fn test_normalize_seeds_rejects_empty() {
        assert!(matches!(
            normalize_seeds(&[]),
            Err(HarvestError::Config(_))
        ));
    }

    #[test]
    fn test_normalize_seeds_rejects_bad_scheme() {
        let result = normalize_seeds(&["ftp://example.com/".to_string()]);
        assert!(matches!(result, Err(HarvestError::UrlError(_))));
    }

    #[tokio::test]
    async fn test_single_page_run_completes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html("only page"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir, vec![format!("{}/", server.uri())]);
        let report = run_crawl(config).await.unwrap();

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.stop_reason, StopReason::FrontierExhausted);
        assert_eq!(report.statistics.pages_recorded, 1);
        assert_eq!(report.records_persisted, 1);
    }

    #[tokio::test]
    async fn test_page_limit_stops_run() {
        let server = MockServer::start().await;
        let links: String = (0..20)
            .map(|i| format!("<a href=\"/p{}\">p</a>", i))
            .collect();
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html(&format!("hub {}", links)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(html("leaf"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir, vec![format!("{}/", server.uri())]);
        config.crawler.max_pages = Some(5);
        let report = run_crawl(config).await.unwrap();

        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.stop_reason, StopReason::PageLimit);
        assert_eq!(report.statistics.pages_recorded, 5);
        assert_eq!(report.records_persisted, 5);
    }

    #[tokio::test]
    async fn test_consecutive_failures_abort() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let seeds = (0..5).map(|i| format!("{}/s{}", server.uri(), i)).collect();
        let mut config = create_test_config(&dir, seeds);
        config.crawler.max_workers = 1;
        config.crawler.max_consecutive_failures = 3;
        let report = run_crawl(config).await.unwrap();

        assert_eq!(report.state, RunState::Aborted);
        assert_eq!(report.stop_reason, StopReason::FailureThreshold);
        assert_eq!(report.statistics.http_errors, 3);
    }

    #[tokio::test]
    async fn test_external_cancel_interrupts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(html("slow").set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir, vec![format!("{}/", server.uri())]);
        let coordinator = Coordinator::new(config);
        let cancel = coordinator.cancellation_token();
        cancel.cancel();

        let report = coordinator.run().await.unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.stop_reason, StopReason::Interrupted);
        assert_eq!(report.statistics.pages_recorded, 0);
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(html("<a href=\"/next\">next</a>"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut config = create_test_config(&dir, vec![format!("{}/", server.uri())]);
        config.crawler.max_workers = 1;
        config.crawler.delay_seconds = 5.0;
        config.crawler.run_timeout_seconds = Some(0.3);

        let started = Instant::now();
        let report = run_crawl(config).await.unwrap();

        assert_eq!(report.stop_reason, StopReason::RunTimeout);
        assert_eq!(report.state, RunState::Completed);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
