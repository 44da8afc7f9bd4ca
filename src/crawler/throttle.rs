//! Per-worker request pacing and backoff
//!
//! Each worker owns one `Throttle`. It enforces a minimum gap between the
//! worker's requests and stretches that gap multiplicatively whenever the
//! worker sees a rate-limit or network failure.

use crate::config::{BackoffConfig, CrawlerConfig};
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Smallest delay escalation starts from when the base delay is zero
const MIN_ESCALATION_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct Throttle {
    base_delay: Duration,
    current_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: Duration,
    last_request: Option<Instant>,
}

impl Throttle {
    pub fn new(crawler: &CrawlerConfig, backoff: &BackoffConfig) -> Self {
        let base_delay = crawler.delay();
        Self {
            base_delay,
            current_delay: base_delay,
            max_delay: backoff.max_delay().max(base_delay),
            multiplier: backoff.multiplier,
            jitter: crawler.delay_jitter(),
            last_request: None,
        }
    }

    /// Waits until the next request is allowed
    ///
    /// Returns `false` if `cancel` fired first; the caller must not send the
    /// request in that case. On `true` the request slot is taken.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        if let Some(last) = self.last_request {
            let deadline = last + self.current_delay + self.sample_jitter();
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep_until(deadline) => {}
            }
        } else if cancel.is_cancelled() {
            return false;
        }

        self.last_request = Some(Instant::now());
        true
    }

    /// Stretches the delay after a failure signal and returns the new value
    pub fn escalate(&mut self) -> Duration {
        let from = self.current_delay.max(MIN_ESCALATION_STEP);
        let next = Duration::try_from_secs_f64(from.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max_delay);
        self.current_delay = next.min(self.max_delay);
        self.current_delay
    }

    /// Returns to the base delay after a successful fetch
    pub fn reset(&mut self) {
        self.current_delay = self.base_delay;
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    fn sample_jitter(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}
