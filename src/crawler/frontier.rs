//! Crawl frontier: the FIFO of pending tasks plus the visited set
//!
//! The frontier is the single owner of URL admission. Every check-and-insert
//! happens under one lock, so a URL can never be claimed twice in a run no
//! matter how many workers race on it. A requeued task (retry) goes back
//! without passing admission again.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use url::Url;

/// One unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    /// Normalized URL to fetch
    pub url: Url,

    /// Distance from the seed that led here (seeds are 0)
    pub depth: u32,

    /// Page the link was discovered on
    pub origin: Option<Url>,

    /// Number of previous failed attempts
    pub attempt: u32,
}

impl CrawlTask {
    pub fn seed(url: Url) -> Self {
        Self {
            url,
            depth: 0,
            origin: None,
            attempt: 0,
        }
    }
}

/// Why `offer` turned a URL away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Already claimed, or already waiting in the queue
    Duplicate,

    /// Deeper than `max-depth`
    TooDeep,
}

/// Result of asking the frontier for work
#[derive(Debug)]
pub enum Claim {
    /// A task to process; its URL is now in the visited set
    Task(CrawlTask),

    /// Queue is empty but other workers are busy and may add more
    Wait,

    /// Queue is empty and nothing is in flight
    Exhausted,
}

#[derive(Debug, Default)]
struct Inner {
    pending: VecDeque<CrawlTask>,
    queued: HashSet<String>,
    visited: HashSet<String>,
    in_flight: usize,
}

/// Thread-safe crawl frontier
#[derive(Debug)]
pub struct Frontier {
    inner: Mutex<Inner>,
    notify: Notify,
    max_depth: Option<u32>,
}

impl Frontier {
    pub fn new(max_depth: Option<u32>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            max_depth,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits a URL unless it was already seen or is too deep
    pub fn offer(&self, url: Url, depth: u32, origin: Option<Url>) -> Result<(), Rejection> {
        if self.max_depth.is_some_and(|max| depth > max) {
            return Err(Rejection::TooDeep);
        }

        {
            let mut inner = self.lock();
            let key = url.as_str();
            if inner.visited.contains(key) || inner.queued.contains(key) {
                return Err(Rejection::Duplicate);
            }
            inner.queued.insert(key.to_string());
            inner.pending.push_back(CrawlTask {
                url,
                depth,
                origin,
                attempt: 0,
            });
        }

        self.notify.notify_waiters();
        Ok(())
    }

    /// Takes the oldest pending task and marks its URL visited
    pub fn claim(&self) -> Claim {
        let mut inner = self.lock();
        match inner.pending.pop_front() {
            Some(task) => {
                let key = task.url.as_str().to_string();
                inner.queued.remove(&key);
                inner.visited.insert(key);
                inner.in_flight += 1;
                Claim::Task(task)
            }
            None if inner.in_flight == 0 => Claim::Exhausted,
            None => Claim::Wait,
        }
    }

    /// Marks a URL visited without queueing it; idempotent
    ///
    /// A task for the same URL still waiting in the queue is dropped, so a
    /// redirect target that was also linked directly is fetched only once.
    pub fn mark_visited(&self, url: &Url) {
        let mut inner = self.lock();
        let key = url.as_str();
        if inner.queued.remove(key) {
            inner.pending.retain(|task| task.url.as_str() != key);
        }
        inner.visited.insert(key.to_string());
    }

    /// Releases a claimed task that reached a final outcome
    pub fn complete(&self, task: &CrawlTask) {
        {
            let mut inner = self.lock();
            inner.visited.insert(task.url.as_str().to_string());
            inner.in_flight = inner.in_flight.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }

    /// Puts a claimed task back at the tail for another attempt
    pub fn requeue(&self, mut task: CrawlTask) {
        task.attempt += 1;
        self.release(task);
    }

    /// Puts a claimed task back unchanged (the attempt never happened)
    pub fn release(&self, task: CrawlTask) {
        {
            let mut inner = self.lock();
            inner.pending.push_back(task);
            inner.in_flight = inner.in_flight.saturating_sub(1);
        }
        self.notify.notify_waiters();
    }

    /// Waits until something is offered or released
    ///
    /// Callers must re-check with `claim` after waking; wakeups that happen
    /// between a `claim` and this call are not remembered.
    pub async fn changed(&self) {
        self.notify.notified().await
    }

    /// Wakes every waiting worker (used when the run is stopping)
    pub fn wake_all(&self) {
        self.notify.notify_waiters();
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.lock().visited.contains(url.as_str())
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn visited_len(&self) -> usize {
        self.lock().visited.len()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let frontier = Frontier::new(None);
        frontier.offer(url("https://a.test/1"), 0, None).unwrap();
        frontier.offer(url("https://a.test/2"), 0, None).unwrap();

        let Claim::Task(first) = frontier.claim() else {
            panic!("expected a task");
        };
        let Claim::Task(second) = frontier.claim() else {
            panic!("expected a task");
        };
        assert_eq!(first.url.as_str(), "https://a.test/1");
        assert_eq!(second.url.as_str(), "https://a.test/2");
    }

    #[test]
    fn test_duplicate_rejected_while_queued_and_after_claim() {
        let frontier = Frontier::new(None);
        frontier.offer(url("https://a.test/"), 0, None).unwrap();
        assert_eq!(
            frontier.offer(url("https://a.test/"), 1, None),
            Err(Rejection::Duplicate)
        );

        let Claim::Task(task) = frontier.claim() else {
            panic!("expected a task");
        };
        assert_eq!(
            frontier.offer(url("https://a.test/"), 1, None),
            Err(Rejection::Duplicate)
        );

        frontier.complete(&task);
        assert_eq!(
            frontier.offer(url("https://a.test/"), 1, None),
            Err(Rejection::Duplicate)
        );
    }

    #[test]
    fn test_depth_limit() {
        let frontier = Frontier::new(Some(1));
        assert!(frontier.offer(url("https://a.test/1"), 1, None).is_ok());
        assert_eq!(
            frontier.offer(url("https://a.test/2"), 2, None),
            Err(Rejection::TooDeep)
        );
    }

    #[test]
    fn test_wait_versus_exhausted() {
        let frontier = Frontier::new(None);
        assert!(matches!(frontier.claim(), Claim::Exhausted));

        frontier.offer(url("https://a.test/"), 0, None).unwrap();
        let Claim::Task(task) = frontier.claim() else {
            panic!("expected a task");
        };
        assert!(matches!(frontier.claim(), Claim::Wait));

        frontier.complete(&task);
        assert!(matches!(frontier.claim(), Claim::Exhausted));
    }

    #[test]
    fn test_requeue_bypasses_dedup_and_counts_attempts() {
        let frontier = Frontier::new(None);
        frontier.offer(url("https://a.test/"), 0, None).unwrap();
        frontier.offer(url("https://a.test/other"), 0, None).unwrap();

        let Claim::Task(task) = frontier.claim() else {
            panic!("expected a task");
        };
        frontier.requeue(task);
        assert_eq!(frontier.in_flight(), 0);

        // requeued task goes to the tail
        let Claim::Task(next) = frontier.claim() else {
            panic!("expected a task");
        };
        assert_eq!(next.url.as_str(), "https://a.test/other");

        let Claim::Task(retried) = frontier.claim() else {
            panic!("expected a task");
        };
        assert_eq!(retried.url.as_str(), "https://a.test/");
        assert_eq!(retried.attempt, 1);
    }

    #[test]
    fn test_release_keeps_attempt() {
        let frontier = Frontier::new(None);
        frontier.offer(url("https://a.test/"), 0, None).unwrap();
        let Claim::Task(task) = frontier.claim() else {
            panic!("expected a task");
        };
        frontier.release(task);

        let Claim::Task(again) = frontier.claim() else {
            panic!("expected a task");
        };
        assert_eq!(again.attempt, 0);
    }

    #[test]
    fn test_mark_visited_is_idempotent() {
        let frontier = Frontier::new(None);
        let u = url("https://a.test/");
        frontier.mark_visited(&u);
        frontier.mark_visited(&u);

        assert!(frontier.is_visited(&u));
        assert_eq!(frontier.visited_len(), 1);
        assert_eq!(frontier.offer(u, 0, None), Err(Rejection::Duplicate));
    }

    #[test]
    fn test_mark_visited_drops_queued_task() {
        let frontier = Frontier::new(None);
        frontier.offer(url("https://a.test/a"), 0, None).unwrap();
        frontier.offer(url("https://a.test/b"), 1, None).unwrap();

        let Claim::Task(task) = frontier.claim() else {
            panic!("expected a task");
        };
        // /a redirected to /b
        frontier.mark_visited(&url("https://a.test/b"));
        frontier.complete(&task);

        assert_eq!(frontier.pending_len(), 0);
        assert!(matches!(frontier.claim(), Claim::Exhausted));
    }

    #[test]
    fn test_mark_visited_keeps_requeued_task() {
        let frontier = Frontier::new(None);
        frontier.offer(url("https://a.test/a"), 0, None).unwrap();
        let Claim::Task(task) = frontier.claim() else {
            panic!("expected a task");
        };
        frontier.requeue(task);

        frontier.mark_visited(&url("https://a.test/a"));
        let Claim::Task(retried) = frontier.claim() else {
            panic!("expected the retry to survive");
        };
        assert_eq!(retried.attempt, 1);
    }

    #[test]
    fn test_concurrent_offers_admit_once() {
        let frontier = Arc::new(Frontier::new(None));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let frontier = frontier.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .filter(|i| {
                            frontier
                                .offer(url(&format!("https://a.test/{}", i)), 0, None)
                                .is_ok()
                        })
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
        assert_eq!(frontier.pending_len(), 100);
    }

    #[tokio::test]
    async fn test_offer_wakes_waiter() {
        let frontier = Arc::new(Frontier::new(None));
        let waiter = {
            let frontier = frontier.clone();
            tokio::spawn(async move {
                frontier.changed().await;
            })
        };

        // let the waiter register before offering
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        frontier.offer(url("https://a.test/"), 0, None).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter was not woken")
            .unwrap();
    }
}
