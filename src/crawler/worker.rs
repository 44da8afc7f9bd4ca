//! Worker loop: claim, fetch, extract, download, record
//!
//! Every worker runs the same loop until the frontier is exhausted or the
//! stop signal fires. A claimed task always ends in exactly one of
//! `complete`, `requeue` or `release` on the frontier.

use crate::crawler::coordinator::{CrawlContext, FailureEvent};
use crate::crawler::extractor::{extract, ExtractedPage};
use crate::crawler::fetcher::{fetch_page, FailureKind, FetchResult, FetchedPage};
use crate::crawler::frontier::{Claim, CrawlTask, Rejection};
use crate::crawler::throttle::Throttle;
use crate::output::{CrawlStats, FlushOutcome, ImageRecord, PageRecord};
use crate::state::{StopReason, TaskOutcome};
use crate::url::normalize_url;
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

/// Upper bound on how long an idle worker sleeps before re-checking the frontier
const IDLE_POLL: Duration = Duration::from_millis(100);

pub(crate) async fn run_worker(
    id: usize,
    ctx: Arc<CrawlContext>,
    failures: UnboundedSender<FailureEvent>,
) {
    let mut throttle = Throttle::new(&ctx.settings.crawler, &ctx.settings.backoff);
    debug!("Worker {} started", id);

    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }

        match ctx.frontier.claim() {
            Claim::Task(task) => {
                let url = task.url.clone();
                let (outcome, status) = process_task(&ctx, &mut throttle, &failures, task).await;
                debug!("Worker {}: {} -> {}", id, url, outcome);
                track_failures(&ctx, outcome, status);
            }
            Claim::Wait => {
                tokio::select! {
                    _ = ctx.frontier.changed() => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                    _ = ctx.cancel.cancelled() => break,
                }
            }
            Claim::Exhausted => {
                ctx.stop(StopReason::FrontierExhausted);
                break;
            }
        }
    }

    debug!("Worker {} stopped", id);
}

/// Updates the consecutive-failure guard and aborts the run when it trips
fn track_failures(ctx: &CrawlContext, outcome: TaskOutcome, status: Option<u16>) {
    if outcome.is_fetch_success() {
        ctx.consecutive_failures.store(0, Ordering::Relaxed);
    } else if outcome.counts_as_failure(status) {
        let failed = ctx.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let limit = ctx.settings.crawler.max_consecutive_failures;
        if failed >= limit {
            error!("{} consecutive fetch failures, aborting", failed);
            ctx.stop(StopReason::FailureThreshold);
        }
    }
}

async fn process_task(
    ctx: &CrawlContext,
    throttle: &mut Throttle,
    failures: &UnboundedSender<FailureEvent>,
    task: CrawlTask,
) -> (TaskOutcome, Option<u16>) {
    if !throttle.wait(&ctx.cancel).await {
        ctx.frontier.release(task);
        return (TaskOutcome::Interrupted, None);
    }

    match fetch_page(&ctx.client, &task.url, ctx.settings.request_timeout).await {
        FetchResult::Success(page) => {
            throttle.reset();
            let status = page.status;
            let outcome = handle_page(ctx, &task, page).await;
            ctx.frontier.complete(&task);
            (outcome, Some(status))
        }
        FetchResult::Failure(kind) => {
            let outcome = handle_failure(ctx, throttle, failures, task, kind);
            (outcome, kind.status())
        }
    }
}

async fn handle_page(ctx: &CrawlContext, task: &CrawlTask, page: FetchedPage) -> TaskOutcome {
    if page.final_url != task.url {
        if let Ok(landed) = normalize_url(page.final_url.as_str()) {
            ctx.frontier.mark_visited(&landed);
        }
    }

    if !page.is_html() {
        CrawlStats::bump(&ctx.stats.content_mismatch);
        info!(
            "Skipping {}: content type {}",
            task.url,
            page.content_type().unwrap_or("unknown")
        );
        return TaskOutcome::ContentMismatch;
    }

    let extracted = extract(&page.body, &page.final_url, &ctx.scope);
    offer_links(ctx, task, &extracted);

    if extracted.is_empty() {
        CrawlStats::bump(&ctx.stats.no_content);
        info!("Skipping {}: no visible text", task.url);
        return TaskOutcome::NoContent;
    }

    let images = download_images(ctx, &extracted).await;

    let record = PageRecord {
        url: task.url.to_string(),
        title: extracted.title,
        text: extracted.text,
        image_refs: extracted.images.iter().map(|u| u.to_string()).collect(),
        images,
        fetched_at: Utc::now(),
        status: page.status,
        depth: task.depth,
    };

    store_record(ctx, record).await
}

fn offer_links(ctx: &CrawlContext, task: &CrawlTask, extracted: &ExtractedPage) {
    ctx.stats
        .out_of_scope
        .fetch_add(extracted.out_of_scope as u64, Ordering::Relaxed);

    let mut added = 0;
    for link in &extracted.links {
        match ctx
            .frontier
            .offer(link.clone(), task.depth + 1, Some(task.url.clone()))
        {
            Ok(()) => added += 1,
            Err(Rejection::Duplicate) => {
                CrawlStats::bump(&ctx.stats.duplicates_skipped);
            }
            Err(Rejection::TooDeep) => {
                CrawlStats::bump(&ctx.stats.depth_exceeded);
            }
        }
    }

    if added > 0 {
        debug!("{}: {} new links queued", task.url, added);
    }
}

async fn download_images(
    ctx: &CrawlContext,
    extracted: &ExtractedPage,
) -> Vec<ImageRecord> {
    let Some(downloader) = &ctx.images else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for image in &extracted.images {
        if ctx.settings.images_respect_scope && !ctx.scope.contains(image) {
            debug!("Image {} is out of scope", image);
            continue;
        }
        if ctx.cancel.is_cancelled() {
            break;
        }

        let record = downloader.download(image).await;
        let counter = match (record.is_saved(), record.from_cache) {
            (true, true) => &ctx.stats.images_cached,
            (true, false) => &ctx.stats.images_saved,
            (false, _) => &ctx.stats.images_failed,
        };
        CrawlStats::bump(counter);
        records.push(record);
    }

    records
}

/// Hands a record to the sink, enforcing the page limit under the sink lock
async fn store_record(ctx: &CrawlContext, record: PageRecord) -> TaskOutcome {
    let url = record.url.clone();
    let max_pages = ctx.settings.crawler.max_pages;

    let (flush, recorded, pending) = {
        let mut sink = ctx.sink.lock().await;

        if let Some(max) = max_pages {
            if ctx.stats.pages_recorded.load(Ordering::Relaxed) >= max {
                debug!("Page limit reached, dropping {}", url);
                return TaskOutcome::Interrupted;
            }
        }

        let flush = sink.push(record);
        let recorded = CrawlStats::bump(&ctx.stats.pages_recorded);
        (flush, recorded, ctx.frontier.pending_len())
    };

    info!("Recorded {}", url);
    if recorded % 10 == 0 {
        info!(
            "Progress: {} pages recorded, {} in frontier",
            recorded, pending
        );
    }

    match flush {
        FlushOutcome::Flushed { .. } => {
            CrawlStats::bump(&ctx.stats.flushes);
        }
        FlushOutcome::Failed { fatal, .. } => {
            CrawlStats::bump(&ctx.stats.flush_failures);
            if fatal {
                ctx.stop(StopReason::PersistenceFailure);
            }
        }
        FlushOutcome::Skipped => {}
    }

    if max_pages.is_some_and(|max| recorded >= max) {
        ctx.stop(StopReason::PageLimit);
    }

    TaskOutcome::Recorded
}

fn handle_failure(
    ctx: &CrawlContext,
    throttle: &mut Throttle,
    failures: &UnboundedSender<FailureEvent>,
    task: CrawlTask,
    kind: FailureKind,
) -> TaskOutcome {
    let counter = match kind {
        FailureKind::RateLimited { .. } => &ctx.stats.rate_limited,
        FailureKind::Timeout | FailureKind::ConnectionError => &ctx.stats.network_failures,
        FailureKind::HttpError { .. } | FailureKind::TooManyRedirects => &ctx.stats.http_errors,
    };
    CrawlStats::bump(counter);

    let backoff = if kind.is_retryable() {
        throttle.escalate()
    } else {
        throttle.current_delay()
    };

    // receiver only goes away once every worker has finished
    let _ = failures.send(FailureEvent {
        url: task.url.to_string(),
        kind,
        attempt: task.attempt,
        timestamp: Utc::now(),
        backoff,
    });

    if !kind.is_retryable() {
        info!("Giving up on {}: {}", task.url, kind);
        ctx.frontier.complete(&task);
        return TaskOutcome::HttpError;
    }

    if task.attempt < ctx.settings.crawler.max_retries {
        CrawlStats::bump(&ctx.stats.retries);
        debug!(
            "Requeueing {} after {} (attempt {})",
            task.url,
            kind,
            task.attempt + 1
        );
        ctx.frontier.requeue(task);
        TaskOutcome::Retried
    } else {
        CrawlStats::bump(&ctx.stats.terminal_failures);
        error!(
            "Failed to fetch {} after {} attempts: {}",
            task.url,
            task.attempt + 1,
            kind
        );
        ctx.frontier.complete(&task);
        TaskOutcome::Failed
    }
}

