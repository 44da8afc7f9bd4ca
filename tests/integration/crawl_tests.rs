//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end, reading results back from the JSON
//! output file.

use std::path::Path;
use std::time::Duration;
use sumi_harvest::config::{
    BackoffConfig, Config, CrawlerConfig, ImageConfig, OutputConfig, UserAgentConfig,
};
use sumi_harvest::crawler::{crawl, FailureKind};
use sumi_harvest::output::{ImageStatus, PageRecord};
use sumi_harvest::{RunState, StopReason};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast test configuration writing into `dir`
fn create_test_config(dir: &Path, seeds: Vec<String>) -> Config {
    Config {
        seeds,
        crawler: CrawlerConfig {
            max_workers: 3,
            delay_seconds: 0.0,
            timeout_seconds: 5.0,
            ..Default::default()
        },
        backoff: BackoffConfig {
            multiplier: 2.0,
            max_delay_seconds: 10.0,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            data_path: dir.join("data.json").display().to_string(),
            image_dir: dir.join("images").display().to_string(),
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

fn html_page(title: &str, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(format!(
            "<html><head><title>{}</title></head><body>{}</body></html>",
            title, body
        ))
}

async fn mount_page(server: &MockServer, p: &str, response: ResponseTemplate, calls: u64) {
    Mock::given(method("GET"))
        .and(path(p))
        .respond_with(response)
        .expect(calls)
        .mount(server)
        .await;
}

fn read_records(dir: &Path) -> Vec<PageRecord> {
    let contents = std::fs::read_to_string(dir.join("data.json")).expect("output file missing");
    serde_json::from_str(&contents).expect("output is not a valid record array")
}

fn sorted_urls(records: &[PageRecord]) -> Vec<String> {
    let mut urls: Vec<String> = records.iter().map(|r| r.url.clone()).collect();
    urls.sort();
    urls
}

#[tokio::test]
async fn test_link_cycle_fetches_each_page_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/a",
        html_page("A", r#"Page A <a href="/b">b</a> <a href="/c">c</a>"#),
        1,
    )
    .await;
    mount_page(&server, "/b", html_page("B", "Page B"), 1).await;
    mount_page(
        &server,
        "/c",
        html_page("C", r#"Page C <a href="/a">back to a</a>"#),
        1,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), vec![format!("{}/a", base)]);
    let report = crawl(config).await.expect("crawl failed to start");

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.stop_reason, StopReason::FrontierExhausted);
    assert_eq!(report.statistics.pages_recorded, 3);
    assert!(report.statistics.duplicates_skipped >= 1);

    let records = read_records(dir.path());
    assert_eq!(
        sorted_urls(&records),
        vec![
            format!("{}/a", base),
            format!("{}/b", base),
            format!("{}/c", base)
        ]
    );

    let a = records.iter().find(|r| r.url.ends_with("/a")).unwrap();
    assert_eq!(a.title.as_deref(), Some("A"));
    assert!(a.text.contains("Page A"));
    assert_eq!(a.status, 200);
    assert_eq!(a.depth, 0);
    // expectations (one request per page) are verified when the server drops
}

#[tokio::test]
async fn test_redirect_target_already_queued_is_fetched_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/a",
        ResponseTemplate::new(302).insert_header("location", "/b"),
        1,
    )
    .await;
    mount_page(&server, "/b", html_page("B", "Page B"), 1).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(
        dir.path(),
        vec![format!("{}/a", base), format!("{}/b", base)],
    );
    config.crawler.max_workers = 1;
    let report = crawl(config).await.expect("crawl failed to start");

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.statistics.pages_recorded, 1);

    let records = read_records(dir.path());
    assert_eq!(sorted_urls(&records), vec![format!("{}/a", base)]);
    assert!(records[0].text.contains("Page B"));
}

#[tokio::test]
async fn test_rate_limit_backs_off_then_succeeds() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_page(&server, "/a", html_page("A", "finally"), 1).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path(), vec![format!("{}/a", base)]);
    config.crawler.max_workers = 1;
    config.crawler.max_retries = 3;
    let report = crawl(config).await.expect("crawl failed to start");

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.statistics.pages_recorded, 1);
    assert_eq!(report.statistics.rate_limited, 2);
    assert_eq!(report.statistics.retries, 2);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);

    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|e| e.kind == FailureKind::RateLimited { code: 429 }));
    assert_eq!(report.failures[0].attempt, 0);
    assert_eq!(report.failures[1].attempt, 1);
    assert!(
        report.failures[1].backoff > report.failures[0].backoff,
        "backoff did not grow: {:?} then {:?}",
        report.failures[0].backoff,
        report.failures[1].backoff
    );
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path(), vec![format!("{}/down", base)]);
    config.crawler.max_workers = 1;
    config.crawler.max_retries = 2;
    config.backoff.max_delay_seconds = 0.5;
    let report = crawl(config).await.expect("crawl failed to start");

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.statistics.pages_recorded, 0);
    assert_eq!(report.statistics.terminal_failures, 1);
    assert_eq!(report.failures.len(), 3);
    assert!(read_records(dir.path()).is_empty());
}

#[tokio::test]
async fn test_depth_bound() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/d0", html_page("0", r#"zero <a href="/d1">next</a>"#), 1).await;
    mount_page(&server, "/d1", html_page("1", r#"one <a href="/d2">next</a>"#), 1).await;
    mount_page(&server, "/d2", html_page("2", "two"), 0).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path(), vec![format!("{}/d0", base)]);
    config.crawler.max_depth = Some(1);
    let report = crawl(config).await.expect("crawl failed to start");

    assert_eq!(report.statistics.pages_recorded, 2);
    assert_eq!(report.statistics.depth_exceeded, 1);

    let records = read_records(dir.path());
    assert!(records.iter().all(|r| r.depth <= 1));
}

#[tokio::test]
async fn test_out_of_scope_links_are_not_followed() {
    let server = MockServer::start().await;
    let base = server.uri();
    let port = url::Url::parse(&base).unwrap().port().unwrap();

    // same server reached through another host name is a different host
    mount_page(
        &server,
        "/",
        html_page(
            "Home",
            &format!(r#"home <a href="http://localhost:{}/elsewhere">away</a>"#, port),
        ),
        1,
    )
    .await;
    mount_page(&server, "/elsewhere", html_page("Away", "away"), 0).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), vec![format!("{}/", base)]);
    let report = crawl(config).await.expect("crawl failed to start");

    assert_eq!(report.statistics.pages_recorded, 1);
    assert_eq!(report.statistics.out_of_scope, 1);
}

#[tokio::test]
async fn test_non_html_and_empty_pages_are_skipped() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(
        &server,
        "/",
        html_page(
            "Home",
            r#"home <a href="/doc.pdf">pdf</a> <a href="/blank">blank</a>"#,
        ),
        1,
    )
    .await;
    mount_page(
        &server,
        "/doc.pdf",
        ResponseTemplate::new(200)
            .insert_header("content-type", "application/pdf")
            .set_body_bytes(b"%PDF-1.4".to_vec()),
        1,
    )
    .await;
    mount_page(
        &server,
        "/blank",
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/html")
            .set_body_string("<html><body><script>x()</script></body></html>"),
        1,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), vec![format!("{}/", base)]);
    let report = crawl(config).await.expect("crawl failed to start");

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.statistics.pages_recorded, 1);
    assert_eq!(report.statistics.content_mismatch, 1);
    assert_eq!(report.statistics.no_content, 1);
    assert_eq!(sorted_urls(&read_records(dir.path())), vec![format!("{}/", base)]);
}

#[tokio::test]
async fn test_image_rerun_is_idempotent() {
    let server = MockServer::start().await;
    let base = server.uri();
    let image_bytes = b"\x89PNG\r\n\x1a\nnot really a png".to_vec();

    mount_page(
        &server,
        "/gallery",
        html_page("Gallery", r#"pictures <img src="/img/cat.png"> <img src="/img/cat.png">"#),
        2,
    )
    .await;
    mount_page(
        &server,
        "/img/cat.png",
        ResponseTemplate::new(200)
            .insert_header("content-type", "image/png")
            .set_body_bytes(image_bytes.clone()),
        2,
    )
    .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path(), vec![format!("{}/gallery", base)]);
    config.images.enabled = true;

    let first = crawl(config.clone()).await.expect("first run failed");
    let first_records = read_records(dir.path());
    let second = crawl(config).await.expect("second run failed");
    let second_records = read_records(dir.path());

    assert_eq!(first.statistics.images_saved, 1);
    assert_eq!(second.statistics.images_saved, 0);
    assert_eq!(second.statistics.images_cached, 1);

    let first_image = &first_records[0].images[0];
    let second_image = &second_records[0].images[0];
    assert_eq!(first_image.status, ImageStatus::Saved);
    assert_eq!(first_image.local_path, second_image.local_path);
    assert_eq!(first_image.byte_size, image_bytes.len() as u64);
    assert_eq!(first_image.byte_size, second_image.byte_size);
    assert_eq!(first_records[0].image_refs, vec![format!("{}/img/cat.png", base)]);

    let files: Vec<_> = std::fs::read_dir(dir.path().join("images"))
        .unwrap()
        .collect();
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&second_image.local_path).unwrap(), image_bytes);
}

#[tokio::test]
async fn test_keep_existing_merges_runs() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/one", html_page("One", "first run"), 1).await;
    mount_page(&server, "/two", html_page("Two", "second run"), 1).await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), vec![format!("{}/one", base)]);
    crawl(config).await.expect("first run failed");

    let mut config = create_test_config(dir.path(), vec![format!("{}/two", base)]);
    config.output.keep_existing = true;
    let report = crawl(config).await.expect("second run failed");

    assert_eq!(report.records_persisted, 2);
    assert_eq!(
        sorted_urls(&read_records(dir.path())),
        vec![format!("{}/one", base), format!("{}/two", base)]
    );
}

#[tokio::test]
async fn test_run_timeout_drains_and_flushes() {
    let server = MockServer::start().await;
    let base = server.uri();

    mount_page(&server, "/", html_page("Home", r#"home <a href="/next">next</a>"#), 1).await;
    mount_page(&server, "/next", html_page("Next", "next"), 0).await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(dir.path(), vec![format!("{}/", base)]);
    config.crawler.max_workers = 1;
    config.crawler.delay_seconds = 10.0;
    config.crawler.run_timeout_seconds = Some(0.5);

    let report = tokio::time::timeout(Duration::from_secs(5), crawl(config))
        .await
        .expect("run did not stop in time")
        .expect("crawl failed to start");

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.stop_reason, StopReason::RunTimeout);
    assert_eq!(read_records(dir.path()).len(), 1);
}
