//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and drive full
//! crawl jobs through the orchestrator end-to-end.

use async_trait::async_trait;
use newt_walker::config::{CrawlConfig, MemoryConfig, RobotsMode};
use newt_walker::crawler::{
    recover_crashed_jobs, CrawlOrchestrator, FetchOptions, FetchResponse, Fetcher, HttpFetcher,
    NetworkError, StatusQuery,
};
use newt_walker::memory::FixedProbe;
use newt_walker::storage::{shared, SharedStore, SqliteStorage};
use newt_walker::{JobStatus, WalkerError};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const OWNER: &str = "alice";

/// Creates a fast crawl configuration for local mock servers
fn create_test_config() -> CrawlConfig {
    CrawlConfig {
        max_depth: 3,
        delay: 0.0,
        concurrency: 2,
        timeout: 5,
        retries: 0,
        retry_backoff_ms: 10,
        checkpoint_interval: 2,
        ..CrawlConfig::default()
    }
}

fn create_store() -> SharedStore {
    shared(SqliteStorage::new_in_memory(5).expect("in-memory store"))
}

fn create_orchestrator(store: &SharedStore, config: &CrawlConfig) -> CrawlOrchestrator {
    create_orchestrator_with_fetcher(store, config, Arc::new(HttpFetcher::new().unwrap()))
}

fn create_orchestrator_with_fetcher(
    store: &SharedStore,
    config: &CrawlConfig,
    fetcher: Arc<dyn Fetcher>,
) -> CrawlOrchestrator {
    CrawlOrchestrator::with_probe(
        "test-session",
        config.clone(),
        &MemoryConfig::default(),
        fetcher,
        Arc::clone(store),
        Box::new(FixedProbe::new(0)),
    )
}

fn html_page(title: &str, links: &[String]) -> ResponseTemplate {
    let anchors: String = links
        .iter()
        .map(|href| format!(r#"<a href="{}">{}</a>"#, href, href))
        .collect();
    let body = format!(
        "<html><head><title>{}</title></head><body><h1>{}</h1>{}</body></html>",
        title, title, anchors
    );
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html")
}

/// Mounts an index page linking to `count` leaf pages
async fn mount_site(server: &MockServer, count: usize, leaf_delay: Duration) {
    let leaves: Vec<String> = (0..count).map(|i| format!("/page{}", i)).collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Home", &leaves))
        .mount(server)
        .await;

    for leaf in &leaves {
        Mock::given(method("GET"))
            .and(path(leaf.as_str()))
            .respond_with(html_page(leaf, &["/".to_string()]).set_delay(leaf_delay))
            .mount(server)
            .await;
    }
}

/// Number of GET requests the server received for `request_path`
async fn request_count(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}

async fn settle(orchestrator: &CrawlOrchestrator) -> JobStatus {
    tokio::time::timeout(Duration::from_secs(20), orchestrator.wait_until_settled())
        .await
        .expect("crawl did not settle in time")
}

/// Polls until at least `pages` pages are recorded
async fn wait_for_crawled(orchestrator: &CrawlOrchestrator, pages: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while orchestrator.get_status(&StatusQuery::default()).stats.crawled < pages {
        assert!(tokio::time::Instant::now() < deadline, "crawl made no progress");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_full_crawl_respects_robots_disallow() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private/"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            "Home",
            &[
                "/page1".to_string(),
                "/page2".to_string(),
                "/private/secret".to_string(),
            ],
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html_page("Page one", &["/".to_string(), "/page2".to_string()]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html_page("Page two", &[]))
        .mount(&server)
        .await;

    let store = create_store();
    let orchestrator = create_orchestrator(&store, &create_test_config());
    let message = orchestrator
        .start_crawl(&[format!("{}/", base)], create_test_config(), OWNER)
        .await
        .unwrap();
    assert!(message.contains("1 seed"));

    assert_eq!(settle(&orchestrator).await, JobStatus::Completed);

    let snapshot = orchestrator.get_status(&StatusQuery::full());
    assert_eq!(snapshot.stats.crawled, 3);
    assert_eq!(snapshot.stats.discovered, 3);
    assert_eq!(snapshot.stats.blocked.internal, 1);
    assert_eq!(request_count(&server, "/private/secret").await, 0);

    let urls: HashSet<String> = snapshot.urls.iter().map(|p| p.url.clone()).collect();
    assert!(urls.contains(&format!("{}/page1", base)));
    assert!(urls.contains(&format!("{}/page2", base)));

    // The blocked target is still part of the link graph
    assert!(snapshot
        .links
        .iter()
        .any(|l| l.target_url == format!("{}/private/secret", base) && l.is_internal));

    // Every page is persisted once the job completes
    let job_id = snapshot.job_id.unwrap();
    let guard = store.lock();
    assert_eq!(guard.load_pages(job_id).unwrap().len(), 3);
    assert_eq!(
        guard.load_job(job_id).unwrap().unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_each_url_is_fetched_once() {
    let server = MockServer::start().await;
    mount_site(&server, 6, Duration::ZERO).await;

    let store = create_store();
    let config = CrawlConfig {
        concurrency: 4,
        ..create_test_config()
    };
    let orchestrator = create_orchestrator(&store, &config);
    let seeds = vec![format!("{}/", server.uri()), format!("{}/", server.uri())];
    orchestrator.start_crawl(&seeds, config, OWNER).await.unwrap();
    assert_eq!(settle(&orchestrator).await, JobStatus::Completed);

    assert_eq!(request_count(&server, "/").await, 1);
    for i in 0..6 {
        assert_eq!(request_count(&server, &format!("/page{}", i)).await, 1);
    }
    assert_eq!(orchestrator.get_status(&StatusQuery::default()).stats.crawled, 7);
}

#[tokio::test]
async fn test_robots_404_allows_everything() {
    let server = MockServer::start().await;
    mount_site(&server, 2, Duration::ZERO).await;

    let store = create_store();
    let orchestrator = create_orchestrator(&store, &create_test_config());
    orchestrator
        .start_crawl(&[server.uri()], create_test_config(), OWNER)
        .await
        .unwrap();
    assert_eq!(settle(&orchestrator).await, JobStatus::Completed);

    let snapshot = orchestrator.get_status(&StatusQuery::default());
    assert_eq!(snapshot.stats.crawled, 3);
    assert_eq!(snapshot.stats.blocked.total, 0);

    let host = Url::parse(&server.uri()).unwrap();
    let host_key = format!("{}:{}", host.host_str().unwrap(), host.port().unwrap());
    let analysis = orchestrator.robots().analysis(&host_key).unwrap();
    assert!(analysis.parse_errors.is_empty());
}

#[tokio::test]
async fn test_cursor_polling_has_no_gaps_or_duplicates() {
    let server = MockServer::start().await;
    mount_site(&server, 12, Duration::from_millis(30)).await;

    let store = create_store();
    let orchestrator = create_orchestrator(&store, &create_test_config());
    orchestrator
        .start_crawl(&[server.uri()], create_test_config(), OWNER)
        .await
        .unwrap();

    let mut seen_urls = Vec::new();
    let mut seen_links = 0;
    let mut query = StatusQuery::full();
    loop {
        let snapshot = orchestrator.get_status(&query);
        if !snapshot.full_refresh {
            assert_eq!(snapshot.cursors.urls, query.url_since + snapshot.urls.len());
        }
        seen_urls.extend(snapshot.urls.iter().map(|p| p.url.clone()));
        seen_links += snapshot.links.len();
        query = StatusQuery::after(&snapshot);

        if snapshot.status != JobStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    // One last poll picks up anything recorded after the final check
    let last = orchestrator.get_status(&query);
    seen_urls.extend(last.urls.iter().map(|p| p.url.clone()));
    seen_links += last.links.len();

    let unique: HashSet<&String> = seen_urls.iter().collect();
    assert_eq!(unique.len(), seen_urls.len());
    assert_eq!(seen_urls.len(), 13);
    assert_eq!(seen_links, last.stats.links);
}

#[tokio::test]
async fn test_pause_and_resume_preserve_counts() {
    let server = MockServer::start().await;
    mount_site(&server, 8, Duration::from_millis(150)).await;

    let store = create_store();
    let config = CrawlConfig {
        concurrency: 1,
        ..create_test_config()
    };
    let orchestrator = create_orchestrator(&store, &config);
    orchestrator
        .start_crawl(&[server.uri()], config, OWNER)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    orchestrator.pause_crawl().await.unwrap();
    assert_eq!(orchestrator.status(), JobStatus::Paused);

    let paused = orchestrator.get_status(&StatusQuery::default()).stats;
    assert!(paused.crawled < 9);
    assert_eq!(paused.in_flight, 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let still_paused = orchestrator.get_status(&StatusQuery::default()).stats;
    assert_eq!(still_paused.crawled, paused.crawled);
    assert_eq!(still_paused.discovered, paused.discovered);

    orchestrator.resume_crawl().await.unwrap();
    assert_eq!(settle(&orchestrator).await, JobStatus::Completed);

    let done = orchestrator.get_status(&StatusQuery::default()).stats;
    assert_eq!(done.crawled, 9);
    assert_eq!(done.discovered, 9);
    for i in 0..8 {
        assert_eq!(request_count(&server, &format!("/page{}", i)).await, 1);
    }
}

#[tokio::test]
async fn test_resume_from_database_continues_job() {
    let server = MockServer::start().await;
    mount_site(&server, 6, Duration::from_millis(150)).await;

    let store = create_store();
    let config = CrawlConfig {
        concurrency: 1,
        ..create_test_config()
    };

    let first = create_orchestrator(&store, &config);
    first
        .start_crawl(&[server.uri()], config.clone(), OWNER)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;
    first.pause_crawl().await.unwrap();
    let job_id = first.job_id().unwrap();
    let crawled_before = first.get_status(&StatusQuery::default()).stats.crawled;
    assert!(crawled_before >= 1);

    let second = create_orchestrator(&store, &config);
    assert!(matches!(
        second.resume_from_database(job_id, "mallory").await,
        Err(WalkerError::Unauthorized { .. })
    ));
    assert!(matches!(
        second.resume_from_database(9999, OWNER).await,
        Err(WalkerError::NotFound { job_id: 9999 })
    ));

    second.resume_from_database(job_id, OWNER).await.unwrap();
    let restored = second.get_status(&StatusQuery::default());
    assert!(restored.full_refresh);
    assert_eq!(restored.urls.len(), restored.stats.crawled);

    assert_eq!(settle(&second).await, JobStatus::Completed);
    let snapshot = second.get_status(&StatusQuery::full());
    assert_eq!(snapshot.stats.crawled, 7);
    let unique: HashSet<&String> = snapshot.urls.iter().map(|p| &p.url).collect();
    assert_eq!(unique.len(), 7);
    for i in 0..6 {
        assert_eq!(request_count(&server, &format!("/page{}", i)).await, 1);
    }
}

#[tokio::test]
async fn test_load_from_database_is_view_only() {
    let server = MockServer::start().await;
    mount_site(&server, 2, Duration::ZERO).await;

    let store = create_store();
    let first = create_orchestrator(&store, &create_test_config());
    first
        .start_crawl(&[server.uri()], create_test_config(), OWNER)
        .await
        .unwrap();
    assert_eq!(settle(&first).await, JobStatus::Completed);
    let job_id = first.job_id().unwrap();

    let viewer = create_orchestrator(&store, &create_test_config());
    viewer.load_from_database(job_id, OWNER).await.unwrap();
    assert_eq!(viewer.status(), JobStatus::Completed);

    let snapshot = viewer.get_status(&StatusQuery {
        url_since: 100,
        ..StatusQuery::default()
    });
    assert!(snapshot.full_refresh);
    assert_eq!(snapshot.urls.len(), 3);
    assert!(!snapshot.links.is_empty());
    assert_eq!(request_count(&server, "/").await, 1);
}

#[tokio::test]
async fn test_crash_sweep_fails_orphaned_jobs() {
    let server = MockServer::start().await;
    mount_site(&server, 4, Duration::from_millis(500)).await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("walker.db");
    let store = shared(SqliteStorage::new(&db_path, 5).unwrap());

    let job_id = {
        let orchestrator = create_orchestrator(&store, &create_test_config());
        orchestrator
            .start_crawl(&[server.uri()], create_test_config(), OWNER)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        orchestrator.job_id().unwrap()
        // Dropped mid-crawl without a shutdown, like a killed process
    };

    let restarted = shared(SqliteStorage::new(&db_path, 5).unwrap());
    assert_eq!(recover_crashed_jobs(&restarted).unwrap(), vec![job_id]);
    assert_eq!(
        restarted.lock().load_job(job_id).unwrap().unwrap().status,
        JobStatus::Failed
    );

    // Never resumed automatically, but a manual resume is allowed
    let orchestrator = create_orchestrator(&restarted, &create_test_config());
    assert_eq!(orchestrator.status(), JobStatus::Idle);
    orchestrator.resume_from_database(job_id, OWNER).await.unwrap();
    assert_eq!(settle(&orchestrator).await, JobStatus::Completed);
}

#[tokio::test]
async fn test_crash_resume_keeps_links_of_pages_saved_after_checkpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Home", &["/a".to_string()]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page("Page a", &["/b".to_string()]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html_page("Page b", &[]).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("walker.db");
    let config = CrawlConfig {
        concurrency: 1,
        checkpoint_interval: 1000,
        ..create_test_config()
    };

    let job_id = {
        let store = shared(SqliteStorage::new(&db_path, 1).unwrap());
        let orchestrator = create_orchestrator(&store, &config);
        orchestrator
            .start_crawl(&[server.uri()], config.clone(), OWNER)
            .await
            .unwrap();
        wait_for_crawled(&orchestrator, 2).await;
        orchestrator.job_id().unwrap()
        // Killed while /b is in flight, long before a frontier checkpoint
    };

    let restarted = shared(SqliteStorage::new(&db_path, 1).unwrap());
    assert_eq!(recover_crashed_jobs(&restarted).unwrap(), vec![job_id]);
    assert_eq!(restarted.lock().load_pages(job_id).unwrap().len(), 2);

    let orchestrator = create_orchestrator(&restarted, &config);
    orchestrator.resume_from_database(job_id, OWNER).await.unwrap();
    assert_eq!(settle(&orchestrator).await, JobStatus::Completed);

    let snapshot = orchestrator.get_status(&StatusQuery::full());
    assert_eq!(snapshot.stats.crawled, 3);
    let b = format!("{}/b", server.uri());
    let page = snapshot.urls.iter().find(|p| p.url == b).unwrap();
    assert_eq!(page.depth, 2);
    assert_eq!(page.status_code, 200);
}

#[tokio::test]
async fn test_resume_rejected_after_completion() {
    let server = MockServer::start().await;
    mount_site(&server, 2, Duration::ZERO).await;

    let store = create_store();
    let orchestrator = create_orchestrator(&store, &create_test_config());
    orchestrator
        .start_crawl(&[server.uri()], create_test_config(), OWNER)
        .await
        .unwrap();
    assert_eq!(settle(&orchestrator).await, JobStatus::Completed);

    let result = orchestrator.resume_crawl().await;
    assert!(matches!(
        result,
        Err(WalkerError::InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Running
        })
    ));
    assert_eq!(orchestrator.status(), JobStatus::Completed);
    assert_eq!(request_count(&server, "/").await, 1);
}

#[tokio::test]
async fn test_start_while_running_is_rejected() {
    let server = MockServer::start().await;
    mount_site(&server, 4, Duration::from_millis(300)).await;

    let store = create_store();
    let orchestrator = create_orchestrator(&store, &create_test_config());
    orchestrator
        .start_crawl(&[server.uri()], create_test_config(), OWNER)
        .await
        .unwrap();

    let second = orchestrator
        .start_crawl(&[server.uri()], create_test_config(), OWNER)
        .await;
    assert!(matches!(second, Err(WalkerError::AlreadyRunning)));

    orchestrator.stop_crawl().await.unwrap();
    assert_eq!(orchestrator.status(), JobStatus::Stopped);
    assert!(matches!(
        orchestrator.resume_crawl().await,
        Err(WalkerError::InvalidTransition { .. })
    ));

    // Stopping again is a no-op
    orchestrator.stop_crawl().await.unwrap();

    let job_id = orchestrator.job_id().unwrap();
    assert_eq!(
        store.lock().load_job(job_id).unwrap().unwrap().status,
        JobStatus::Stopped
    );
}

#[tokio::test]
async fn test_start_without_valid_seeds_fails() {
    let store = create_store();
    let orchestrator = create_orchestrator(&store, &create_test_config());
    let result = orchestrator
        .start_crawl(&["not a url".to_string()], create_test_config(), OWNER)
        .await;
    assert!(matches!(result, Err(WalkerError::NoSeeds)));
    assert_eq!(orchestrator.status(), JobStatus::Idle);
}

#[tokio::test]
async fn test_error_pages_raise_issues() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("Home", &["/missing".to_string(), "/broken".to_string()]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = create_store();
    let config = CrawlConfig {
        retries: 1,
        ..create_test_config()
    };
    let orchestrator = create_orchestrator(&store, &config);
    orchestrator
        .start_crawl(&[server.uri()], config, OWNER)
        .await
        .unwrap();
    assert_eq!(settle(&orchestrator).await, JobStatus::Completed);

    // One retry for the 5xx response
    assert_eq!(request_count(&server, "/broken").await, 2);

    let snapshot = orchestrator.get_status(&StatusQuery::full());
    let missing = format!("{}/missing", server.uri());
    let page = snapshot.urls.iter().find(|p| p.url == missing).unwrap();
    assert_eq!(page.status_code, 404);

    assert!(snapshot
        .issues
        .iter()
        .any(|i| i.url == missing && i.message == "HTTP 404 error"));
    assert!(snapshot
        .issues
        .iter()
        .any(|i| i.message == "HTTP 500 error"));

    let link = snapshot
        .links
        .iter()
        .find(|l| l.target_url == missing)
        .unwrap();
    assert_eq!(link.target_status, Some(404));
}

#[tokio::test]
async fn test_hard_memory_limit_pauses_job() {
    let server = MockServer::start().await;
    mount_site(&server, 3, Duration::ZERO).await;

    let store = create_store();
    let probe = FixedProbe::new(u64::MAX);
    let orchestrator = CrawlOrchestrator::with_probe(
        "memory-session",
        create_test_config(),
        &MemoryConfig::default(),
        Arc::new(HttpFetcher::new().unwrap()),
        Arc::clone(&store),
        Box::new(probe.clone()),
    );
    orchestrator
        .start_crawl(&[server.uri()], create_test_config(), OWNER)
        .await
        .unwrap();
    assert_eq!(settle(&orchestrator).await, JobStatus::Paused);

    let snapshot = orchestrator.get_status(&StatusQuery::default());
    assert_eq!(snapshot.stats.crawled, 1);
    assert_eq!(snapshot.stats.queued, 0);
    assert_eq!(snapshot.stats.links, 3);
    assert!(snapshot.error.unwrap().contains("Memory limit"));

    let job_id = snapshot.job_id.unwrap();
    let guard = store.lock();
    assert_eq!(guard.load_job(job_id).unwrap().unwrap().status, JobStatus::Paused);
    assert_eq!(guard.load_pages(job_id).unwrap().len(), 1);
}

/// Panics on every fetch
struct PanickingFetcher;

#[async_trait]
impl Fetcher for PanickingFetcher {
    async fn fetch(&self, url: &Url, _options: &FetchOptions) -> Result<FetchResponse, NetworkError> {
        panic!("fetcher exploded on {}", url);
    }
}

#[tokio::test]
async fn test_worker_panic_marks_job_crashed() {
    let store = create_store();
    let config = CrawlConfig {
        robots_mode: RobotsMode::Ignore,
        concurrency: 1,
        ..create_test_config()
    };
    let orchestrator =
        create_orchestrator_with_fetcher(&store, &config, Arc::new(PanickingFetcher));
    orchestrator
        .start_crawl(&["https://example.com/".to_string()], config, OWNER)
        .await
        .unwrap();

    assert_eq!(settle(&orchestrator).await, JobStatus::Crashed);
    let snapshot = orchestrator.get_status(&StatusQuery::default());
    assert!(snapshot.error.unwrap().contains("panicked"));

    let job_id = snapshot.job_id.unwrap();
    assert_eq!(
        store.lock().load_job(job_id).unwrap().unwrap().status,
        JobStatus::Crashed
    );
}
