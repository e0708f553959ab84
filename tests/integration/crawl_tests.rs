//! Integration tests for the crawler
//!
//! The end-to-end test drives the real HTTP fetcher against a wiremock
//! server. The scenario tests use an in-process fetcher that records when
//! each document was requested.

use async_trait::async_trait;
use driftnet::config::{Config, UserAgentConfig};
use driftnet::crawler::{
    Coordinator, Document, FetchError, Fetcher, HtmlLinkExtractor, Startup, StopReason,
};
use driftnet::normalize;
use driftnet::state::{ErrorKind, QueuedUrl};
use driftnet::storage::{share, Checkpoint, CheckpointStore, SqliteCheckpointStore};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration with short timers, writing `seeds` to disk
fn create_test_config(dir: &Path, seeds: &[String]) -> Config {
    let mut config = Config::with_user_agent(UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    });
    config.crawler.workers = 4;
    config.crawler.domain_delay_ms = 0;
    config.crawler.dispatch_poll_ms = 5;
    config.fetcher.request_timeout_secs = 5;
    config.fetcher.retry_budget = 0;
    config.shutdown.deadline_secs = 30;
    config.shutdown.idle_grace_secs = 0;
    config.shutdown.poll_interval_ms = 20;
    config.governor.cache_dir = dir.join("cache");
    config.output.database_path = dir.join("crawl.db");
    config.output.seeds_path = dir.join("seeds.txt");

    std::fs::write(&config.output.seeds_path, seeds.join("\n")).unwrap();
    config
}

fn html_page(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><body>{}</body></html>", body).into_bytes(),
        "text/html",
    )
}

/// Serves canned HTML per URL and records when each document was requested
#[derive(Default)]
struct RecordingFetcher {
    pages: HashMap<String, String>,
    requested: Mutex<Vec<(String, Instant)>>,
}

impl RecordingFetcher {
    fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    fn requested_at(&self, url: &str) -> Option<Instant> {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _)| u == url)
            .map(|(_, at)| *at)
    }

    fn request_count(&self, url: &str) -> usize {
        self.requested
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .count()
    }
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn fetch_document(&self, url: &str) -> Result<Document, FetchError> {
        self.requested
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));

        match self.pages.get(url) {
            Some(body) => Ok(Document {
                url: url.to_string(),
                status: 200,
                content_type: "text/html".to_string(),
                body: body.clone(),
            }),
            None => Err(FetchError::Status(404)),
        }
    }

    async fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Status(404))
    }
}

fn stub_coordinator(config: Config, fetcher: Arc<RecordingFetcher>) -> Coordinator {
    Coordinator::new(
        config,
        Some("test".to_string()),
        fetcher,
        Arc::new(HtmlLinkExtractor::default()),
        share(SqliteCheckpointStore::new_in_memory().unwrap()),
    )
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(&format!(
            r#"<a href="{0}/page1">Page 1</a> <a href="/page2">Page 2</a> <a href="/missing">Gone</a>"#,
            base_url
        )))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html_page("Content 1"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html_page("Content 2"))
        .mount(&mock_server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), &[format!("{}/", base_url)]);
    let db_path = config.output.database_path.clone();

    let coordinator = Coordinator::from_config(config, "hash".to_string()).unwrap();
    assert_eq!(coordinator.prepare(false).unwrap(), Startup::Seeded { seeds: 1 });
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.stop_reason, StopReason::Idle);
    assert_eq!(report.visited, 4);
    assert_eq!(report.queued, 0);

    let frontier = coordinator.frontier();
    for page in ["/", "/page1", "/page2", "/missing"] {
        let url = normalize(&format!("{}{}", base_url, page));
        assert!(frontier.is_visited(&url), "{} not visited", url);
    }

    let errors = coordinator.error_log().records();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ErrorKind::HttpStatus(404));
    assert!(errors[0].url.ends_with("/missing"));

    // The final checkpoint and the error log are on disk
    let store = SqliteCheckpointStore::new(&db_path).unwrap();
    let checkpoint = store.load().unwrap().unwrap();
    assert_eq!(checkpoint.visited.len(), 4);
    assert!(checkpoint.queued.is_empty());
    assert_eq!(checkpoint.config_hash.as_deref(), Some("hash"));
    assert_eq!(store.load_errors().unwrap().len(), 1);
}

#[tokio::test]
async fn test_per_domain_delay_does_not_block_other_domains() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path(), &["http://a.test/".to_string()]);
    let delay = Duration::from_millis(400);
    config.crawler.domain_delay_ms = delay.as_millis() as u64;

    let fetcher = Arc::new(
        RecordingFetcher::default()
            .page(
                "http://a.test",
                r#"<a href="http://a.test/x">x</a> <a href="http://b.test/y">y</a>"#,
            )
            .page("http://a.test/x", "leaf")
            .page("http://b.test/y", "leaf"),
    );
    let coordinator = stub_coordinator(config, fetcher.clone());
    coordinator.prepare(false).unwrap();
    let report = coordinator.run().await.unwrap();
    assert_eq!(report.stop_reason, StopReason::Idle);

    let frontier = coordinator.frontier();
    for url in ["http://a.test", "http://a.test/x", "http://b.test/y"] {
        assert!(frontier.is_found(url), "{} not found", url);
    }

    let seed_at = fetcher.requested_at("http://a.test").unwrap();
    let same_domain_at = fetcher.requested_at("http://a.test/x").unwrap();
    let other_domain_at = fetcher.requested_at("http://b.test/y").unwrap();

    // The seed's fetch starts a little after its dispatch, after sitemap discovery
    let slack = Duration::from_millis(20);
    assert!(same_domain_at.duration_since(seed_at) + slack >= delay);
    assert!(other_domain_at < same_domain_at);
    assert_eq!(fetcher.request_count("http://a.test"), 1);
}

#[tokio::test]
async fn test_seed_404_is_logged_and_visited() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), &["http://a.test/".to_string()]);

    let fetcher = Arc::new(RecordingFetcher::default());
    let coordinator = stub_coordinator(config, fetcher);
    coordinator.prepare(false).unwrap();
    coordinator.run().await.unwrap();

    let errors = coordinator.error_log().records();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].url, "http://a.test");
    assert_eq!(errors[0].kind.to_db_string(), "HTTP_404");

    let frontier = coordinator.frontier();
    assert!(frontier.is_visited("http://a.test"));
    assert_eq!(frontier.found_len(), 1);
}

#[tokio::test]
async fn test_memory_ceiling_stops_admissions() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(dir.path(), &["http://a.test/".to_string()]);
    config.governor.memory_ceiling_mb = 1;

    let fetcher = Arc::new(RecordingFetcher::default().page(
        "http://a.test",
        r#"<a href="http://a.test/x">x</a> <a href="http://b.test/y">y</a>"#,
    ));
    let coordinator = stub_coordinator(config, fetcher);
    coordinator.prepare(false).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.stop_reason, StopReason::ResourceLimit);
    let frontier = coordinator.frontier();
    assert!(frontier.is_visited("http://a.test"));
    assert_eq!(frontier.found_len(), 1);
}

#[tokio::test]
async fn test_resume_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), &["http://seed.test/".to_string()]);
    let db_path = config.output.database_path.clone();

    {
        let mut store = SqliteCheckpointStore::new(&db_path).unwrap();
        store
            .save(&Checkpoint {
                queued: vec![QueuedUrl::new("http://a.test/next", 1)],
                visited: vec!["http://a.test".to_string()],
                found: vec!["http://a.test".to_string(), "http://a.test/next".to_string()],
                config_hash: Some("test".to_string()),
                saved_at: None,
            })
            .unwrap();
    }

    let fetcher = Arc::new(RecordingFetcher::default().page("http://a.test/next", "leaf"));
    let coordinator = Coordinator::new(
        config,
        Some("test".to_string()),
        fetcher.clone(),
        Arc::new(HtmlLinkExtractor::default()),
        share(SqliteCheckpointStore::new(&db_path).unwrap()),
    );

    assert_eq!(coordinator.prepare(false).unwrap(), Startup::Resumed { queued: 1 });
    coordinator.run().await.unwrap();

    assert_eq!(fetcher.request_count("http://a.test/next"), 1);
    assert_eq!(fetcher.request_count("http://a.test"), 0);
    assert_eq!(fetcher.request_count("http://seed.test"), 0);

    let checkpoint = SqliteCheckpointStore::new(&db_path).unwrap().load().unwrap().unwrap();
    assert!(checkpoint.queued.is_empty());
    assert!(checkpoint.visited.contains(&"http://a.test/next".to_string()));
}

#[tokio::test]
async fn test_fresh_start_discards_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path(), &["http://seed.test/".to_string()]);
    let db_path = config.output.database_path.clone();

    {
        let mut store = SqliteCheckpointStore::new(&db_path).unwrap();
        store
            .save(&Checkpoint {
                queued: vec![QueuedUrl::new("http://a.test/next", 1)],
                ..Checkpoint::default()
            })
            .unwrap();
    }

    let fetcher = Arc::new(RecordingFetcher::default().page("http://seed.test", "leaf"));
    let coordinator = Coordinator::new(
        config,
        None,
        fetcher.clone(),
        Arc::new(HtmlLinkExtractor::default()),
        share(SqliteCheckpointStore::new(&db_path).unwrap()),
    );

    assert_eq!(coordinator.prepare(true).unwrap(), Startup::Seeded { seeds: 1 });
    coordinator.run().await.unwrap();

    assert_eq!(fetcher.request_count("http://seed.test"), 1);
    assert_eq!(fetcher.request_count("http://a.test/next"), 0);
}
