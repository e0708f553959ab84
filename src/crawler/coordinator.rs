//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl lifecycle, including:
//! - Restoring the frontier from a checkpoint or seeding it
//! - Spawning the worker pool and the telemetry reporter
//! - The supervisory loop (RUNNING -> DRAINING -> STOPPED)
//! - The final checkpoint and crawl report

use crate::config::Config;
use crate::crawler::fetcher::{Fetcher, HttpFetcher};
use crate::crawler::frontier::Frontier;
use crate::crawler::parser::{HtmlLinkExtractor, LinkExtractor};
use crate::crawler::sitemap::SitemapResolver;
use crate::crawler::worker::{run_worker, CrawlContext};
use crate::governor::ResourceGovernor;
use crate::output::{run_reporter, Telemetry};
use crate::state::ErrorLog;
use crate::storage::{open_storage, share, SharedStore, StorageError};
use crate::{CrawlError, Result};
use std::fmt;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Supervisory state of a crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Running,
    Draining,
    Stopped,
}

/// Why the supervisor left RUNNING
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The wall-clock deadline elapsed
    Deadline,
    /// The frontier stayed empty for the idle grace period
    Idle,
    /// The memory ceiling was exceeded
    ResourceLimit,
    /// The process received Ctrl-C
    Interrupted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Deadline => "deadline reached",
            Self::Idle => "frontier idle",
            Self::ResourceLimit => "resource limit exceeded",
            Self::Interrupted => "interrupted",
        };
        f.write_str(text)
    }
}

/// Where the initial frontier came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// Restored from a checkpoint, with the number of re-enqueued URLs
    Resumed { queued: usize },
    /// Seeded from the seed file, with the number of admitted seeds
    Seeded { seeds: usize },
}

/// Summary of a finished crawl
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlReport {
    pub stop_reason: StopReason,
    pub elapsed: Duration,
    pub attempts: u64,
    pub successes: u64,
    pub errors: u64,
    pub visited: usize,
    pub found: usize,
    pub queued: usize,
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stopped ({}) after {:.1}s: {} attempts, {} successes, {} errors; {} visited, {} found, {} queued",
            self.stop_reason,
            self.elapsed.as_secs_f64(),
            self.attempts,
            self.successes,
            self.errors,
            self.visited,
            self.found,
            self.queued
        )
    }
}

/// Reads the seed list: one URL per line, blank lines ignored
///
/// # Returns
///
/// * `Ok(Vec<String>)` - Trimmed, non-empty lines
/// * `Err(CrawlError::Seeds)` - The file could not be read
pub fn load_seeds(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|source| CrawlError::Seeds {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    ctx: Arc<CrawlContext>,
    state: Mutex<CrawlState>,
}

impl Coordinator {
    /// Creates a coordinator over the given collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Stored with every checkpoint
    /// * `fetcher` - Shared by workers and the sitemap resolver
    /// * `extractor` - Turns documents into candidate links
    /// * `store` - Checkpoint and error log persistence
    pub fn new(
        config: Config,
        config_hash: Option<String>,
        fetcher: Arc<dyn Fetcher>,
        extractor: Arc<dyn LinkExtractor>,
        store: SharedStore,
    ) -> Self {
        let ctx = CrawlContext {
            frontier: Arc::new(Frontier::new(&config.crawler)),
            sitemaps: SitemapResolver::new(fetcher.clone()),
            fetcher,
            extractor,
            governor: Arc::new(ResourceGovernor::new(&config.governor)),
            telemetry: Arc::new(Telemetry::new()),
            errors: ErrorLog::new(config.output.error_log_cap),
            store,
            config_hash,
            retry_budget: config.fetcher.retry_budget,
            retry_backoff: config.fetcher.retry_backoff(),
            checkpoint_every: u64::from(config.crawler.checkpoint_every.max(1)),
            processed: AtomicU64::new(0),
        };

        Self {
            config: Arc::new(config),
            ctx: Arc::new(ctx),
            state: Mutex::new(CrawlState::Running),
        }
    }

    /// Creates a coordinator with the HTTP fetcher, HTML extractor and SQLite store
    pub fn from_config(config: Config, config_hash: String) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        let extractor = Arc::new(HtmlLinkExtractor::new(config.crawler.links_per_document));
        let store = share(open_storage(&config)?);
        Ok(Self::new(config, Some(config_hash), fetcher, extractor, store))
    }

    pub fn frontier(&self) -> &Frontier {
        &self.ctx.frontier
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.ctx.errors
    }

    pub fn state(&self) -> CrawlState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: CrawlState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        tracing::debug!("Crawl state {:?} -> {:?}", *state, next);
        *state = next;
    }

    /// Loads the checkpoint, falling back to the seed file
    ///
    /// With `fresh`, the checkpoint and error log are cleared first. A
    /// checkpoint that fails to decode is treated as absent.
    ///
    /// # Returns
    ///
    /// * `Ok(Startup)` - Where the frontier came from
    /// * `Err(CrawlError)` - Storage was unusable, or the seed file was
    ///   missing or held no valid URL
    pub fn prepare(&self, fresh: bool) -> Result<Startup> {
        let loaded = {
            let mut store = self.ctx.store.lock().unwrap_or_else(|e| e.into_inner());
            if fresh {
                tracing::info!("Clearing previous checkpoint");
                store.clear()?;
                None
            } else {
                match store.load() {
                    Ok(Some(checkpoint)) => {
                        let errors = store.load_errors().unwrap_or_else(|e| {
                            tracing::warn!("Ignoring unreadable error log: {}", e);
                            Vec::new()
                        });
                        Some((checkpoint, errors))
                    }
                    Ok(None) => None,
                    Err(StorageError::Decode(reason)) => {
                        tracing::warn!("Discarding invalid checkpoint: {}", reason);
                        // Incremental saves merge into the stored sets
                        store.clear()?;
                        None
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        if let Some((checkpoint, errors)) = loaded {
            if checkpoint.config_hash.is_some() && checkpoint.config_hash != self.ctx.config_hash {
                tracing::warn!("Resuming a checkpoint written under a different configuration");
            }
            for record in errors {
                self.ctx.errors.push(record);
            }

            let queued = self.ctx.frontier.restore(checkpoint);
            tracing::info!(
                "Resumed checkpoint: {} queued, {} visited, {} found",
                queued,
                self.ctx.frontier.visited_len(),
                self.ctx.frontier.found_len()
            );
            return Ok(Startup::Resumed { queued });
        }

        let path = &self.config.output.seeds_path;
        let seeds = load_seeds(path)?;
        let admitted = seeds
            .iter()
            .filter(|seed| self.ctx.frontier.seed(seed, 0).is_admitted())
            .count();
        if admitted == 0 {
            return Err(CrawlError::NoSeeds(path.clone()));
        }

        tracing::info!("Seeded frontier with {} URLs from {}", admitted, path.display());
        Ok(Startup::Seeded { seeds: admitted })
    }

    /// Runs the crawl until a stop condition trips
    ///
    /// Spawns the workers and the reporter, supervises until the deadline,
    /// the idle grace period, the memory ceiling or Ctrl-C, then drains:
    /// workers are cancelled between URLs, awaited, and a final checkpoint
    /// is written.
    pub async fn run(&self) -> Result<CrawlReport> {
        let start = Instant::now();
        self.set_state(CrawlState::Running);
        tracing::info!(
            "Starting crawl with {} workers ({} queued)",
            self.config.crawler.workers,
            self.ctx.frontier.queued_len()
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let workers: Vec<_> = (0..self.config.crawler.workers as usize)
            .map(|id| tokio::spawn(run_worker(id, self.ctx.clone(), shutdown_rx.clone())))
            .collect();
        let reporter = tokio::spawn(run_reporter(
            self.ctx.telemetry.clone(),
            self.config.output.report_interval(),
            shutdown_rx.clone(),
        ));

        let (interrupt_tx, interrupt_rx) = watch::channel(false);
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = interrupt_tx.send(true);
            }
        });

        let reason = self.supervise(start, &interrupt_rx).await;
        interrupt.abort();

        tracing::info!("Draining: {}", reason);
        self.set_state(CrawlState::Draining);
        let _ = shutdown_tx.send(true);

        for worker in workers {
            if let Err(e) = worker.await {
                tracing::warn!("Worker task failed: {}", e);
            }
        }
        reporter.await?;

        self.ctx.save_full_checkpoint().await?;
        self.set_state(CrawlState::Stopped);

        let telemetry = self.ctx.telemetry.snapshot();
        let report = CrawlReport {
            stop_reason: reason,
            elapsed: start.elapsed(),
            attempts: telemetry.attempts,
            successes: telemetry.successes,
            errors: telemetry.errors,
            visited: self.ctx.frontier.visited_len(),
            found: self.ctx.frontier.found_len(),
            queued: self.ctx.frontier.queued_len() + self.ctx.frontier.in_flight_len(),
        };
        tracing::info!("Crawl {}", report);
        Ok(report)
    }

    /// Samples stop conditions until one trips
    ///
    /// The crawl counts as idle only while nothing is queued and nothing is
    /// in flight, so the grace period never cuts off a document's links.
    async fn supervise(&self, start: Instant, interrupted: &watch::Receiver<bool>) -> StopReason {
        let shutdown = &self.config.shutdown;
        let sample_interval = self.config.governor.sample_interval();
        let mut ticker = tokio::time::interval(shutdown.poll_interval());
        let mut idle_since: Option<Instant> = None;
        let mut last_cache_check = Instant::now();

        loop {
            ticker.tick().await;
            let now = Instant::now();

            if *interrupted.borrow() {
                return StopReason::Interrupted;
            }
            if self.ctx.governor.is_tripped() {
                return StopReason::ResourceLimit;
            }
            if now.duration_since(start) >= shutdown.deadline() {
                return StopReason::Deadline;
            }

            if self.ctx.frontier.is_idle() && self.ctx.frontier.in_flight_len() == 0 {
                let since = *idle_since.get_or_insert(now);
                if now.duration_since(since) >= shutdown.idle_grace() {
                    return StopReason::Idle;
                }
            } else {
                idle_since = None;
            }

            if now.duration_since(last_cache_check) >= sample_interval {
                last_cache_check = now;
                let governor = self.ctx.governor.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || governor.over_cache_limit()).await {
                    tracing::warn!("Cache check failed: {}", e);
                }
            }
        }
    }
}

/// Runs a complete crawl
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file
/// * `fresh` - Discard any previous checkpoint
///
/// # Example
///
/// ```no_run
/// use driftnet::config::load_config_with_hash;
/// use driftnet::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let report = run_crawl(config, hash, false).await?;
/// println!("{}", report);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, config_hash: String, fresh: bool) -> Result<CrawlReport> {
    let coordinator = Coordinator::from_config(config, config_hash)?;
    coordinator.prepare(fresh)?;
    coordinator.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserAgentConfig;
    use crate::crawler::testing::StubFetcher;
    use crate::storage::{Checkpoint, CheckpointStore, SqliteCheckpointStore};
    use crate::state::QueuedUrl;

    fn create_test_config(dir: &Path) -> Config {
        let mut config = Config::with_user_agent(UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        });
        config.crawler.workers = 4;
        config.crawler.domain_delay_ms = 0;
        config.crawler.dispatch_poll_ms = 5;
        config.shutdown.idle_grace_secs = 0;
        config.shutdown.poll_interval_ms = 10;
        config.output.seeds_path = dir.join("seeds.txt");
        config.output.database_path = dir.join("crawl.db");
        config.governor.cache_dir = dir.join("cache");
        config
    }

    fn coordinator(config: Config, fetcher: StubFetcher) -> Coordinator {
        Coordinator::new(
            config,
            Some("hash".to_string()),
            Arc::new(fetcher),
            Arc::new(HtmlLinkExtractor::default()),
            share(SqliteCheckpointStore::new_in_memory().unwrap()),
        )
    }

    #[test]
    fn test_load_seeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seeds.txt");
        std::fs::write(&path, "http://a.test/\n\n  http://b.test  \n").unwrap();

        assert_eq!(load_seeds(&path).unwrap(), vec!["http://a.test/", "http://b.test"]);
    }

    #[test]
    fn test_missing_seed_file() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator(create_test_config(dir.path()), StubFetcher::new());

        assert!(matches!(coordinator.prepare(false), Err(CrawlError::Seeds { .. })));
    }

    #[test]
    fn test_seed_file_without_urls() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config(dir.path());
        std::fs::write(&config.output.seeds_path, "not a url\nftp://x.test\n").unwrap();
        let coordinator = coordinator(config, StubFetcher::new());

        assert!(matches!(coordinator.prepare(false), Err(CrawlError::NoSeeds(_))));
    }

    #[test]
    fn test_prepare_prefers_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config(dir.path());
        std::fs::write(&config.output.seeds_path, "http://seed.test\n").unwrap();

        let mut store = SqliteCheckpointStore::new_in_memory().unwrap();
        store
            .save(&Checkpoint {
                queued: vec![QueuedUrl::new("http://a.test/x", 1)],
                visited: vec!["http://a.test".to_string()],
                found: vec!["http://a.test".to_string(), "http://a.test/x".to_string()],
                ..Checkpoint::default()
            })
            .unwrap();

        let coordinator = Coordinator::new(
            config,
            None,
            Arc::new(StubFetcher::new()),
            Arc::new(HtmlLinkExtractor::default()),
            share(store),
        );

        assert_eq!(coordinator.prepare(false).unwrap(), Startup::Resumed { queued: 1 });
        assert!(!coordinator.frontier().is_found("http://seed.test"));
        assert!(coordinator.frontier().is_visited("http://a.test"));
    }

    #[test]
    fn test_fresh_ignores_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config(dir.path());
        std::fs::write(&config.output.seeds_path, "http://seed.test\n").unwrap();

        let mut store = SqliteCheckpointStore::new_in_memory().unwrap();
        store
            .save(&Checkpoint {
                queued: vec![QueuedUrl::new("http://a.test/x", 1)],
                ..Checkpoint::default()
            })
            .unwrap();

        let coordinator = Coordinator::new(
            config,
            None,
            Arc::new(StubFetcher::new()),
            Arc::new(HtmlLinkExtractor::default()),
            share(store),
        );

        assert_eq!(coordinator.prepare(true).unwrap(), Startup::Seeded { seeds: 1 });
        assert!(!coordinator.frontier().is_found("http://a.test/x"));
    }

    #[test]
    fn test_invalid_checkpoint_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config(dir.path());
        std::fs::write(&config.output.seeds_path, "http://seed.test\n").unwrap();

        {
            let mut store = SqliteCheckpointStore::new(&config.output.database_path).unwrap();
            store
                .save(&Checkpoint {
                    queued: vec![QueuedUrl::new("http://a.test/x", 1)],
                    found: vec!["http://a.test/x".to_string()],
                    ..Checkpoint::default()
                })
                .unwrap();
        }
        rusqlite::Connection::open(&config.output.database_path)
            .unwrap()
            .execute("UPDATE queued SET depth = -1", [])
            .unwrap();

        let store = SqliteCheckpointStore::new(&config.output.database_path).unwrap();
        let coordinator = Coordinator::new(
            config,
            None,
            Arc::new(StubFetcher::new()),
            Arc::new(HtmlLinkExtractor::default()),
            share(store),
        );

        assert_eq!(coordinator.prepare(false).unwrap(), Startup::Seeded { seeds: 1 });
        assert!(coordinator.ctx.store.lock().unwrap().load().unwrap().is_none());
        assert!(!coordinator.frontier().is_found("http://a.test/x"));
    }

    #[tokio::test]
    async fn test_idle_frontier_stops_crawl() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config(dir.path());
        std::fs::write(&config.output.seeds_path, "http://a.test\n").unwrap();

        let page = r#"<html><body><a href="http://a.test/x">x</a></body></html>"#;
        let fetcher = StubFetcher::new()
            .html("http://a.test", page)
            .html("http://a.test/x", "<html><body>leaf</body></html>");
        let coordinator = coordinator(config, fetcher);
        coordinator.prepare(false).unwrap();

        let report = coordinator.run().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Idle);
        assert_eq!(coordinator.state(), CrawlState::Stopped);
        assert!(coordinator.frontier().is_visited("http://a.test"));
        assert!(report.found >= 1);
    }

    #[tokio::test]
    async fn test_deadline_stops_crawl() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = create_test_config(dir.path());
        config.shutdown.deadline_secs = 0;
        config.shutdown.idle_grace_secs = 60;
        std::fs::write(&config.output.seeds_path, "http://a.test\n").unwrap();

        let coordinator = coordinator(config, StubFetcher::new());
        coordinator.prepare(false).unwrap();

        let report = coordinator.run().await.unwrap();
        assert_eq!(report.stop_reason, StopReason::Deadline);
    }

    #[test]
    fn test_report_display() {
        let report = CrawlReport {
            stop_reason: StopReason::Idle,
            elapsed: Duration::from_secs(3),
            attempts: 5,
            successes: 4,
            errors: 1,
            visited: 5,
            found: 9,
            queued: 4,
        };
        let line = report.to_string();
        assert!(line.starts_with("stopped (frontier idle)"));
        assert!(line.contains("9 found"));
    }
}
