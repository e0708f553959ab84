//! Fetch-extract-enqueue workers
//!
//! Every worker runs the same loop over the shared [`CrawlContext`]:
//! dispatch from the frontier, expand the domain's sitemaps once, fetch with
//! retries, record failures, admit extracted links and checkpoint. Per-URL
//! failures never leave the worker.

use crate::crawler::fetcher::{Document, FetchError, Fetcher};
use crate::crawler::frontier::Frontier;
use crate::crawler::parser::LinkExtractor;
use crate::crawler::sitemap::SitemapResolver;
use crate::governor::ResourceGovernor;
use crate::output::Telemetry;
use crate::state::{ErrorKind, ErrorLog, ErrorRecord, QueuedUrl};
use crate::storage::{SharedStore, StorageResult};
use crate::url::{domain_of, normalize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// State shared by all workers and the supervisor
pub struct CrawlContext {
    pub(crate) frontier: Arc<Frontier>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) extractor: Arc<dyn LinkExtractor>,
    pub(crate) sitemaps: SitemapResolver,
    pub(crate) governor: Arc<ResourceGovernor>,
    pub(crate) telemetry: Arc<Telemetry>,
    pub(crate) errors: ErrorLog,
    pub(crate) store: SharedStore,
    pub(crate) config_hash: Option<String>,
    pub(crate) retry_budget: u32,
    pub(crate) retry_backoff: Duration,
    pub(crate) checkpoint_every: u64,
    pub(crate) processed: AtomicU64,
}

impl CrawlContext {
    /// Writes the frontier changes since the last save to the checkpoint store
    ///
    /// Runs on the blocking pool. The store lock is taken before the delta
    /// is captured, so saves land in capture order; a failed delta goes back
    /// to the frontier's journal for the next save.
    pub(crate) async fn save_checkpoint(&self) -> StorageResult<()> {
        let store = Arc::clone(&self.store);
        let frontier = Arc::clone(&self.frontier);
        let config_hash = self.config_hash.clone();

        tokio::task::spawn_blocking(move || -> StorageResult<()> {
            let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
            let delta = frontier.checkpoint_delta(config_hash);
            if let Err(e) = store.save_delta(&delta) {
                frontier.unsave(delta);
                return Err(e);
            }
            tracing::trace!(
                "Checkpoint saved: {} queued, {} newly visited, {} newly found",
                delta.queued.len(),
                delta.visited.len(),
                delta.found.len()
            );
            Ok(())
        })
        .await?
    }

    /// Replaces the stored checkpoint with a complete snapshot of the frontier
    pub(crate) async fn save_full_checkpoint(&self) -> StorageResult<()> {
        let store = Arc::clone(&self.store);
        let frontier = Arc::clone(&self.frontier);
        let config_hash = self.config_hash.clone();

        tokio::task::spawn_blocking(move || -> StorageResult<()> {
            let mut store = store.lock().unwrap_or_else(|e| e.into_inner());
            let checkpoint = frontier.checkpoint(config_hash);
            store.save(&checkpoint)?;
            tracing::debug!(
                "Full checkpoint saved: {} queued, {} visited, {} found",
                checkpoint.queued.len(),
                checkpoint.visited.len(),
                checkpoint.found.len()
            );
            Ok(())
        })
        .await?
    }

    fn record_failure(&self, url: &str, kind: ErrorKind) {
        tracing::debug!("{} failed: {}", url, kind);
        let record = ErrorRecord::now(url, kind);

        {
            let mut store = self.store.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = store.append_error(&record) {
                tracing::warn!("Failed to persist error for {}: {}", url, e);
            }
        }

        self.errors.push(record);
        self.telemetry.record_error();
    }

    /// Fetches a document, retrying transport failures with linear backoff
    async fn fetch_with_retry(&self, url: &str) -> Result<Document, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetcher.fetch_document(url).await {
                Err(e) if e.is_retryable() && attempt < self.retry_budget => {
                    attempt += 1;
                    tracing::debug!("Retrying {} ({}/{}): {}", url, attempt, self.retry_budget, e);
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                result => return result,
            }
        }
    }
}

/// Runs one worker until `shutdown` turns true
pub async fn run_worker(id: usize, ctx: Arc<CrawlContext>, mut shutdown: watch::Receiver<bool>) {
    tracing::trace!("Worker {} started", id);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let item = tokio::select! {
            item = ctx.frontier.dispatch() => item,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        };

        process_url(&ctx, item, &shutdown).await;
    }

    tracing::trace!("Worker {} stopped", id);
}

/// Handles one dispatched URL from fetch to checkpoint
pub(crate) async fn process_url(
    ctx: &CrawlContext,
    item: QueuedUrl,
    shutdown: &watch::Receiver<bool>,
) {
    let url = normalize(&item.url);
    if url.is_empty() {
        ctx.frontier.mark_visited(&item.url);
        return;
    }

    ctx.telemetry.record_attempt();

    // Another worker may have completed the same key already
    if ctx.frontier.is_visited(&url) {
        ctx.frontier.mark_visited(&url);
        return;
    }

    if let Some(domain) = domain_of(&url) {
        ctx.sitemaps.ensure(&domain, &ctx.frontier, shutdown).await;
    }

    let document = match ctx.fetch_with_retry(&url).await {
        Ok(document) => document,
        Err(e) => {
            ctx.record_failure(&url, e.kind());
            ctx.frontier.mark_visited(&url);
            return;
        }
    };

    let links = match ctx.extractor.extract(&document.body, &document.url) {
        Ok(links) => links,
        Err(e) => {
            tracing::debug!("Failed to extract links from {}: {}", url, e);
            ctx.record_failure(&url, ErrorKind::ParseError);
            ctx.frontier.mark_visited(&url);
            return;
        }
    };

    tracing::debug!("Fetched {} ({} links, depth {})", url, links.len(), item.depth);

    if ctx.governor.over_memory_limit() {
        tracing::debug!("Memory ceiling exceeded; dropping {} links from {}", links.len(), url);
    } else {
        let depth = item.depth.saturating_add(1);
        for link in &links {
            if *shutdown.borrow() {
                // Left in flight so the final checkpoint queues it for a re-fetch
                tracing::debug!("Shutdown before all links of {} were admitted", url);
                return;
            }
            ctx.frontier.admit(link, depth).await;
        }
    }

    // Stays in flight until its links are admitted so the crawl never looks idle in between
    ctx.frontier.mark_visited(&url);
    ctx.telemetry.record_success();

    let processed = ctx.processed.fetch_add(1, Ordering::SeqCst) + 1;
    if processed % ctx.checkpoint_every == 0 {
        if let Err(e) = ctx.save_checkpoint().await {
            tracing::warn!("Failed to save checkpoint: {}", e);
        }
    }
}
