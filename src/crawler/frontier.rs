//! Domain-partitioned frontier
//!
//! The frontier owns one FIFO sub-queue per registered domain together with
//! the de-duplication sets shared by every worker:
//! - `found`: every URL key ever admitted (queued, in flight or visited)
//! - `visited`: URL keys whose fetch attempt has completed
//!
//! Dispatch is round-robin with cooldown: domains are scanned in registration
//! order and the first one with queued work whose last dispatch is at least
//! the politeness delay ago hands out its head.
//!
//! Keys added to `visited` and `found` are also journaled until the next
//! incremental checkpoint takes them, so a save only writes what changed.

use crate::config::CrawlerConfig;
use crate::crawler::limiter::RateLimiter;
use crate::state::{DomainState, QueuedUrl};
use crate::storage::{Checkpoint, CheckpointDelta};
use crate::url::key_and_domain;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Outcome of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Enqueued on its domain's sub-queue
    Admitted,
    /// Already visited or found
    Known,
    /// Empty, unparseable or non-HTTP(S)
    Invalid,
    /// Deeper than the configured maximum depth
    DepthLimit,
    /// Would register a domain beyond the configured maximum
    DomainLimit,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Keys not yet written by an incremental checkpoint
#[derive(Debug, Default)]
struct Journal {
    visited: Vec<String>,
    found: Vec<String>,
}

#[derive(Debug, Default)]
struct FrontierInner {
    /// Domains in registration order
    order: Vec<String>,
    domains: HashMap<String, DomainState>,
    visited: HashSet<String>,
    found: HashSet<String>,
    /// Dispatched but not yet completed, with their depth
    in_flight: HashMap<String, u32>,
    unsaved: Journal,
}

impl FrontierInner {
    fn should_skip(&self, key: &str) -> bool {
        self.visited.contains(key) || self.found.contains(key)
    }

    fn enqueue(&mut self, key: String, domain: String, depth: u32) {
        if self.found.insert(key.clone()) {
            self.unsaved.found.push(key.clone());
        }
        if !self.domains.contains_key(&domain) {
            tracing::debug!("Registered domain {}", domain);
            self.order.push(domain.clone());
        }
        self.domains
            .entry(domain)
            .or_default()
            .push(QueuedUrl::new(key, depth));
    }

    fn over_domain_cap(&self, domain: &str, max_domains: Option<usize>) -> bool {
        match max_domains {
            Some(max) => !self.domains.contains_key(domain) && self.order.len() >= max,
            None => false,
        }
    }

    /// In-flight items (sorted) followed by every sub-queue in registration order
    fn pending(&self) -> Vec<QueuedUrl> {
        let mut in_flight: Vec<QueuedUrl> = self
            .in_flight
            .iter()
            .map(|(url, depth)| QueuedUrl::new(url.clone(), *depth))
            .collect();
        in_flight.sort_by(|a, b| a.url.cmp(&b.url));

        in_flight
            .into_iter()
            .chain(
                self.order
                    .iter()
                    .filter_map(|domain| self.domains.get(domain))
                    .flat_map(|state| state.queue.iter().cloned()),
            )
            .collect()
    }
}

/// Shared crawl frontier
#[derive(Debug)]
pub struct Frontier {
    inner: Mutex<FrontierInner>,
    limiter: RateLimiter,
    domain_delay: Duration,
    poll_interval: Duration,
    max_depth: Option<u32>,
    max_domains: Option<usize>,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `config` - Politeness delay, admission rate and optional depth/domain caps
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            inner: Mutex::new(FrontierInner::default()),
            limiter: RateLimiter::new(config.global_rate, config.rate_window()),
            domain_delay: config.domain_delay(),
            poll_interval: config.dispatch_poll(),
            max_depth: config.max_depth,
            max_domains: config.max_domains,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn prepare(&self, url: &str, depth: u32) -> Result<(String, String), Admission> {
        if self.max_depth.is_some_and(|max| depth > max) {
            return Err(Admission::DepthLimit);
        }
        key_and_domain(url).ok_or(Admission::Invalid)
    }

    /// Admits a trusted startup URL without going through the rate limiter
    ///
    /// Still skips URLs that are already visited or found.
    pub fn seed(&self, url: &str, depth: u32) -> Admission {
        let (key, domain) = match self.prepare(url, depth) {
            Ok(parts) => parts,
            Err(outcome) => return outcome,
        };

        let mut inner = self.lock();
        if inner.should_skip(&key) {
            return Admission::Known;
        }
        if inner.over_domain_cap(&domain, self.max_domains) {
            return Admission::DomainLimit;
        }
        inner.enqueue(key, domain, depth);
        Admission::Admitted
    }

    /// Admits a discovered URL
    ///
    /// Known URLs return immediately. Otherwise the caller waits on the
    /// global rate limiter, then the skip check is repeated because another
    /// worker may have admitted the same key meanwhile.
    pub async fn admit(&self, url: &str, depth: u32) -> Admission {
        let (key, domain) = match self.prepare(url, depth) {
            Ok(parts) => parts,
            Err(outcome) => return outcome,
        };

        {
            let inner = self.lock();
            if inner.should_skip(&key) {
                return Admission::Known;
            }
            if inner.over_domain_cap(&domain, self.max_domains) {
                return Admission::DomainLimit;
            }
        }

        self.limiter.admit().await;

        let mut inner = self.lock();
        if inner.should_skip(&key) {
            return Admission::Known;
        }
        if inner.over_domain_cap(&domain, self.max_domains) {
            return Admission::DomainLimit;
        }
        tracing::trace!("Admitted {} (depth {})", key, depth);
        inner.enqueue(key, domain, depth);
        Admission::Admitted
    }

    /// Pops the next eligible URL
    ///
    /// When nothing is eligible, returns the shortest remaining cooldown
    /// among domains with queued work, or `None` if every sub-queue is empty.
    fn poll_dispatch(&self) -> Result<QueuedUrl, Option<Duration>> {
        let now = Instant::now();
        let mut inner = self.lock();
        let FrontierInner {
            order,
            domains,
            in_flight,
            ..
        } = &mut *inner;

        let mut soonest: Option<Duration> = None;
        for domain in order.iter() {
            let Some(state) = domains.get_mut(domain) else {
                continue;
            };
            if state.is_eligible(self.domain_delay, now) {
                if let Some(item) = state.dispatch(now) {
                    in_flight.insert(item.url.clone(), item.depth);
                    return Ok(item);
                }
            } else if !state.is_empty() {
                if let Some(wait) = state.time_until_eligible(self.domain_delay, now) {
                    soonest = Some(soonest.map_or(wait, |s| s.min(wait)));
                }
            }
        }
        Err(soonest)
    }

    /// Pops the next eligible URL, if any domain is eligible right now
    pub fn try_dispatch(&self) -> Option<QueuedUrl> {
        self.poll_dispatch().ok()
    }

    /// Waits until some domain is eligible and pops its head
    ///
    /// Sleeps until the soonest cooldown ends, but never longer than
    /// `dispatch-poll-ms` so newly admitted domains are picked up. Suspends
    /// indefinitely on an empty frontier; callers race it against shutdown.
    pub async fn dispatch(&self) -> QueuedUrl {
        loop {
            match self.poll_dispatch() {
                Ok(item) => return item,
                Err(soonest) => {
                    let wait = soonest.map_or(self.poll_interval, |w| w.min(self.poll_interval));
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Records that the fetch attempt for `url` finished
    pub fn mark_visited(&self, url: &str) {
        let mut inner = self.lock();
        inner.in_flight.remove(url);
        if inner.found.insert(url.to_string()) {
            inner.unsaved.found.push(url.to_string());
        }
        if inner.visited.insert(url.to_string()) {
            inner.unsaved.visited.push(url.to_string());
        }
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.lock().visited.contains(url)
    }

    pub fn is_found(&self, url: &str) -> bool {
        self.lock().found.contains(url)
    }

    /// True iff every sub-queue is empty; in-flight fetches are not counted
    ///
    /// The supervisor's idle stop additionally requires `in_flight_len() == 0`,
    /// since a document still being processed may admit new links.
    pub fn is_idle(&self) -> bool {
        self.lock().domains.values().all(DomainState::is_empty)
    }

    /// Every queued item, domain by domain in registration order
    pub fn snapshot(&self) -> Vec<QueuedUrl> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|domain| inner.domains.get(domain))
            .flat_map(|state| state.queue.iter().cloned())
            .collect()
    }

    /// Captures the frontier for persistence
    ///
    /// In-flight items are listed ahead of the queued ones so that a crash
    /// mid-fetch does not lose them.
    pub fn checkpoint(&self, config_hash: Option<String>) -> Checkpoint {
        let inner = self.lock();
        Checkpoint {
            queued: inner.pending(),
            visited: inner.visited.iter().cloned().collect(),
            found: inner.found.iter().cloned().collect(),
            config_hash,
            saved_at: None,
        }
    }

    /// Captures the changes since the previous incremental checkpoint
    ///
    /// Takes the journaled `visited` and `found` keys; `queued` is complete
    /// and ordered like [`Frontier::checkpoint`]. If the delta cannot be
    /// persisted, hand it back with [`Frontier::unsave`].
    pub fn checkpoint_delta(&self, config_hash: Option<String>) -> CheckpointDelta {
        let mut inner = self.lock();
        let queued = inner.pending();
        let unsaved = std::mem::take(&mut inner.unsaved);
        CheckpointDelta {
            queued,
            visited: unsaved.visited,
            found: unsaved.found,
            config_hash,
        }
    }

    /// Returns the keys of an unpersisted delta to the journal
    pub fn unsave(&self, delta: CheckpointDelta) {
        let mut inner = self.lock();
        inner.unsaved.visited.extend(delta.visited);
        inner.unsaved.found.extend(delta.found);
    }

    /// Installs a saved checkpoint
    ///
    /// `visited` and `found` are installed first, then every queued item not
    /// already visited is re-enqueued. Depth and domain caps are not applied
    /// to restored items. Installed keys are treated as already persisted.
    ///
    /// # Returns
    ///
    /// The number of items re-enqueued
    pub fn restore(&self, checkpoint: Checkpoint) -> usize {
        let mut inner = self.lock();

        inner.visited.extend(checkpoint.visited);
        inner.found.extend(checkpoint.found);
        let visited: Vec<String> = inner.visited.iter().cloned().collect();
        inner.found.extend(visited);

        let mut queued_now = HashSet::new();
        let mut restored = 0;
        for item in checkpoint.queued {
            let Some((key, domain)) = key_and_domain(&item.url) else {
                continue;
            };
            if inner.visited.contains(&key) || !queued_now.insert(key.clone()) {
                continue;
            }
            inner.enqueue(key, domain, item.depth);
            restored += 1;
        }
        inner.unsaved = Journal::default();
        restored
    }

    pub fn queued_len(&self) -> usize {
        self.lock().domains.values().map(DomainState::len).sum()
    }

    pub fn visited_len(&self) -> usize {
        self.lock().visited.len()
    }

    pub fn found_len(&self) -> usize {
        self.lock().found.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    pub fn domain_count(&self) -> usize {
        self.lock().order.len()
    }
}
