use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A URL waiting in a domain sub-queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedUrl {
    /// Normalized URL key
    pub url: String,

    /// Distance from the seed that led here
    pub depth: u32,
}

impl QueuedUrl {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
        }
    }
}

/// Tracks the state of a domain during crawling
///
/// Each registered domain owns a FIFO sub-queue and the time of its last
/// dispatch. Domains are created lazily on first admission and never removed.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// URLs admitted for this domain, in admission order
    pub queue: VecDeque<QueuedUrl>,

    /// When a URL of this domain was last handed to a worker
    pub last_dispatch: Option<Instant>,
}

impl DomainState {
    /// Creates a new DomainState with an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if this domain may dispatch at `now`
    ///
    /// A domain is eligible when its queue is non-empty and either it has
    /// never dispatched or at least `delay` has passed since it last did.
    pub fn is_eligible(&self, delay: Duration, now: Instant) -> bool {
        if self.queue.is_empty() {
            return false;
        }

        match self.last_dispatch {
            Some(last) => now.saturating_duration_since(last) >= delay,
            None => true,
        }
    }

    /// Pops the head of the queue and records the dispatch
    pub fn dispatch(&mut self, now: Instant) -> Option<QueuedUrl> {
        let item = self.queue.pop_front()?;
        self.last_dispatch = Some(now);
        Some(item)
    }

    /// Calculates the time until the domain leaves its cooldown
    ///
    /// Returns `None` when the domain is not cooling down.
    pub fn time_until_eligible(&self, delay: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_dispatch?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < delay {
            Some(delay - elapsed)
        } else {
            None
        }
    }

    pub fn push(&mut self, item: QueuedUrl) {
        self.queue.push_back(item);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }
}
