//! Global admission rate limiter
//!
//! Keeps the instants of the last `rate` admissions. A caller is admitted
//! once fewer than `rate` admissions fall inside the trailing window, so no
//! window of that length, wherever it starts, ever holds more than `rate`.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Shared gate bounding the admission rate across all domains
#[derive(Debug)]
pub struct RateLimiter {
    rate: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Allows `rate` admissions per `window`
    pub fn new(rate: u32, window: Duration) -> Self {
        let rate = rate.max(1) as usize;
        Self {
            rate,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(rate)),
        }
    }

    /// Suspends until an admission is allowed, returning the admission instant
    ///
    /// Waiters queue on the async mutex in arrival order, so a waiting
    /// caller is admitted no later than one window after the callers ahead
    /// of it.
    pub async fn admit(&self) -> Instant {
        let mut admitted = self.admitted.lock().await;

        loop {
            let now = Instant::now();
            while let Some(&oldest) = admitted.front() {
                if now.duration_since(oldest) >= self.window {
                    admitted.pop_front();
                } else {
                    break;
                }
            }

            if admitted.len() < self.rate {
                admitted.push_back(now);
                return now;
            }

            if let Some(&oldest) = admitted.front() {
                let wait = self.window.saturating_sub(now.duration_since(oldest));
                tracing::trace!("Rate limit reached, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
    }
}
