//! Crawl telemetry
//!
//! Workers record attempt, success and error events on a shared
//! [`Telemetry`] handle. The reporter task turns them into totals and
//! sliding-window rates and logs one line per report interval. Nothing
//! here feeds back into scheduling.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;

const SHORT_WINDOW: Duration = Duration::from_secs(10);
const LONG_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct EventLog {
    times: VecDeque<Instant>,
    total: u64,
}

impl EventLog {
    fn record(&mut self, at: Instant) {
        self.times.push_back(at);
        self.total += 1;
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.times.front() {
            if now.saturating_duration_since(oldest) > LONG_WINDOW {
                self.times.pop_front();
            } else {
                break;
            }
        }
    }

    fn count_within(&self, now: Instant, window: Duration) -> u64 {
        self.times
            .iter()
            .rev()
            .take_while(|&&t| now.saturating_duration_since(t) <= window)
            .count() as u64
    }
}

#[derive(Debug, Default)]
struct Events {
    attempts: EventLog,
    successes: EventLog,
    errors: EventLog,
}

/// Point-in-time view of crawl progress
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub elapsed: Duration,
    pub attempts: u64,
    pub successes: u64,
    pub errors: u64,
    /// Errors per attempt since start
    pub error_rate: f64,
    /// Errors per attempt over the last 10 seconds
    pub error_rate_10s: f64,
    /// Errors per attempt over the last 30 seconds
    pub error_rate_30s: f64,
    /// Successes per attempt over the last 30 seconds
    pub success_rate_30s: f64,
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:6}s] att={} succ={} err={} rate.err={:.3} 10s.err={:.3} 30s.err={:.3} 30s.succ={:.3}",
            self.elapsed.as_secs(),
            self.attempts,
            self.successes,
            self.errors,
            self.error_rate,
            self.error_rate_10s,
            self.error_rate_30s,
            self.success_rate_30s
        )
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Event counters owned by one crawl
#[derive(Debug)]
pub struct Telemetry {
    started: Instant,
    events: Mutex<Events>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            events: Mutex::new(Events::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Events> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_attempt(&self) {
        self.lock().attempts.record(Instant::now());
    }

    pub fn record_success(&self) {
        self.lock().successes.record(Instant::now());
    }

    pub fn record_error(&self) {
        self.lock().errors.record(Instant::now());
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.snapshot_at(Instant::now())
    }

    fn snapshot_at(&self, now: Instant) -> TelemetrySnapshot {
        let mut events = self.lock();
        events.attempts.prune(now);
        events.successes.prune(now);
        events.errors.prune(now);

        let attempts_10 = events.attempts.count_within(now, SHORT_WINDOW);
        let attempts_30 = events.attempts.count_within(now, LONG_WINDOW);

        TelemetrySnapshot {
            elapsed: now.saturating_duration_since(self.started),
            attempts: events.attempts.total,
            successes: events.successes.total,
            errors: events.errors.total,
            error_rate: ratio(events.errors.total, events.attempts.total),
            error_rate_10s: ratio(events.errors.count_within(now, SHORT_WINDOW), attempts_10),
            error_rate_30s: ratio(events.errors.count_within(now, LONG_WINDOW), attempts_30),
            success_rate_30s: ratio(events.successes.count_within(now, LONG_WINDOW), attempts_30),
        }
    }
}

/// Logs a telemetry line every `interval` until `shutdown` turns true
pub async fn run_reporter(
    telemetry: Arc<Telemetry>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::info!("{}", telemetry.snapshot());
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
