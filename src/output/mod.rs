//! Output module for crawl progress and statistics
//!
//! This module handles:
//! - Recording attempt/success/error events and periodic rate reports
//! - Summarizing a saved checkpoint for the `--stats` mode

pub mod stats;
mod telemetry;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use telemetry::{run_reporter, Telemetry, TelemetrySnapshot};
