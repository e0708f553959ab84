//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `DomainState`: one domain's FIFO sub-queue and its last dispatch time
//! - `QueuedUrl`: a normalized URL key with its seed distance
//! - `ErrorLog`: capped, append-only record of per-URL failures

mod domain_state;
mod error_log;

// Re-export main types
pub use domain_state::{DomainState, QueuedUrl};
pub use error_log::{ErrorKind, ErrorLog, ErrorRecord};
