//! Storage module for persisting crawl checkpoints
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Atomic replacement of the frontier checkpoint
//! - Incremental checkpoint saves between full replacements
//! - The capped, persisted error log

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteCheckpointStore;
pub use traits::{CheckpointStore, StorageError, StorageResult};

use crate::config::Config;
use crate::state::QueuedUrl;

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// A checkpoint store shared between workers and the coordinator
pub type SharedStore = Arc<Mutex<dyn CheckpointStore + Send>>;

/// Serializable snapshot of the frontier
///
/// `queued` is in dispatch order. Restoring it re-enqueues every entry that
/// is not already in `visited`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    pub queued: Vec<QueuedUrl>,
    pub visited: Vec<String>,
    pub found: Vec<String>,
    pub config_hash: Option<String>,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Frontier changes since the previous save
///
/// `visited` and `found` hold only keys added since then and are merged into
/// the stored sets; `queued` is complete and replaces the stored queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointDelta {
    pub queued: Vec<QueuedUrl>,
    pub visited: Vec<String>,
    pub found: Vec<String>,
    pub config_hash: Option<String>,
}

/// Opens the checkpoint database named in `config`
///
/// # Arguments
///
/// * `config` - Crawler configuration; `output.database-path` and
///   `output.error-log-cap` are used
///
/// # Returns
///
/// * `Ok(SqliteCheckpointStore)` - Successfully opened storage
/// * `Err(StorageError)` - Failed to open or initialize the database
pub fn open_storage(config: &Config) -> StorageResult<SqliteCheckpointStore> {
    Ok(SqliteCheckpointStore::new(&config.output.database_path)?
        .with_error_cap(config.output.error_log_cap))
}

/// Wraps a store for sharing across tasks
pub fn share<S: CheckpointStore + Send + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}
