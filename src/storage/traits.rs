//! Checkpoint store trait and error types

use crate::state::ErrorRecord;
use crate::storage::{Checkpoint, CheckpointDelta};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Checkpoint does not match the expected shape: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable home of the crawl's frontier and de-duplication state
///
/// The crawl engine loads once at startup, saves a delta after processed
/// documents and a full checkpoint once more at shutdown. A full save
/// replaces the previous checkpoint entirely; an interrupted save of either
/// kind must leave the previous checkpoint intact.
pub trait CheckpointStore {
    /// Loads the last saved checkpoint
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Checkpoint))` - A checkpoint exists and decoded cleanly
    /// * `Ok(None)` - Nothing has been saved yet
    /// * `Err(StorageError::Decode)` - Stored rows do not form a valid checkpoint
    fn load(&self) -> StorageResult<Option<Checkpoint>>;

    /// Replaces the stored checkpoint with `checkpoint`
    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()>;

    /// Merges new `visited`/`found` keys and replaces the queue and metadata
    ///
    /// Cost is proportional to the delta and the queue, not to the sets.
    fn save_delta(&mut self, delta: &CheckpointDelta) -> StorageResult<()>;

    /// Removes the checkpoint and the error log
    fn clear(&mut self) -> StorageResult<()>;

    /// Appends one record to the persisted error log, trimming it to its cap
    fn append_error(&mut self, record: &ErrorRecord) -> StorageResult<()>;

    /// Loads the persisted error log, oldest first
    fn load_errors(&self) -> StorageResult<Vec<ErrorRecord>>;
}
