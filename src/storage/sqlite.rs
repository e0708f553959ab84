//! SQLite checkpoint store
//!
//! Each save runs in one transaction, so a crash mid-write rolls back to the
//! previous checkpoint instead of leaving a partial one behind. Full saves
//! rewrite every table; delta saves only append to `visited` and `found`.

use crate::state::{ErrorKind, ErrorRecord, QueuedUrl};
use crate::storage::schema::{get_schema_version, initialize_schema};
use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use crate::storage::{Checkpoint, CheckpointDelta};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

/// Default number of error records kept in the database
const DEFAULT_ERROR_CAP: usize = 10_000;

/// SQLite checkpoint backend
pub struct SqliteCheckpointStore {
    conn: Connection,
    error_cap: usize,
}

impl SqliteCheckpointStore {
    /// Opens or creates the checkpoint database at `path`
    ///
    /// Missing parent directories are created.
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn,
            error_cap: DEFAULT_ERROR_CAP,
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            error_cap: DEFAULT_ERROR_CAP,
        })
    }

    /// Sets how many error records are retained
    pub fn with_error_cap(mut self, cap: usize) -> Self {
        self.error_cap = cap.max(1);
        self
    }

    fn load_queued(&self) -> StorageResult<Vec<QueuedUrl>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url, depth FROM queued ORDER BY position ASC")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut queued = Vec::new();
        for row in rows {
            let (url, depth) = row?;
            if url.is_empty() {
                return Err(StorageError::Decode("empty URL in queued".to_string()));
            }
            let depth = u32::try_from(depth).map_err(|_| {
                StorageError::Decode(format!("invalid depth {} for {}", depth, url))
            })?;
            queued.push(QueuedUrl { url, depth });
        }
        Ok(queued)
    }

    fn load_set(&self, table: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!("SELECT url FROM {}", table))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut urls = Vec::new();
        for row in rows {
            let url = row?;
            if url.is_empty() {
                return Err(StorageError::Decode(format!("empty URL in {}", table)));
            }
            urls.push(url);
        }
        Ok(urls)
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn load(&self) -> StorageResult<Option<Checkpoint>> {
        let meta = self
            .conn
            .query_row(
                "SELECT schema_version, config_hash, saved_at FROM checkpoint_meta WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((version, config_hash, saved_at)) = meta else {
            return Ok(None);
        };

        if version != i64::from(get_schema_version()) {
            return Err(StorageError::Decode(format!(
                "schema version {} (expected {})",
                version,
                get_schema_version()
            )));
        }

        let saved_at = DateTime::parse_from_rfc3339(&saved_at)
            .map_err(|e| StorageError::Decode(format!("invalid saved_at: {}", e)))?
            .with_timezone(&Utc);

        let queued = self.load_queued()?;
        let visited = self.load_set("visited")?;
        let mut found = self.load_set("found")?;

        // visited must be a subset of found
        let found_set: HashSet<&str> = found.iter().map(String::as_str).collect();
        let missing: Vec<String> = visited
            .iter()
            .filter(|url| !found_set.contains(url.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                "Checkpoint had {} visited URLs missing from found; repairing",
                missing.len()
            );
            found.extend(missing);
        }

        Ok(Some(Checkpoint {
            queued,
            visited,
            found,
            config_hash,
            saved_at: Some(saved_at),
        }))
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM visited", [])?;
        tx.execute("DELETE FROM found", [])?;
        write_keys(&tx, &checkpoint.visited, &checkpoint.found)?;
        write_queue_and_meta(&tx, &checkpoint.queued, checkpoint.config_hash.as_deref())?;

        tx.commit()?;
        Ok(())
    }

    fn save_delta(&mut self, delta: &CheckpointDelta) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        write_keys(&tx, &delta.visited, &delta.found)?;
        write_queue_and_meta(&tx, &delta.queued, delta.config_hash.as_deref())?;

        tx.commit()?;
        Ok(())
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            BEGIN;
            DELETE FROM checkpoint_meta;
            DELETE FROM queued;
            DELETE FROM visited;
            DELETE FROM found;
            DELETE FROM errors;
            COMMIT;
        ",
        )?;
        Ok(())
    }

    fn append_error(&mut self, record: &ErrorRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO errors (url, timestamp, kind) VALUES (?1, ?2, ?3)",
            params![
                record.url,
                record.timestamp.to_rfc3339(),
                record.kind.to_db_string()
            ],
        )?;

        // Drop everything older than the newest `error_cap` rows
        self.conn.execute(
            "DELETE FROM errors WHERE id <= (SELECT id FROM errors ORDER BY id DESC LIMIT 1 OFFSET ?1)",
            params![self.error_cap as i64],
        )?;
        Ok(())
    }

    fn load_errors(&self) -> StorageResult<Vec<ErrorRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url, timestamp, kind FROM errors ORDER BY id ASC")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (url, timestamp, kind) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| StorageError::Decode(format!("invalid error timestamp: {}", e)))?
                .with_timezone(&Utc);
            let kind = ErrorKind::from_db_string(&kind)
                .ok_or_else(|| StorageError::Decode(format!("unknown error kind {}", kind)))?;
            records.push(ErrorRecord {
                url,
                timestamp,
                kind,
            });
        }
        Ok(records)
    }
}

/// Adds keys to the `visited` and `found` sets; existing keys are ignored
fn write_keys(conn: &Connection, visited: &[String], found: &[String]) -> StorageResult<()> {
    let mut insert_visited = conn.prepare("INSERT OR IGNORE INTO visited (url) VALUES (?1)")?;
    for url in visited {
        insert_visited.execute(params![url])?;
    }

    let mut insert_found = conn.prepare("INSERT OR IGNORE INTO found (url) VALUES (?1)")?;
    for url in found {
        insert_found.execute(params![url])?;
    }
    Ok(())
}

/// Replaces the stored queue and stamps the checkpoint metadata
fn write_queue_and_meta(
    conn: &Connection,
    queued: &[QueuedUrl],
    config_hash: Option<&str>,
) -> StorageResult<()> {
    conn.execute("DELETE FROM queued", [])?;
    let mut insert_queued =
        conn.prepare("INSERT INTO queued (position, url, depth) VALUES (?1, ?2, ?3)")?;
    for (position, item) in queued.iter().enumerate() {
        insert_queued.execute(params![position as i64, item.url, item.depth])?;
    }

    conn.execute(
        "INSERT OR REPLACE INTO checkpoint_meta (id, schema_version, config_hash, saved_at)
         VALUES (1, ?1, ?2, ?3)",
        params![get_schema_version(), config_hash, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}
