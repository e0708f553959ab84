//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the checkpoint database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Single row describing the current checkpoint
CREATE TABLE IF NOT EXISTS checkpoint_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    config_hash TEXT,
    saved_at TEXT NOT NULL
);

-- Queued but undispatched URLs, in dispatch order
CREATE TABLE IF NOT EXISTS queued (
    position INTEGER PRIMARY KEY,
    url TEXT NOT NULL,
    depth INTEGER NOT NULL
);

-- URLs whose fetch attempt has completed
CREATE TABLE IF NOT EXISTS visited (
    url TEXT PRIMARY KEY
) WITHOUT ROWID;

-- URLs ever admitted to the frontier
CREATE TABLE IF NOT EXISTS found (
    url TEXT PRIMARY KEY
) WITHOUT ROWID;

-- Capped log of per-URL failures
CREATE TABLE IF NOT EXISTS errors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    kind TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Gets the current schema version
///
/// A checkpoint written under a different version is not decoded.
pub fn get_schema_version() -> u32 {
    1
}
