//! Capped log of per-URL failures

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

/// Classification of a terminal per-URL failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Non-2xx response
    HttpStatus(u16),

    /// Content-Type was not HTML
    NonHtml,

    /// 2xx response with an empty body
    Empty,

    /// Request timed out after all retries
    Timeout,

    /// Connection could not be established after all retries
    Connection,

    /// Document was fetched but links could not be extracted
    ParseError,

    /// Any other transport failure
    Error,
}

impl ErrorKind {
    /// Returns the tag stored in the error log (e.g. `HTTP_404`)
    pub fn to_db_string(&self) -> String {
        match self {
            Self::HttpStatus(status) => format!("HTTP_{}", status),
            Self::NonHtml => "NONHTML".to_string(),
            Self::Empty => "EMPTY".to_string(),
            Self::Timeout => "TIMEOUT".to_string(),
            Self::Connection => "CONNECTION".to_string(),
            Self::ParseError => "PARSE_ERROR".to_string(),
            Self::Error => "ERROR".to_string(),
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "NONHTML" => Some(Self::NonHtml),
            "EMPTY" => Some(Self::Empty),
            "TIMEOUT" => Some(Self::Timeout),
            "CONNECTION" => Some(Self::Connection),
            "PARSE_ERROR" => Some(Self::ParseError),
            "ERROR" => Some(Self::Error),
            other => other
                .strip_prefix("HTTP_")
                .and_then(|code| code.parse().ok())
                .map(Self::HttpStatus),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_db_string())
    }
}

/// One failed URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ErrorKind,
}

impl ErrorRecord {
    /// Creates a record stamped with the current time
    pub fn now(url: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            url: url.into(),
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Append-only error log holding at most `cap` records
///
/// When full, the oldest record is evicted to make room.
#[derive(Debug)]
pub struct ErrorLog {
    cap: usize,
    records: Mutex<VecDeque<ErrorRecord>>,
}

impl ErrorLog {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            records: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, record: ErrorRecord) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if records.len() >= self.cap {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies out the retained records, oldest first
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}
