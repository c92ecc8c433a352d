//! Error types for mftindex
//!
//! One error enum covers the device layer, record parsing, path resolution
//! and the SQLite store.

use thiserror::Error;

/// Main error type for indexing operations
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to open volume '{drive}:': OS error {code}")]
    DeviceOpen { drive: char, code: i32 },

    #[error("Failed to query NTFS volume data for '{drive}:': {reason}")]
    DeviceQuery { drive: char, reason: String },

    #[error("Failed to read MFT record {record} on '{drive}:': {reason}")]
    FatalRead {
        drive: char,
        record: u64,
        reason: String,
    },

    #[error("Invalid MFT record at index {0}: {1}")]
    InvalidMftRecord(u64, String),

    #[error("Invalid attribute at offset {0}: {1}")]
    InvalidAttribute(usize, String),

    #[error("Parent chain of record {frn} exceeds {limit} links (cycle or corrupt metadata)")]
    IndexCorruption { frn: u64, limit: usize },

    #[error("Failed to prepare insert statement for shard {shard}: {source}")]
    StatementPrepare {
        shard: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Priority map is missing the mandatory key '{0}'")]
    MissingPriorityKey(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Windows API error: {0}")]
    WindowsError(String),

    #[error("Buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    #[error("Volume worker panicked: {0}")]
    Panicked(String),
}

/// Result type alias for indexing operations
pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// Create a Windows API error from a raw error code
    pub fn from_win32(code: u32, context: &str) -> Self {
        IndexError::WindowsError(format!("{}: Win32 error code {}", context, code))
    }

    /// Check if this error is local to one record (the walk can continue)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IndexError::InvalidMftRecord(_, _)
                | IndexError::InvalidAttribute(_, _)
                | IndexError::IndexCorruption { .. }
        )
    }
}
