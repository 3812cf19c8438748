//! Error types for episode-dl
//!
//! Two layers of errors live here:
//! - [`Error`] is returned from the public API for infrastructure problems
//!   (configuration, database, cache directory I/O, shutdown).
//! - [`TransferError`] describes why a single transfer failed. It is stored
//!   inside [`DownloadState::Failed`](crate::types::DownloadState::Failed) and
//!   therefore has to be cheap to clone and serializable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for episode-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for episode-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "cache_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The episode URL could not be parsed or uses an unsupported scheme
    #[error("invalid episode URL: {0}")]
    InvalidUrl(String),

    /// Resume token bytes could not be decoded
    #[error("invalid resume token: {0}")]
    InvalidResumeToken(String),

    /// A transfer failed
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Reason a single transfer ended in the `failed` state
///
/// Two failed states compare equal regardless of the reason, so this type is
/// purely informational for callers that want to show why.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferError {
    /// Connection error, timeout, or a broken body stream
    #[error("network failure: {message}")]
    Network {
        /// Description of the underlying network error
        message: String,
    },

    /// The server answered with a non-success status
    #[error("server returned HTTP {status}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
    },

    /// Writing the staged file or committing it to the cache failed
    #[error("disk failure: {message}")]
    Disk {
        /// Description of the underlying I/O error
        message: String,
    },

    /// Not enough free space for the remaining bytes
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes still to be written
        required: u64,
        /// Number of bytes available on the staging filesystem
        available: u64,
    },

    /// A pause was requested but the source cannot continue a partial transfer
    #[error("source does not support resuming a partial transfer")]
    ResumeUnsupported,

    /// The transfer did not acknowledge a pause request in time
    #[error("transfer did not yield a resume token in time")]
    PauseTimeout,

    /// The body ended before the announced length was received
    #[error("transfer incomplete: expected {expected} bytes, received {received}")]
    Incomplete {
        /// Announced total length
        expected: u64,
        /// Bytes actually received
        received: u64,
    },
}

impl TransferError {
    /// Build a network failure from any displayable error
    pub fn network(err: impl std::fmt::Display) -> Self {
        TransferError::Network {
            message: err.to_string(),
        }
    }

    /// Build a disk failure from any displayable error
    pub fn disk(err: impl std::fmt::Display) -> Self {
        TransferError::Disk {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => TransferError::HttpStatus {
                status: status.as_u16(),
            },
            None => TransferError::network(err),
        }
    }
}
