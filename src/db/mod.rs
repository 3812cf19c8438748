//! Database layer for episode-dl
//!
//! Handles SQLite persistence for downloaded and paused episodes so their
//! states survive a restart.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`episodes`] - Persisted episode states
//! - [`state`] - Runtime state (shutdown tracking)

use sqlx::{FromRow, sqlite::SqlitePool};

mod episodes;
mod migrations;
mod state;

/// Persisted episode record
///
/// Only `Downloaded` and `Paused` states are stored; every other state is
/// represented by the absence of a row.
#[derive(Debug, Clone, FromRow)]
pub struct EpisodeRow {
    /// Canonical identity string
    pub item_id: String,
    /// Source URL the bytes came from
    pub source_url: String,
    /// Episode status (see [`episode_status`])
    pub status: i32,
    /// Progress fraction at the pause point
    pub progress: f64,
    /// Location of the cached file (downloaded rows)
    pub local_path: Option<String>,
    /// Opaque resume token bytes (paused rows)
    pub resume_token: Option<Vec<u8>>,
    /// Unix timestamp of the last write
    pub updated_at: i64,
}

/// Episode status constants
pub mod episode_status {
    /// Transfer paused with a resume token
    pub const PAUSED: i32 = 1;
    /// File present in the cache
    pub const DOWNLOADED: i32 = 2;
}

/// Database handle for episode-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
