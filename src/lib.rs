//! # episode-dl
//!
//! Download orchestration for podcast and media episodes.
//!
//! Each episode is identified by its source URL and moves through a small
//! state machine: `None`, `Downloading`, `Paused`, `Downloaded`, `Failed`.
//! Transfers run in the background, stream into a staging file, and are
//! moved into a disk cache on completion. Paused transfers carry an opaque
//! resume token so they continue from the byte they stopped at, including
//! across restarts.
//!
//! ## Quick Start
//!
//! ```no_run
//! use episode_dl::{Config, DownloadState, Episode, EpisodeDownloader, Event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = EpisodeDownloader::new(Config::default()).await?;
//!
//!     // Subscribe to state changes
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(Event::StateChanged { id, state }) = events.recv().await {
//!             println!("{id}: {}", state.name());
//!         }
//!     });
//!
//!     let episode = Episode::parse("https://cdn.example.com/show/ep1.mp3")?;
//!     downloader.start(&episode).await?;
//!
//!     if let DownloadState::Downloaded { .. } = downloader.state(&episode.id).await {
//!         println!("playable at {:?}", downloader.local_url(&episode.id).await);
//!     }
//!
//!     downloader.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Disk cache layout for completed and staged files
pub mod cache;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Download orchestrator (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Progress throttling and reporting
pub mod progress;
/// Retry logic with exponential backoff
pub mod retry;
/// In-memory item states
pub mod store;
/// Byte transfers from media sources
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use cache::DiskCache;
pub use config::{
    CacheConfig, Config, PersistenceConfig, ProgressConfig, RetryConfig, TransferConfig,
};
pub use db::Database;
pub use downloader::EpisodeDownloader;
pub use error::{DatabaseError, Error, Result, TransferError};
pub use transfer::{ByteStream, HttpSource, MediaSource, RangeRequest, SourceResponse};
pub use types::{DownloadState, Episode, Event, ItemId, ResumeToken};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method,
/// which pauses running transfers so they can resume on the next start.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use episode_dl::{EpisodeDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let downloader = EpisodeDownloader::new(config).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: EpisodeDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
