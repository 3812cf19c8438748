//! Core downloader implementation split into focused submodules.
//!
//! The `EpisodeDownloader` struct and its methods are organized by domain:
//! - [`control`] - The item state machine (start/pause/resume/cancel/delete)
//! - [`transfers`] - Spawning transfers and applying their outcomes
//! - [`lifecycle`] - Startup restore and graceful shutdown

mod control;
mod lifecycle;
mod transfers;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use crate::cache::DiskCache;
use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::store::StateStore;
use crate::transfer::{HttpSource, MediaSource, StopRequest, TransferOutcome};
use crate::types::{DownloadState, Event, ItemId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};
use tokio::sync::oneshot;
use url::Url;

/// Handle to a running transfer
pub(crate) struct ActiveTransfer {
    /// Distinguishes this transfer from a later one for the same item
    pub(crate) generation: u64,
    /// Where the bytes come from
    pub(crate) source_url: Url,
    /// Stop request channel into the transfer loop
    pub(crate) stop_tx: oneshot::Sender<StopRequest>,
    /// Supervisor task: runs the transfer, then applies its outcome or
    /// returns it to whoever stopped the transfer
    pub(crate) handle: tokio::task::JoinHandle<Option<TransferOutcome>>,
}

/// Running transfers and admission control
#[derive(Clone)]
pub(crate) struct TransferState {
    /// Map of running transfers (for pause/cancel operations)
    pub(crate) active: Arc<tokio::sync::Mutex<HashMap<ItemId, ActiveTransfer>>>,
    /// Flag to indicate whether new starts are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Generation counter for [`ActiveTransfer`]
    pub(crate) next_generation: Arc<AtomicU64>,
}

/// Episode download orchestrator (cloneable - all fields are Arc-wrapped)
///
/// Every operation holds the item's operation lock for its whole
/// check-then-act sequence, so concurrent calls on the same item are
/// serialized while different items proceed independently.
#[derive(Clone)]
pub struct EpisodeDownloader {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    pub(crate) db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Authoritative in-memory states
    pub(crate) store: Arc<StateStore>,
    /// Identity → file mapping
    pub(crate) cache: DiskCache,
    /// Where episode bytes come from
    pub(crate) source: Arc<dyn MediaSource>,
    /// Running transfers
    pub(crate) transfers: TransferState,
}

impl EpisodeDownloader {
    /// Create a downloader that fetches episodes over HTTP
    ///
    /// See [`with_source`](EpisodeDownloader::with_source) for what
    /// construction does.
    pub async fn new(config: Config) -> Result<Self> {
        let source = Arc::new(HttpSource::new(&config.transfer)?);
        Self::with_source(config, source).await
    }

    /// Create a downloader over a custom media source
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Creates the cache and staging directories
    /// - Opens/creates the SQLite database and runs migrations
    /// - Restores downloaded and paused states from the previous session
    /// - Removes staging files no paused state refers to
    pub async fn with_source(config: Config, source: Arc<dyn MediaSource>) -> Result<Self> {
        config.validate()?;

        let cache = DiskCache::new(
            std::path::absolute(config.cache_dir())?,
            std::path::absolute(config.staging_dir())?,
        );
        cache.ensure_dirs().await?;

        let db = Database::new(&config.persistence.database_path).await?;
        let unclean_shutdown = db.was_unclean_shutdown().await?;
        // Mark that we're starting up (for unclean shutdown detection)
        db.set_clean_start().await?;

        let (event_tx, _rx) = tokio::sync::broadcast::channel(config.event_channel_capacity);

        let downloader = Self {
            db: Arc::new(db),
            event_tx,
            config: Arc::new(config),
            store: Arc::new(StateStore::new()),
            cache,
            source,
            transfers: TransferState {
                active: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
                accepting_new: Arc::new(AtomicBool::new(true)),
                next_generation: Arc::new(AtomicU64::new(1)),
            },
        };

        downloader.restore_states(unclean_shutdown).await?;

        tracing::info!(
            source = downloader.source.name(),
            cache_dir = %downloader.cache.cache_dir().display(),
            restored = downloader.store.len().await,
            "Episode downloader initialized"
        );

        Ok(downloader)
    }

    /// Subscribe to state change events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events
    /// independently. A subscriber that falls behind by more than
    /// `event_channel_capacity` events receives `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use episode_dl::{Config, EpisodeDownloader, Event};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let downloader = EpisodeDownloader::new(Config::default()).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             if let Event::StateChanged { id, state } = event {
    ///                 println!("{id}: {}", state.name());
    ///             }
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Current state of an item
    ///
    /// Items that were never started (or were cancelled or deleted) are
    /// [`DownloadState::None`].
    pub async fn state(&self, id: &ItemId) -> DownloadState {
        self.store.get(id).await
    }

    /// Every item with a state other than `None`
    pub async fn states(&self) -> Vec<(ItemId, DownloadState)> {
        self.store.snapshot().await
    }

    /// Location of the cached file, if the item is downloaded and the file exists
    pub async fn local_path(&self, id: &ItemId) -> Option<PathBuf> {
        match self.store.get(id).await {
            DownloadState::Downloaded { local_path } if is_file(&local_path).await => {
                Some(local_path)
            }
            _ => None,
        }
    }

    /// `file://` URL of the cached file for local-first playback
    ///
    /// Returns `None` unless the item is downloaded and its file is present;
    /// partial files are never exposed.
    pub async fn local_url(&self, id: &ItemId) -> Option<Url> {
        let path = self.local_path(id).await?;
        Url::from_file_path(&path).ok()
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

pub(crate) async fn is_file(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
