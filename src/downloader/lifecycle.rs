//! Startup restore and shutdown coordination.

use crate::db::{EpisodeRow, episode_status};
use crate::error::Result;
use crate::types::{DownloadState, Event, ItemId, ResumeToken};
use std::path::PathBuf;
use std::sync::atomic::Ordering;

use super::{EpisodeDownloader, is_file};

impl EpisodeDownloader {
    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new starts
    /// 2. Pauses every running transfer (each bounded by `transfer.pause_timeout`)
    ///    so it is persisted as `Paused` and resumable after a restart
    /// 3. Marks the clean shutdown in the database
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Transfers whose source cannot resume end up `Failed`.
    ///
    /// # Errors
    ///
    /// Failures in individual steps are logged and the sequence continues;
    /// the method currently always returns `Ok`.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.transfers.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new downloads");

        let running: Vec<ItemId> = self.transfers.active.lock().await.keys().cloned().collect();
        if !running.is_empty() {
            tracing::info!(count = running.len(), "Pausing running transfers");
        }

        let results = futures::future::join_all(running.iter().map(|id| self.pause(id))).await;
        for (id, result) in running.iter().zip(results) {
            match result {
                Ok(state) => {
                    tracing::debug!(item_id = %id, state = state.name(), "Transfer stopped for shutdown");
                }
                Err(e) => {
                    tracing::warn!(item_id = %id, error = %e, "Failed to pause transfer during shutdown");
                }
            }
        }

        if let Err(e) = self.db.set_clean_shutdown().await {
            tracing::error!(error = %e, "Failed to mark clean shutdown in database");
        } else {
            tracing::info!("Marked clean shutdown in database");
        }

        self.emit_event(Event::Shutdown);

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Rebuild in-memory states from the database
    ///
    /// Downloaded rows whose file vanished and paused rows whose token cannot
    /// be decoded are dropped. Afterwards, staging files that no paused state
    /// refers to are swept.
    pub(crate) async fn restore_states(&self, unclean_shutdown: bool) -> Result<()> {
        if unclean_shutdown {
            tracing::warn!(
                "Previous session did not shut down cleanly, interrupted transfers were not paused"
            );
        }

        let rows = self.db.load_episodes().await?;
        let mut paused = Vec::new();
        let mut dropped = 0usize;

        for row in rows {
            let id = ItemId::from_stored(row.item_id.clone());
            match restorable_state(&row).await {
                Some(state) => {
                    if matches!(state, DownloadState::Paused { .. }) {
                        paused.push(id.clone());
                    }
                    self.store.set(&id, state).await;
                }
                None => {
                    dropped += 1;
                    if let Err(e) = self.db.delete_episode(&id).await {
                        tracing::warn!(item_id = %id, error = %e, "Failed to drop stale episode row");
                    }
                }
            }
        }

        if dropped > 0 {
            tracing::info!(dropped, "Dropped stale episode states");
        }
        tracing::debug!(paused = paused.len(), "Restored episode states");

        if let Err(e) = self.cache.sweep_staging(&paused).await {
            tracing::warn!(error = %e, "Failed to sweep staging directory");
        }

        Ok(())
    }
}

/// The state a stored row restores to, or `None` if it is stale
async fn restorable_state(row: &EpisodeRow) -> Option<DownloadState> {
    match row.status {
        episode_status::DOWNLOADED => {
            let local_path = PathBuf::from(row.local_path.as_deref()?);
            if is_file(&local_path).await {
                Some(DownloadState::Downloaded { local_path })
            } else {
                tracing::info!(
                    item_id = %row.item_id,
                    path = %local_path.display(),
                    "Cached file vanished, forgetting download"
                );
                None
            }
        }
        episode_status::PAUSED => {
            let token = ResumeToken::from_bytes(row.resume_token.clone()?);
            match token.decode() {
                Ok(_) => Some(DownloadState::Paused {
                    progress: row.progress.clamp(0.0, 1.0),
                    resume_token: token,
                }),
                Err(e) => {
                    tracing::warn!(item_id = %row.item_id, error = %e, "Dropping unreadable resume token");
                    None
                }
            }
        }
        other => {
            tracing::warn!(item_id = %row.item_id, status = other, "Unknown stored episode status");
            None
        }
    }
}
