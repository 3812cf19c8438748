//! Spawning transfers and applying their outcomes.

use crate::error::TransferError;
use crate::progress::ProgressReporter;
use crate::transfer::{StopSignal, TransferOutcome, TransferTask};
use crate::types::{DownloadState, Event, ItemId, ResumeData};
use std::sync::atomic::Ordering;
use tokio::sync::oneshot;
use url::Url;

use super::{ActiveTransfer, EpisodeDownloader};

impl EpisodeDownloader {
    /// Spawn a transfer for an item and register it as active
    ///
    /// The caller has already moved the item to `Downloading`. `floor` is the
    /// progress reported transfers never drop below (the pause point when
    /// resuming).
    pub(crate) async fn spawn_transfer(
        &self,
        id: &ItemId,
        source_url: Url,
        resume: Option<ResumeData>,
        floor: f64,
    ) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let generation = self
            .transfers
            .next_generation
            .fetch_add(1, Ordering::SeqCst);

        let task = TransferTask {
            id: id.clone(),
            source_url: source_url.clone(),
            staged_path: self.cache.staging_path_for(id),
            resume,
            source: self.source.clone(),
            retry: self.config.retry.clone(),
            check_disk_space: self.config.cache.check_disk_space,
        };
        let reporter = ProgressReporter::new(
            id.clone(),
            self.store.clone(),
            self.event_tx.clone(),
            &self.config.progress,
            floor,
        );

        // Hold the map lock across the spawn so the supervisor cannot try to
        // claim its entry before it exists
        let mut active = self.transfers.active.lock().await;

        let downloader = self.clone();
        let item = id.clone();
        let url = source_url.clone();
        let handle = tokio::spawn(async move {
            let mut stop = StopSignal::new(stop_rx);
            let outcome = task.run(&mut stop, reporter).await;
            downloader
                .settle(&item, &url, generation, outcome, stop)
                .await
        });

        active.insert(
            id.clone(),
            ActiveTransfer {
                generation,
                source_url,
                stop_tx,
                handle,
            },
        );
        tracing::debug!(item_id = %id, generation, "Transfer spawned");
    }

    /// Take the running transfer of an item out of the active map
    pub(crate) async fn take_transfer(&self, id: &ItemId) -> Option<ActiveTransfer> {
        self.transfers.active.lock().await.remove(id)
    }

    /// Remove this transfer's own entry from the active map
    ///
    /// Returns `false` if the entry is gone, meaning a pause or cancel took
    /// the transfer and owns its outcome.
    async fn claim_transfer(&self, id: &ItemId, generation: u64) -> bool {
        let mut active = self.transfers.active.lock().await;
        if active.get(id).is_some_and(|t| t.generation == generation) {
            active.remove(id);
            true
        } else {
            false
        }
    }

    /// Apply a finished transfer's outcome under the item's operation lock
    ///
    /// A pause or cancel that took the transfer holds that lock while it
    /// waits on this task, so in that case the outcome is handed back
    /// through the join handle for the waiter to apply.
    async fn settle(
        &self,
        id: &ItemId,
        source_url: &Url,
        generation: u64,
        outcome: TransferOutcome,
        mut stop: StopSignal,
    ) -> Option<TransferOutcome> {
        let guard = if stop.is_consumed() {
            None
        } else {
            tokio::select! {
                biased;
                _ = stop.requested() => None,
                guard = self.store.lock_item(id) => Some(guard),
            }
        };

        if !self.claim_transfer(id, generation).await {
            tracing::debug!(item_id = %id, generation, "Outcome handed to stop request");
            return Some(outcome);
        }

        let _guard = match guard {
            Some(guard) => guard,
            None => self.store.lock_item(id).await,
        };
        self.apply_outcome(id, source_url.as_str(), outcome).await;
        None
    }

    /// Turn a transfer outcome into the item's next state
    ///
    /// The caller holds the item's operation lock.
    pub(crate) async fn apply_outcome(
        &self,
        id: &ItemId,
        source_url: &str,
        outcome: TransferOutcome,
    ) {
        let next = match outcome {
            TransferOutcome::Completed { staged_path, bytes } => {
                match self.cache.commit(id, &staged_path).await {
                    Ok(local_path) => {
                        tracing::info!(
                            item_id = %id,
                            bytes,
                            path = %local_path.display(),
                            "Episode downloaded"
                        );
                        DownloadState::Downloaded { local_path }
                    }
                    Err(e) => {
                        tracing::error!(item_id = %id, error = %e, "Failed to commit staged file");
                        self.cache.discard_staged(id).await;
                        DownloadState::Failed {
                            error: TransferError::disk(e),
                        }
                    }
                }
            }
            TransferOutcome::Paused { token } => {
                let progress = self.store.get(id).await.progress().unwrap_or(0.0);
                DownloadState::Paused {
                    progress,
                    resume_token: token,
                }
            }
            TransferOutcome::Cancelled => DownloadState::None,
            TransferOutcome::Failed(error) => DownloadState::Failed { error },
        };

        self.apply_state(id, source_url, next).await;
    }

    /// Store, persist, and announce a new state
    ///
    /// `Downloaded` and `Paused` are written to the database, `None` and
    /// `Failed` remove the row, and `Downloading` leaves it untouched.
    /// Persistence failures are logged; the in-memory state stays
    /// authoritative.
    pub(crate) async fn apply_state(&self, id: &ItemId, source_url: &str, state: DownloadState) {
        self.store.set(id, state.clone()).await;

        let persisted = match &state {
            DownloadState::Downloaded { local_path } => {
                self.db.upsert_downloaded(id, source_url, local_path).await
            }
            DownloadState::Paused {
                progress,
                resume_token,
            } => {
                self.db
                    .upsert_paused(id, source_url, *progress, resume_token)
                    .await
            }
            DownloadState::None | DownloadState::Failed { .. } => {
                self.db.delete_episode(id).await.map(|_| ())
            }
            DownloadState::Downloading { .. } => Ok(()),
        };
        if let Err(e) = persisted {
            tracing::error!(
                item_id = %id,
                state = state.name(),
                error = %e,
                "Failed to persist episode state"
            );
        }

        match &state {
            DownloadState::Failed { error } => {
                tracing::warn!(item_id = %id, error = %error, "Episode download failed");
            }
            other => {
                tracing::debug!(item_id = %id, state = other.name(), "Episode state changed");
            }
        }

        self.emit_event(Event::StateChanged {
            id: id.clone(),
            state,
        });
    }
}
