//! Item state machine: start, pause, resume, cancel and delete.
//!
//! Every operation returns the item's state after the operation. Calls that
//! do not apply to the current state are no-ops and return it unchanged.

use crate::error::{Error, Result, TransferError};
use crate::transfer::{StopRequest, TransferOutcome};
use crate::types::{DownloadState, Episode, ItemId};
use std::sync::atomic::Ordering;
use std::time::Duration;
use url::Url;

use super::{ActiveTransfer, EpisodeDownloader, is_file};

impl EpisodeDownloader {
    /// Start downloading an episode
    ///
    /// From `None` or `Failed`, and from `Downloaded` when the cached file has
    /// gone missing, a fresh transfer begins and the item becomes
    /// `Downloading(0)`. From `Downloading` or `Paused` this is a no-op. From
    /// `Downloaded` with the file present it is a no-op that touches neither
    /// the network nor the disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use episode_dl::*;
    /// # async fn example(downloader: EpisodeDownloader) -> Result<()> {
    /// let episode = Episode::parse("https://cdn.example.com/show/ep1.mp3")?;
    /// let state = downloader.start(&episode).await?;
    /// assert!(matches!(state, DownloadState::Downloading { .. }));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn start(&self, episode: &Episode) -> Result<DownloadState> {
        self.ensure_accepting()?;
        let id = &episode.id;
        let _guard = self.store.lock_item(id).await;
        self.ensure_accepting()?;

        match self.store.get(id).await {
            current @ (DownloadState::Downloading { .. } | DownloadState::Paused { .. }) => {
                return Ok(current);
            }
            DownloadState::Downloaded { local_path } => {
                if is_file(&local_path).await {
                    return Ok(DownloadState::Downloaded { local_path });
                }
                tracing::info!(
                    item_id = %id,
                    path = %local_path.display(),
                    "Cached file is missing, downloading again"
                );
            }
            DownloadState::None | DownloadState::Failed { .. } => {}
        }

        tracing::info!(
            item_id = %id,
            title = episode.title.as_deref().unwrap_or(""),
            "Starting episode download"
        );

        // A fresh start never continues from earlier bytes
        self.cache.discard_staged(id).await;
        let state = DownloadState::Downloading { progress: 0.0 };
        self.apply_state(id, episode.source_url.as_str(), state.clone())
            .await;
        if let Err(e) = self.db.delete_episode(id).await {
            tracing::warn!(item_id = %id, error = %e, "Failed to clear stored episode state");
        }

        self.spawn_transfer(id, episode.source_url.clone(), None, 0.0)
            .await;
        Ok(state)
    }

    /// Pause a running download
    ///
    /// Only applies to `Downloading`. The transfer is asked to stop and hand
    /// back a resume token; the call waits for its answer for at most
    /// `transfer.pause_timeout`. The result is `Paused` on success, `Failed`
    /// when the source cannot resume, and `Downloaded` if the transfer
    /// finished before the request landed. A transfer that does not answer in
    /// time is aborted and the item becomes `Failed`.
    pub async fn pause(&self, id: &ItemId) -> Result<DownloadState> {
        let _guard = self.store.lock_item(id).await;

        let current = self.store.get(id).await;
        if !matches!(current, DownloadState::Downloading { .. }) {
            return Ok(current);
        }
        let Some(transfer) = self.take_transfer(id).await else {
            return Ok(self.store.get(id).await);
        };
        let source_url = transfer.source_url.clone();

        tracing::debug!(item_id = %id, "Requesting transfer pause");
        let timeout = self.config.transfer.pause_timeout;
        match stop_and_wait(id, transfer, StopRequest::Pause, timeout).await {
            Some(outcome) => {
                self.apply_outcome(id, source_url.as_str(), outcome).await;
            }
            None => {
                tracing::warn!(
                    item_id = %id,
                    timeout_secs = timeout.as_secs_f64(),
                    "Transfer did not pause in time, aborted"
                );
                self.cache.discard_staged(id).await;
                self.apply_state(
                    id,
                    source_url.as_str(),
                    DownloadState::Failed {
                        error: TransferError::PauseTimeout,
                    },
                )
                .await;
            }
        }

        Ok(self.store.get(id).await)
    }

    /// Resume a paused download
    ///
    /// Only applies to `Paused`. The transfer continues from the stored
    /// resume token and the item becomes `Downloading` at the paused progress;
    /// reported progress never drops below that point. A token that cannot be
    /// decoded moves the item to `Failed`.
    pub async fn resume(&self, id: &ItemId) -> Result<DownloadState> {
        let _guard = self.store.lock_item(id).await;

        let (progress, resume_token) = match self.store.get(id).await {
            DownloadState::Paused {
                progress,
                resume_token,
            } => (progress, resume_token),
            current => return Ok(current),
        };

        let decoded = resume_token.decode().and_then(|data| {
            let url = Url::parse(&data.source_url)
                .map_err(|e| Error::InvalidResumeToken(format!("bad source URL: {e}")))?;
            Ok((data, url))
        });
        let (data, source_url) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(item_id = %id, error = %e, "Resume token is unusable");
                self.cache.discard_staged(id).await;
                let state = DownloadState::Failed {
                    error: TransferError::ResumeUnsupported,
                };
                self.apply_state(id, id.as_str(), state.clone()).await;
                return Ok(state);
            }
        };

        tracing::info!(item_id = %id, progress, offset = data.offset, "Resuming episode download");

        // The paused row stays until the transfer ends so a crash mid-resume
        // restores the pause point
        let state = DownloadState::Downloading { progress };
        self.apply_state(id, source_url.as_str(), state.clone())
            .await;
        self.spawn_transfer(id, source_url, Some(data), progress)
            .await;
        Ok(state)
    }

    /// Cancel a download, discarding partial bytes and any resume token
    ///
    /// Applies to `Downloading` and `Paused`; the item becomes `None`. If the
    /// transfer completed before the cancel landed, the item stays
    /// `Downloaded`. A transfer that does not stop within
    /// `transfer.cancel_timeout` is aborted.
    pub async fn cancel(&self, id: &ItemId) -> Result<DownloadState> {
        let _guard = self.store.lock_item(id).await;

        match self.store.get(id).await {
            DownloadState::Downloading { .. } => {
                if let Some(transfer) = self.take_transfer(id).await {
                    let source_url = transfer.source_url.clone();
                    let timeout = self.config.transfer.cancel_timeout;
                    match stop_and_wait(id, transfer, StopRequest::Cancel, timeout).await {
                        Some(outcome) => {
                            self.apply_outcome(id, source_url.as_str(), outcome).await;
                        }
                        None => {
                            tracing::warn!(
                                item_id = %id,
                                timeout_secs = timeout.as_secs_f64(),
                                "Transfer did not stop in time, aborted"
                            );
                        }
                    }
                }
            }
            DownloadState::Paused { .. } => {}
            current => return Ok(current),
        }

        match self.store.get(id).await {
            downloaded @ DownloadState::Downloaded { .. } => {
                tracing::debug!(item_id = %id, "Transfer completed before cancel landed");
                Ok(downloaded)
            }
            DownloadState::None => Ok(DownloadState::None),
            _ => {
                self.cache.discard_staged(id).await;
                self.apply_state(id, id.as_str(), DownloadState::None).await;
                tracing::info!(item_id = %id, "Episode download cancelled");
                Ok(DownloadState::None)
            }
        }
    }

    /// Delete a downloaded episode
    ///
    /// Applies to the terminal states `Downloaded`, `Failed`, and `None`: the
    /// cached file is removed if present and the item becomes `None`. Running
    /// or paused items are left alone; use [`cancel`](Self::cancel) for those.
    ///
    /// # Errors
    ///
    /// Returns an error if the cached file exists but cannot be removed.
    pub async fn delete(&self, id: &ItemId) -> Result<DownloadState> {
        let _guard = self.store.lock_item(id).await;

        let current = self.store.get(id).await;
        if current.is_active() {
            return Ok(current);
        }

        let removed = self.cache.delete(id).await?;
        if current.is_none() && !removed {
            return Ok(DownloadState::None);
        }

        self.apply_state(id, id.as_str(), DownloadState::None).await;
        tracing::info!(item_id = %id, removed_file = removed, "Episode deleted");
        Ok(DownloadState::None)
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.transfers.accepting_new.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::ShuttingDown)
        }
    }
}

/// Send a stop request and wait for the transfer's outcome
///
/// The transfer was taken out of the active map, so its supervisor hands the
/// outcome back instead of applying it; the caller applies it under the
/// item's operation lock. Returns `None` if the transfer had to be aborted
/// after `timeout` or its supervisor panicked.
async fn stop_and_wait(
    id: &ItemId,
    transfer: ActiveTransfer,
    request: StopRequest,
    timeout: Duration,
) -> Option<TransferOutcome> {
    let ActiveTransfer {
        stop_tx,
        mut handle,
        ..
    } = transfer;

    if stop_tx.send(request).is_err() {
        tracing::debug!(item_id = %id, ?request, "Transfer already finished");
    }

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            tracing::error!(item_id = %id, error = %e, "Transfer supervisor panicked");
            None
        }
        Err(_) => {
            handle.abort();
            let _ = handle.await;
            None
        }
    }
}
