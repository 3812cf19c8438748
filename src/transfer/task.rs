//! The transfer loop
//!
//! A [`TransferTask`] owns one staging file. It opens the media body, appends
//! chunks while watching for a stop request, and ends with a
//! [`TransferOutcome`]. Stop requests are checked before every chunk, so a
//! pause or cancel is acknowledged as soon as the in-flight write finishes.

use super::source::{MediaSource, RangeRequest, SourceResponse};
use super::{StopRequest, StopSignal, TransferOutcome};
use crate::config::RetryConfig;
use crate::error::TransferError;
use crate::progress::ProgressReporter;
use crate::retry::{Backoff, IsRetryable, retry_with_backoff};
use crate::types::{ItemId, ResumeData, ResumeToken};
use crate::utils::get_available_space;
use futures::StreamExt;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use url::Url;

/// Everything needed to run one transfer
pub(crate) struct TransferTask {
    pub(crate) id: ItemId,
    pub(crate) source_url: Url,
    pub(crate) staged_path: PathBuf,
    /// Where a paused transfer left off
    pub(crate) resume: Option<ResumeData>,
    pub(crate) source: Arc<dyn MediaSource>,
    pub(crate) retry: RetryConfig,
    pub(crate) check_disk_space: bool,
}

/// Position of the transfer within the remote file
#[derive(Debug, Default)]
struct Cursor {
    received: u64,
    total: Option<u64>,
    accepts_ranges: bool,
    validator: Option<String>,
}

/// Metadata of an opened response, split from its body stream
struct ResponseHead {
    partial: bool,
    accepts_ranges: bool,
    total_bytes: Option<u64>,
    validator: Option<String>,
}

/// Reason the inner loop stopped early
enum Interrupt {
    Stop(StopRequest),
    Error(TransferError),
}

impl From<TransferError> for Interrupt {
    fn from(err: TransferError) -> Self {
        Interrupt::Error(err)
    }
}

impl TransferTask {
    /// Run to completion or until `stop` fires
    ///
    /// Cancelled and failed transfers remove their staging file before
    /// returning; a paused transfer keeps it for the resume token.
    pub(crate) async fn run(self, stop: &mut StopSignal, mut reporter: ProgressReporter) -> TransferOutcome {
        tracing::debug!(
            item_id = %self.id,
            source = self.source.name(),
            resume_offset = ?self.resume.as_ref().map(|r| r.offset),
            "Transfer started"
        );

        let mut cursor = Cursor::default();
        let result = self.execute(stop, &mut reporter, &mut cursor).await;

        let outcome = match result {
            Ok(bytes) => TransferOutcome::Completed {
                staged_path: self.staged_path.clone(),
                bytes,
            },
            Err(Interrupt::Stop(StopRequest::Pause)) => match self.pause_token(&cursor) {
                Ok(token) => TransferOutcome::Paused { token },
                Err(e) => TransferOutcome::Failed(e),
            },
            Err(Interrupt::Stop(StopRequest::Cancel)) => TransferOutcome::Cancelled,
            Err(Interrupt::Error(e)) => TransferOutcome::Failed(e),
        };

        if matches!(outcome, TransferOutcome::Cancelled | TransferOutcome::Failed(_)) {
            self.remove_staged().await;
        }

        match &outcome {
            TransferOutcome::Completed { bytes, .. } => {
                tracing::info!(item_id = %self.id, bytes, "Transfer completed");
            }
            TransferOutcome::Paused { .. } => {
                tracing::info!(item_id = %self.id, offset = cursor.received, "Transfer paused");
            }
            TransferOutcome::Cancelled => {
                tracing::info!(item_id = %self.id, "Transfer cancelled");
            }
            TransferOutcome::Failed(e) => {
                tracing::warn!(item_id = %self.id, error = %e, "Transfer failed");
            }
        }
        outcome
    }

    async fn execute(
        &self,
        stop: &mut StopSignal,
        reporter: &mut ProgressReporter,
        cursor: &mut Cursor,
    ) -> Result<u64, Interrupt> {
        let mut file = self.open_staged(cursor).await?;
        // Reconnects after a broken body share one budget per transfer
        let mut reconnects = Backoff::new(&self.retry);

        'connection: loop {
            let request = RangeRequest {
                url: self.source_url.clone(),
                offset: cursor.received,
                validator: cursor.validator.clone(),
            };
            let SourceResponse {
                partial,
                accepts_ranges,
                total_bytes,
                validator,
                mut body,
            } = self.open_source(&request, stop).await?;
            let head = ResponseHead {
                partial,
                accepts_ranges,
                total_bytes,
                validator,
            };
            self.accept_response(head, &mut file, cursor).await?;
            self.ensure_disk_space(cursor).await?;
            reporter.report(cursor.received, cursor.total).await;

            loop {
                let next = tokio::select! {
                    biased;
                    requested = stop.requested() => {
                        file.flush().await.map_err(TransferError::disk)?;
                        return Err(Interrupt::Stop(requested));
                    }
                    chunk = body.next() => chunk,
                };

                match next {
                    Some(Ok(chunk)) => {
                        file.write_all(&chunk).await.map_err(TransferError::disk)?;
                        cursor.received += chunk.len() as u64;
                        reporter.report(cursor.received, cursor.total).await;
                    }
                    Some(Err(e)) if cursor.accepts_ranges && e.is_retryable() => {
                        let Some(delay) = reconnects.next_delay() else {
                            return Err(e.into());
                        };
                        tracing::warn!(
                            item_id = %self.id,
                            error = %e,
                            offset = cursor.received,
                            attempt = reconnects.attempts(),
                            delay_ms = delay.as_millis(),
                            "Body stream broke, reconnecting at current offset"
                        );
                        file.flush().await.map_err(TransferError::disk)?;
                        tokio::select! {
                            biased;
                            requested = stop.requested() => return Err(Interrupt::Stop(requested)),
                            _ = tokio::time::sleep(delay) => {}
                        }
                        continue 'connection;
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => break 'connection,
                }
            }
        }

        file.flush().await.map_err(TransferError::disk)?;
        file.sync_all().await.map_err(TransferError::disk)?;

        if let Some(expected) = cursor.total
            && cursor.received != expected
        {
            return Err(TransferError::Incomplete {
                expected,
                received: cursor.received,
            }
            .into());
        }
        Ok(cursor.received)
    }

    /// Open (or reopen) the staging file at the resume offset
    ///
    /// The offset is the smaller of the token's offset and the bytes actually
    /// on disk; anything past it is truncated.
    async fn open_staged(&self, cursor: &mut Cursor) -> Result<File, TransferError> {
        if let Some(parent) = self.staged_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(TransferError::disk)?;
        }

        let resume = self
            .resume
            .as_ref()
            .filter(|r| r.source_url == self.source_url.as_str());

        let Some(resume) = resume else {
            return File::create(&self.staged_path)
                .await
                .map_err(TransferError::disk);
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.staged_path)
            .await
            .map_err(TransferError::disk)?;
        let on_disk = file.metadata().await.map_err(TransferError::disk)?.len();
        let offset = on_disk.min(resume.offset);
        if offset < resume.offset {
            tracing::debug!(
                item_id = %self.id,
                token_offset = resume.offset,
                on_disk,
                "Staged file shorter than resume token, resuming from what is on disk"
            );
        }
        file.set_len(offset).await.map_err(TransferError::disk)?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(TransferError::disk)?;

        *cursor = Cursor {
            received: offset,
            total: resume.total_bytes,
            // A token is only issued for range-capable sources
            accepts_ranges: true,
            validator: resume.validator.clone(),
        };
        Ok(file)
    }

    async fn open_source(
        &self,
        request: &RangeRequest,
        stop: &mut StopSignal,
    ) -> Result<SourceResponse, Interrupt> {
        tokio::select! {
            biased;
            requested = stop.requested() => Err(Interrupt::Stop(requested)),
            opened = retry_with_backoff(&self.retry, || self.source.open(request)) => {
                opened.map_err(Interrupt::Error)
            }
        }
    }

    /// Align the staging file with what the source is about to send
    async fn accept_response(
        &self,
        response: ResponseHead,
        file: &mut File,
        cursor: &mut Cursor,
    ) -> Result<(), TransferError> {
        if !response.partial && cursor.received > 0 {
            tracing::info!(
                item_id = %self.id,
                discarded = cursor.received,
                "Source sent the whole file, restarting from the first byte"
            );
            file.set_len(0).await.map_err(TransferError::disk)?;
            file.seek(SeekFrom::Start(0))
                .await
                .map_err(TransferError::disk)?;
            cursor.received = 0;
        }

        cursor.accepts_ranges = response.accepts_ranges;
        if response.validator.is_some() {
            cursor.validator = response.validator;
        }
        if response.total_bytes.is_some() || !response.partial {
            cursor.total = response.total_bytes;
        }
        Ok(())
    }

    async fn ensure_disk_space(&self, cursor: &Cursor) -> Result<(), TransferError> {
        if !self.check_disk_space {
            return Ok(());
        }
        let Some(total) = cursor.total else {
            return Ok(());
        };
        let required = total.saturating_sub(cursor.received);
        let dir = self
            .staged_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        match get_available_space(&dir) {
            Ok(available) if available < required => {
                Err(TransferError::InsufficientSpace { required, available })
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    item_id = %self.id,
                    error = %e,
                    "Could not determine free disk space, continuing"
                );
                Ok(())
            }
        }
    }

    fn pause_token(&self, cursor: &Cursor) -> Result<ResumeToken, TransferError> {
        if !cursor.accepts_ranges && cursor.received > 0 {
            return Err(TransferError::ResumeUnsupported);
        }
        ResumeToken::encode(&ResumeData {
            source_url: self.source_url.to_string(),
            offset: cursor.received,
            total_bytes: cursor.total,
            validator: cursor.validator.clone(),
        })
        .map_err(TransferError::disk)
    }

    async fn remove_staged(&self) {
        match tokio::fs::remove_file(&self.staged_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                item_id = %self.id,
                path = %self.staged_path.display(),
                error = %e,
                "Failed to remove staged file"
            ),
        }
    }
}
