//! Transfer controller -- fetching one episode into its staging file.
//!
//! Split into focused submodules:
//! - [`source`] - Media source trait and range request/response types
//! - [`http`] - Production source over HTTP with partial-content support
//! - [`task`] - The stop-aware transfer loop

mod http;
mod source;
mod task;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod testing;


use crate::error::TransferError;
use crate::types::ResumeToken;
use std::path::PathBuf;
use tokio::sync::oneshot;

pub use http::HttpSource;
pub use source::{ByteStream, MediaSource, RangeRequest, SourceResponse};
pub(crate) use task::TransferTask;

/// Request sent from the orchestrator to a running transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopRequest {
    /// Stop and hand back a resume token
    Pause,
    /// Stop and drop the partial bytes
    Cancel,
}

/// Receiving half of a transfer's stop channel
///
/// A delivered request is observed exactly once; afterwards the signal never
/// fires again, so it can still be awaited once the transfer loop is done.
pub(crate) struct StopSignal {
    rx: Option<oneshot::Receiver<StopRequest>>,
}

impl StopSignal {
    pub(crate) fn new(rx: oneshot::Receiver<StopRequest>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Wait for a stop request
    ///
    /// A dropped sender counts as [`StopRequest::Cancel`]. Dropping the
    /// returned future before it resolves loses nothing.
    pub(crate) async fn requested(&mut self) -> StopRequest {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        let request = rx.await.unwrap_or(StopRequest::Cancel);
        self.rx = None;
        request
    }

    /// Whether a request has already been observed
    pub(crate) fn is_consumed(&self) -> bool {
        self.rx.is_none()
    }
}

/// How a transfer ended
#[derive(Debug)]
pub(crate) enum TransferOutcome {
    /// Every byte is in the staging file
    Completed {
        /// Location of the staged file, ready to commit
        staged_path: PathBuf,
        /// Bytes in the file
        bytes: u64,
    },
    /// Stopped on request; the staged bytes are kept for the token
    Paused {
        /// Continuation data
        token: ResumeToken,
    },
    /// Stopped on request; the staged bytes were removed
    Cancelled,
    /// Ended with an error; the staged bytes were removed
    Failed(TransferError),
}
