//! Scripted in-memory [`MediaSource`] for tests

use super::source::{MediaSource, RangeRequest, SourceResponse};
use crate::error::TransferError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Deterministic media source
///
/// Serves `body` in fixed-size chunks. When gated, each chunk waits for one
/// permit on the gate, which lets a test hold a transfer at an exact byte
/// offset before pausing it.
pub(crate) struct ScriptedSource {
    body: Arc<Vec<u8>>,
    chunk_size: usize,
    accepts_ranges: bool,
    validator: Option<String>,
    gate: Option<Arc<Semaphore>>,
    open_failures: Mutex<VecDeque<TransferError>>,
    /// Break the body stream once when it reaches this offset
    stream_fault_at: Arc<AtomicU64>,
    stream_fault_armed: Arc<AtomicBool>,
    requests: Mutex<Vec<RangeRequest>>,
}

impl ScriptedSource {
    pub(crate) fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            chunk_size: 100,
            accepts_ranges: true,
            validator: Some("\"scripted\"".to_string()),
            gate: None,
            open_failures: Mutex::new(VecDeque::new()),
            stream_fault_at: Arc::new(AtomicU64::new(0)),
            stream_fault_armed: Arc::new(AtomicBool::new(false)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `len` bytes of a repeating pattern
    pub(crate) fn sized(len: usize) -> Self {
        Self::new((0..len).map(|i| (i % 251) as u8).collect())
    }

    pub(crate) fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Behave like a server that ignores `Range`
    pub(crate) fn without_ranges(mut self) -> Self {
        self.accepts_ranges = false;
        self
    }

    /// Release chunks only as permits are added to the returned semaphore
    pub(crate) fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }

    /// Fail the next `open` calls with these errors, in order
    pub(crate) fn fail_opens(self, errors: impl IntoIterator<Item = TransferError>) -> Self {
        self.open_failures.lock().unwrap().extend(errors);
        self
    }

    /// Break the body once when `offset` bytes have been served
    pub(crate) fn break_stream_at(self, offset: u64) -> Self {
        self.stream_fault_at.store(offset, Ordering::SeqCst);
        self.stream_fault_armed.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }

    /// Every request seen so far, including failed ones
    pub(crate) fn requests(&self) -> Vec<RangeRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn open_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaSource for ScriptedSource {
    async fn open(&self, request: &RangeRequest) -> Result<SourceResponse, TransferError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(err) = self.open_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let len = self.body.len() as u64;
        let partial = self.accepts_ranges && request.offset > 0 && request.offset <= len;
        let start = if partial { request.offset } else { 0 };

        let body = self.body.clone();
        let chunk_size = self.chunk_size;
        let gate = self.gate.clone();
        let fault_at = self.stream_fault_at.clone();
        let fault_armed = self.stream_fault_armed.clone();

        let stream = futures::stream::unfold(start, move |position| {
            let body = body.clone();
            let gate = gate.clone();
            let fault_at = fault_at.clone();
            let fault_armed = fault_armed.clone();
            async move {
                if position >= body.len() as u64 {
                    return None;
                }
                if let Some(gate) = gate {
                    gate.acquire().await.unwrap().forget();
                }
                if position >= fault_at.load(Ordering::SeqCst)
                    && fault_armed.swap(false, Ordering::SeqCst)
                {
                    // Ending the position past the body stops the stream after the error
                    return Some((
                        Err(TransferError::network("connection reset by peer")),
                        u64::MAX,
                    ));
                }
                let from = position as usize;
                let to = (from + chunk_size).min(body.len());
                let chunk = Bytes::copy_from_slice(&body[from..to]);
                Some((Ok(chunk), to as u64))
            }
        })
        .boxed();

        Ok(SourceResponse {
            partial,
            accepts_ranges: self.accepts_ranges,
            total_bytes: Some(len),
            validator: self.validator.clone(),
            body: stream,
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
