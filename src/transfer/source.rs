//! Media source abstraction
//!
//! The transfer loop only needs "give me the bytes from offset N". Keeping
//! that behind a trait lets the orchestrator run against HTTP in production
//! and against a scripted in-memory source in tests.

use crate::error::TransferError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use url::Url;

/// Stream of body chunks
pub type ByteStream = BoxStream<'static, Result<Bytes, TransferError>>;

/// Request for the bytes of a media file starting at `offset`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    /// Media location
    pub url: Url,
    /// First byte wanted; `0` asks for the whole file
    pub offset: u64,
    /// Validator from a previous response; only send the range if the
    /// remote file is unchanged
    pub validator: Option<String>,
}

/// An opened media body
pub struct SourceResponse {
    /// The body starts at the requested offset (otherwise it is the whole file)
    pub partial: bool,
    /// The source can serve byte ranges for this file
    pub accepts_ranges: bool,
    /// Full size of the file, when announced
    pub total_bytes: Option<u64>,
    /// `ETag` or `Last-Modified` of the file
    pub validator: Option<String>,
    /// Body chunks
    pub body: ByteStream,
}

impl std::fmt::Debug for SourceResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceResponse")
            .field("partial", &self.partial)
            .field("accepts_ranges", &self.accepts_ranges)
            .field("total_bytes", &self.total_bytes)
            .field("validator", &self.validator)
            .finish_non_exhaustive()
    }
}

/// Origin of episode bytes
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Open the media body for `request`
    ///
    /// Implementations report protocol-level failures (connection errors,
    /// error statuses) as [`TransferError`] so they can be classified for
    /// retry.
    async fn open(&self, request: &RangeRequest) -> Result<SourceResponse, TransferError>;

    /// Human-readable name of the implementation
    fn name(&self) -> &'static str;
}
