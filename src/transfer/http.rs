//! HTTP media source with partial-content support

use super::source::{MediaSource, RangeRequest, SourceResponse};
use crate::config::TransferConfig;
use crate::error::{Error, Result, TransferError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::{
    ACCEPT_RANGES, CONTENT_RANGE, ETAG, HeaderMap, IF_RANGE, LAST_MODIFIED, RANGE,
};

/// Production [`MediaSource`] backed by a shared `reqwest` client
#[derive(Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Build a source using the transfer settings (user agent, connect timeout)
    pub fn new(config: &TransferConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(Error::Network)?;
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: &RangeRequest) -> std::result::Result<reqwest::Response, TransferError> {
        let mut builder = self.client.get(request.url.clone());
        if request.offset > 0 {
            builder = builder.header(RANGE, format!("bytes={}-", request.offset));
            if let Some(validator) = &request.validator {
                builder = builder.header(IF_RANGE, validator.as_str());
            }
        }
        Ok(builder.send().await?)
    }
}

#[async_trait]
impl MediaSource for HttpSource {
    async fn open(&self, request: &RangeRequest) -> std::result::Result<SourceResponse, TransferError> {
        let mut response = self.send(request).await?;

        if response.status() == StatusCode::RANGE_NOT_SATISFIABLE && request.offset > 0 {
            // The remote file no longer covers our offset; start over.
            tracing::info!(
                url = %request.url,
                offset = request.offset,
                "Server rejected resume range, fetching whole file"
            );
            let fresh = RangeRequest {
                url: request.url.clone(),
                offset: 0,
                validator: None,
            };
            response = self.send(&fresh).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let headers = response.headers();
        let content_range = headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);

        let partial = status == StatusCode::PARTIAL_CONTENT && request.offset > 0;
        if partial && content_range.map(|(start, _)| start) != Some(request.offset) {
            return Err(TransferError::network(format!(
                "server answered range request for byte {} with mismatched Content-Range",
                request.offset
            )));
        }

        let total_bytes = match content_range {
            Some((_, Some(total))) => Some(total),
            _ => response
                .content_length()
                .map(|len| if partial { len + request.offset } else { len }),
        };
        let accepts_ranges = partial || advertises_byte_ranges(headers);
        let validator = validator_of(headers);

        tracing::debug!(
            url = %request.url,
            status = status.as_u16(),
            partial,
            accepts_ranges,
            total_bytes = ?total_bytes,
            "Opened HTTP media body"
        );

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransferError::from))
            .boxed();

        Ok(SourceResponse {
            partial,
            accepts_ranges,
            total_bytes,
            validator,
            body,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Parse `bytes <start>-<end>/<total>` into `(start, total)`
fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let spec = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = spec.split_once('/')?;
    let (start, _end) = range.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };
    Some((start, total))
}

fn advertises_byte_ranges(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")))
}

/// Strong `ETag` if present, otherwise `Last-Modified`
///
/// Weak ETags are not allowed in `If-Range`.
fn validator_of(headers: &HeaderMap) -> Option<String> {
    let etag = headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.starts_with("W/"));
    etag.or_else(|| headers.get(LAST_MODIFIED).and_then(|v| v.to_str().ok()))
        .map(str::to_string)
}
