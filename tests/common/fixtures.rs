//! Test fixtures: media bodies, a Range-aware mock responder, and a stalling source

use async_trait::async_trait;
use episode_dl::{
    Episode, HttpSource, MediaSource, RangeRequest, SourceResponse, TransferConfig, TransferError,
};
use futures::StreamExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Strong validator served for every fixture body
pub const FIXTURE_ETAG: &str = "\"episode-v1\"";

/// Deterministic media body of `len` bytes
pub fn media_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// Serves a body the way a static file server does
///
/// Honors `Range: bytes=N-` with 206 and a matching `Content-Range`, answers
/// 416 past the end, and advertises `Accept-Ranges: bytes` plus a strong ETag.
pub struct MediaResponder {
    body: Vec<u8>,
}

impl MediaResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self { body }
    }
}

impl Respond for MediaResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let range_start = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="))
            .and_then(|v| v.trim_end_matches('-').parse::<usize>().ok());
        let len = self.body.len();

        match range_start {
            Some(start) if start >= len => ResponseTemplate::new(416)
                .insert_header("content-range", format!("bytes */{len}").as_str()),
            Some(start) => ResponseTemplate::new(206)
                .insert_header("accept-ranges", "bytes")
                .insert_header("etag", FIXTURE_ETAG)
                .insert_header(
                    "content-range",
                    format!("bytes {}-{}/{}", start, len - 1, len).as_str(),
                )
                .set_body_bytes(&self.body[start..]),
            None => ResponseTemplate::new(200)
                .insert_header("accept-ranges", "bytes")
                .insert_header("etag", FIXTURE_ETAG)
                .set_body_bytes(self.body.as_slice()),
        }
    }
}

/// Mount `body` at `route` on the mock server and return the matching episode
pub async fn mount_episode(server: &MockServer, route: &str, body: Vec<u8>) -> Episode {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(MediaResponder::new(body))
        .mount(server)
        .await;
    episode_at(server, route)
}

/// Episode pointing at `route` on the mock server
pub fn episode_at(server: &MockServer, route: &str) -> Episode {
    Episode::parse(&format!("{}{}", server.uri(), route)).expect("valid mock server URL")
}

/// Values of the `Range` header of every request the server received for `route`
pub async fn range_headers(server: &MockServer, route: &str) -> Vec<Option<String>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == route)
        .map(|r| {
            r.headers
                .get("range")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .collect()
}

/// HTTP source that stops delivering bytes after a fixed offset
///
/// The body stream stays open but never yields again, which holds a transfer
/// at an exact byte count so it can be paused there.
pub struct StallingSource {
    inner: HttpSource,
    stall_after: u64,
}

impl StallingSource {
    pub fn new(stall_after: u64) -> Self {
        Self {
            inner: HttpSource::new(&TransferConfig::default()).expect("HTTP client"),
            stall_after,
        }
    }
}

#[async_trait]
impl MediaSource for StallingSource {
    async fn open(&self, request: &RangeRequest) -> Result<SourceResponse, TransferError> {
        let mut response = self.inner.open(request).await?;
        let body = std::mem::replace(&mut response.body, futures::stream::empty().boxed());
        let start = if response.partial { request.offset } else { 0 };
        let budget = self.stall_after.saturating_sub(start);

        response.body = futures::stream::unfold((body, budget), |(mut body, remaining)| async move {
            if remaining == 0 {
                futures::future::pending::<()>().await;
            }
            match body.next().await? {
                Ok(mut chunk) => {
                    if chunk.len() as u64 > remaining {
                        chunk.truncate(remaining as usize);
                    }
                    let left = remaining - chunk.len() as u64;
                    Some((Ok(chunk), (body, left)))
                }
                Err(e) => Some((Err(e), (body, remaining))),
            }
        })
        .boxed();
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "stalling-http"
    }
}
