//! Custom test assertions for integration tests

use episode_dl::{DownloadState, EpisodeDownloader, ItemId};
use std::path::PathBuf;
use std::time::Duration;

/// Default time allowed for a transfer to settle
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll the downloader until the item's state satisfies `predicate`
///
/// Returns the matching state, or `None` on timeout.
pub async fn wait_for_state<F>(
    downloader: &EpisodeDownloader,
    id: &ItemId,
    timeout: Duration,
    predicate: F,
) -> Option<DownloadState>
where
    F: Fn(&DownloadState) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            let state = downloader.state(id).await;
            if predicate(&state) {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .ok()
}

/// Wait for the item to be downloaded and return its cached path
///
/// Panics with the last observed state on timeout.
pub async fn wait_for_downloaded(downloader: &EpisodeDownloader, id: &ItemId) -> PathBuf {
    let state = wait_for_state(downloader, id, SETTLE_TIMEOUT, |s| {
        matches!(s, DownloadState::Downloaded { .. } | DownloadState::Failed { .. })
    })
    .await;

    match state {
        Some(DownloadState::Downloaded { local_path }) => local_path,
        Some(other) => panic!("download of {id} ended in {other:?}"),
        None => panic!(
            "timed out waiting for {id}; last state: {:?}",
            downloader.state(id).await
        ),
    }
}

/// Assert that the cached file for `id` holds exactly `expected`
pub async fn assert_cached_file(downloader: &EpisodeDownloader, id: &ItemId, expected: &[u8]) {
    let path = downloader
        .local_path(id)
        .await
        .unwrap_or_else(|| panic!("{id} has no local file"));
    let actual = tokio::fs::read(&path)
        .await
        .unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()));
    assert_eq!(actual.len(), expected.len(), "cached file size mismatch");
    assert!(actual == expected, "cached file content mismatch");
}
