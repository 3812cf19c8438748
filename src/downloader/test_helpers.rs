//! Shared test helpers for creating EpisodeDownloader instances in tests.

use crate::config::{Config, RetryConfig};
use crate::downloader::EpisodeDownloader;
use crate::transfer::testing::ScriptedSource;
use crate::types::{DownloadState, Episode, ItemId};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// Config rooted in `dir` with fast retries and no progress throttling
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = dir.join("test.db");
    config.cache.cache_dir = dir.join("episodes");
    config.cache.staging_dir = dir.join("staging");
    config.progress.min_interval = Duration::ZERO;
    config.progress.min_delta = 0.0;
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

/// Helper to create a test downloader over a scripted source.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader(
    source: Arc<ScriptedSource>,
) -> (EpisodeDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let downloader = EpisodeDownloader::with_source(test_config(temp_dir.path()), source)
        .await
        .unwrap();
    (downloader, temp_dir)
}

/// Reopen a downloader over an existing directory (simulates a restart)
pub(crate) async fn reopen_downloader(
    dir: &Path,
    source: Arc<ScriptedSource>,
) -> EpisodeDownloader {
    EpisodeDownloader::with_source(test_config(dir), source)
        .await
        .unwrap()
}

pub(crate) fn episode(n: u32) -> Episode {
    Episode::parse(&format!("https://cdn.example.com/show/ep{n}.mp3")).unwrap()
}

/// Poll until the item's state satisfies `predicate`
pub(crate) async fn wait_for_state<F>(
    downloader: &EpisodeDownloader,
    id: &ItemId,
    predicate: F,
) -> DownloadState
where
    F: Fn(&DownloadState) -> bool,
{
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let state = downloader.state(id).await;
            if predicate(&state) {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    match result {
        Ok(state) => state,
        Err(_) => panic!(
            "timed out waiting for state; last state: {:?}",
            downloader.state(id).await
        ),
    }
}

pub(crate) async fn wait_for_downloaded(downloader: &EpisodeDownloader, id: &ItemId) -> DownloadState {
    wait_for_state(downloader, id, |s| matches!(s, DownloadState::Downloaded { .. })).await
}

pub(crate) async fn wait_for_progress(downloader: &EpisodeDownloader, id: &ItemId, progress: f64) {
    wait_for_state(downloader, id, |s| {
        matches!(s, DownloadState::Downloading { progress: p } if (p - progress).abs() < 1e-9)
    })
    .await;
}
