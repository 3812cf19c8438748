//! Test configuration helpers for creating downloaders rooted in a temp directory

use episode_dl::config::{CacheConfig, PersistenceConfig, ProgressConfig, RetryConfig};
use episode_dl::{Config, EpisodeDownloader, MediaSource};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Build a config whose cache, staging, and database live under `dir`
///
/// Progress is unthrottled and retries are fast so tests observe every step
/// without waiting on real backoff delays.
pub fn create_test_config(dir: &Path) -> Config {
    Config {
        cache: CacheConfig {
            cache_dir: dir.join("episodes"),
            staging_dir: dir.join("staging"),
            ..Default::default()
        },
        progress: ProgressConfig {
            min_interval: Duration::ZERO,
            min_delta: 0.0,
        },
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        persistence: PersistenceConfig {
            database_path: dir.join("episodes.db"),
        },
        ..Default::default()
    }
}

/// Create a downloader using the real HTTP source
///
/// The returned `TempDir` must be kept alive for the duration of the test.
pub async fn create_http_downloader() -> (EpisodeDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let downloader = open_downloader(temp_dir.path()).await;
    (downloader, temp_dir)
}

/// Open (or reopen) a downloader over an existing directory with the HTTP source
pub async fn open_downloader(dir: &Path) -> EpisodeDownloader {
    EpisodeDownloader::new(create_test_config(dir))
        .await
        .expect("Failed to create downloader")
}

/// Open a downloader over `dir` with a custom media source
pub async fn open_downloader_with_source(
    dir: &Path,
    source: Arc<dyn MediaSource>,
) -> EpisodeDownloader {
    EpisodeDownloader::with_source(create_test_config(dir), source)
        .await
        .expect("Failed to create downloader")
}
