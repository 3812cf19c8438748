//! Disk cache mapping from item identity to file location
//!
//! Completed episodes live at `<cache_dir>/<sha256(identity)>.<ext>` and
//! in-flight bytes at `<staging_dir>/<sha256(identity)>.part`. Hashing the
//! full identity keeps distinct URLs from aliasing, while the extension is
//! preserved because players sniff it.

use crate::error::Result;
use crate::types::ItemId;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Suffix of staged partial files
const STAGING_SUFFIX: &str = "part";

/// Longest URL extension carried over to the cache file name
const MAX_EXTENSION_LEN: usize = 5;

/// Deterministic identity → path mapper for the episode cache
#[derive(Clone, Debug)]
pub struct DiskCache {
    cache_dir: PathBuf,
    staging_dir: PathBuf,
}

impl DiskCache {
    /// Create a mapper over the given directories (nothing is created on disk)
    pub fn new(cache_dir: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            staging_dir: staging_dir.into(),
        }
    }

    /// Directory holding completed files
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory holding partial files
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Create the cache and staging directories if they are missing
    pub async fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.cache_dir, &self.staging_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory '{}': {}", dir.display(), e),
                )
            })?;
        }
        Ok(())
    }

    /// Final cache location for an item
    pub fn path_for(&self, id: &ItemId) -> PathBuf {
        let key = identity_hash(id);
        let name = match media_extension(id) {
            Some(ext) => format!("{key}.{ext}"),
            None => key,
        };
        self.cache_dir.join(name)
    }

    /// Staging location for an item's partial bytes
    pub fn staging_path_for(&self, id: &ItemId) -> PathBuf {
        self.staging_dir
            .join(format!("{}.{}", identity_hash(id), STAGING_SUFFIX))
    }

    /// Whether the completed file for an item is present
    pub async fn exists(&self, id: &ItemId) -> bool {
        is_file(&self.path_for(id)).await
    }

    /// Move a fully received staging file into the cache
    ///
    /// The rename replaces any stale file at the destination, so a reader
    /// never observes a half-written cache entry.
    pub async fn commit(&self, id: &ItemId, staged: &Path) -> Result<PathBuf> {
        let target = self.path_for(id);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(staged, &target).await?;
        tracing::debug!(
            item_id = %id,
            path = %target.display(),
            "Committed staged file to cache"
        );
        Ok(target)
    }

    /// Remove the cached file for an item
    ///
    /// Returns whether a file was actually removed.
    pub async fn delete(&self, id: &ItemId) -> Result<bool> {
        remove_if_present(&self.path_for(id)).await
    }

    /// Remove the staging file for an item, ignoring a missing file
    pub async fn discard_staged(&self, id: &ItemId) {
        let staged = self.staging_path_for(id);
        if let Err(e) = remove_if_present(&staged).await {
            tracing::warn!(
                item_id = %id,
                path = %staged.display(),
                error = %e,
                "Failed to remove staged file"
            );
        }
    }

    /// Delete staging files that do not belong to any of `keep`
    ///
    /// Run at startup to reclaim space from transfers that were interrupted
    /// without being paused. Returns the number of files removed.
    pub async fn sweep_staging(&self, keep: &[ItemId]) -> Result<usize> {
        let keep: HashSet<PathBuf> = keep.iter().map(|id| self.staging_path_for(id)).collect();

        let mut entries = match tokio::fs::read_dir(&self.staging_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_staged = path.extension().and_then(|e| e.to_str()) == Some(STAGING_SUFFIX);
            if !is_staged || keep.contains(&path) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to sweep staged file");
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Removed orphaned staging files");
        }
        Ok(removed)
    }
}

/// Hex SHA-256 of the identity string
fn identity_hash(id: &ItemId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_str().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// File extension of the URL path, when it looks like a media extension
fn media_extension(id: &ItemId) -> Option<String> {
    let url = url::Url::parse(id.as_str()).ok()?;
    let last = url.path_segments()?.next_back()?.to_string();
    let ext = Path::new(&last).extension()?.to_str()?;
    let valid = !ext.is_empty()
        && ext.len() <= MAX_EXTENSION_LEN
        && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn remove_if_present(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
