//! Core types for episode-dl

use crate::error::{Error, Result, TransferError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Stable identity of a downloadable media item
///
/// The identity is the canonical form of the episode's source URL: scheme and
/// host lower-cased, default port removed, fragment stripped. Two episodes
/// with the same canonical URL are the same download target.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Derive the identity from a source URL string
    pub fn parse(source_url: &str) -> Result<Self> {
        canonical_url(source_url).map(|url| Self::from_url(&url))
    }

    /// Identity of an already-canonical URL
    pub fn from_url(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(url.into())
    }

    /// Rebuild an identity from its stored string form
    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }

    /// Get the identity string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn canonical_url(source_url: &str) -> Result<Url> {
    let mut url =
        Url::parse(source_url.trim()).map_err(|e| Error::InvalidUrl(format!("{source_url}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::InvalidUrl(format!(
                "{source_url}: unsupported scheme '{other}'"
            )));
        }
    }
    url.set_fragment(None);
    Ok(url)
}

/// A media item handed over by the feed layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Identity derived from `source_url`
    pub id: ItemId,
    /// Remote location of the media file
    pub source_url: Url,
    /// Optional display title, used only in log output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Episode {
    /// Create an episode from its enclosure URL
    ///
    /// # Examples
    ///
    /// ```
    /// use episode_dl::Episode;
    ///
    /// let episode = Episode::parse("HTTPS://Cdn.Example.com:443/show/ep1.mp3#t=30").unwrap();
    /// assert_eq!(episode.id.as_str(), "https://cdn.example.com/show/ep1.mp3");
    /// ```
    pub fn parse(source_url: &str) -> Result<Self> {
        let url = canonical_url(source_url)?;
        Ok(Self {
            id: ItemId::from_url(&url),
            source_url: url,
            title: None,
        })
    }

    /// Attach a display title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Opaque continuation data for a paused transfer
///
/// The bytes are meaningful only to the transfer controller that produced
/// them. They are stored alongside the paused state and persisted verbatim.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeToken(Vec<u8>);

impl ResumeToken {
    /// Wrap raw token bytes (for example, loaded from storage)
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the raw token bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub(crate) fn encode(data: &ResumeData) -> Result<Self> {
        Ok(Self(serde_json::to_vec(data)?))
    }

    pub(crate) fn decode(&self) -> Result<ResumeData> {
        serde_json::from_slice(&self.0).map_err(|e| Error::InvalidResumeToken(e.to_string()))
    }
}

impl std::fmt::Debug for ResumeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResumeToken({} bytes)", self.0.len())
    }
}

/// What a resume token captures
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ResumeData {
    /// URL the partial bytes came from
    pub source_url: String,
    /// Number of bytes already in the staging file
    pub offset: u64,
    /// Total size announced by the server, if any
    pub total_bytes: Option<u64>,
    /// `ETag` or `Last-Modified` value, sent back as `If-Range`
    pub validator: Option<String>,
}

/// Download state of one item
///
/// Equality follows what observers care about: every `Failed` equals every
/// other `Failed`, and `Paused` compares only its progress.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DownloadState {
    /// Never requested, cancelled, or deleted
    #[default]
    None,
    /// A transfer is running
    Downloading {
        /// Fraction complete in `[0, 1]`
        progress: f64,
    },
    /// A transfer was paused and can be resumed
    Paused {
        /// Fraction complete at the pause point
        progress: f64,
        /// Continuation data for the transfer controller
        resume_token: ResumeToken,
    },
    /// The file is in the local cache
    Downloaded {
        /// Location of the cached file
        local_path: PathBuf,
    },
    /// The last transfer failed; `start` retries from scratch
    Failed {
        /// Why it failed
        error: TransferError,
    },
}

impl PartialEq for DownloadState {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DownloadState::None, DownloadState::None) => true,
            (DownloadState::Downloading { progress: a }, DownloadState::Downloading { progress: b }) => {
                a == b
            }
            (
                DownloadState::Paused { progress: a, .. },
                DownloadState::Paused { progress: b, .. },
            ) => a == b,
            (
                DownloadState::Downloaded { local_path: a },
                DownloadState::Downloaded { local_path: b },
            ) => a == b,
            (DownloadState::Failed { .. }, DownloadState::Failed { .. }) => true,
            _ => false,
        }
    }
}

impl DownloadState {
    /// Short lowercase name for logging
    pub fn name(&self) -> &'static str {
        match self {
            DownloadState::None => "none",
            DownloadState::Downloading { .. } => "downloading",
            DownloadState::Paused { .. } => "paused",
            DownloadState::Downloaded { .. } => "downloaded",
            DownloadState::Failed { .. } => "failed",
        }
    }

    /// Progress for downloading and paused states
    pub fn progress(&self) -> Option<f64> {
        match self {
            DownloadState::Downloading { progress } | DownloadState::Paused { progress, .. } => {
                Some(*progress)
            }
            _ => None,
        }
    }

    /// Whether a transfer is running or resumable
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DownloadState::Downloading { .. } | DownloadState::Paused { .. }
        )
    }

    /// Whether this is the implicit default state
    pub fn is_none(&self) -> bool {
        matches!(self, DownloadState::None)
    }
}

/// Event emitted by the orchestrator
///
/// Progress updates are delivered as `StateChanged` with a `Downloading`
/// state and are throttled; every other transition is delivered immediately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An item moved to a new state (or reported new progress)
    StateChanged {
        /// Item identity
        id: ItemId,
        /// State after the change
        state: DownloadState,
    },

    /// The orchestrator finished shutting down
    Shutdown,
}
