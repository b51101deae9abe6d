use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

use crate::models::{Artist, Playlist, Track};

/// Which half of the capability set an adapter supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryCapability {
    /// Read-only library; every mutation returns [`AdapterError::Unsupported`].
    SourceOnly,
    ReadWrite,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("rate limited by remote library (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient remote failure: {0}")]
    Transient(String),

    #[error("operation `{operation}` is not supported by this library")]
    Unsupported { operation: &'static str },

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("remote library returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("failed to decode remote response: {0}")]
    Decode(String),
}

impl AdapterError {
    /// Whether retrying the same call later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdapterError::RateLimited { .. } | AdapterError::Transient(_)
        )
    }

    pub fn unsupported(operation: &'static str) -> Self {
        AdapterError::Unsupported { operation }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return AdapterError::Transient(err.to_string());
        }
        if err.is_decode() {
            return AdapterError::Decode(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 429 => {
                AdapterError::RateLimited { retry_after: None }
            }
            Some(status) if status.is_server_error() => AdapterError::Transient(err.to_string()),
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                AdapterError::Unauthorized(err.to_string())
            }
            Some(status) => AdapterError::Remote {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => AdapterError::Transient(err.to_string()),
        }
    }
}

/// Port trait for "any music platform" used by the matching and sync services.
///
/// Implementations live in `json_library` (source), `spotify_rs::client`
/// (target) or test fakes.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MusicLibrary: Send + Sync {
    fn capability(&self) -> LibraryCapability;

    async fn list_playlists(&self) -> Result<Vec<Playlist>, AdapterError>;

    async fn list_tracks_in_playlist(&self, playlist_id: &str) -> Result<Vec<Track>, AdapterError>;

    /// Create a playlist holding `track_ids` in order and return its id.
    async fn create_playlist(&self, name: &str, track_ids: &[String])
    -> Result<String, AdapterError>;

    async fn replace_playlist_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<(), AdapterError>;

    async fn delete_playlist(&self, playlist_id: &str) -> Result<(), AdapterError>;

    async fn search_tracks(&self, title: &str, artist: &str) -> Result<Vec<Track>, AdapterError>;

    async fn get_liked_tracks(&self) -> Result<HashSet<String>, AdapterError>;

    async fn follow_artist(&self, artist_id: &str) -> Result<(), AdapterError>;

    async fn get_followed_artists(&self) -> Result<Vec<Artist>, AdapterError>;
}

/// Fail at wiring time when a library cannot be mutated.
pub fn ensure_writable(library: &dyn MusicLibrary, role: &str) -> Result<(), AdapterError> {
    match library.capability() {
        LibraryCapability::ReadWrite => Ok(()),
        LibraryCapability::SourceOnly => {
            log::error!("{} library is read-only and cannot be synced to", role);
            Err(AdapterError::unsupported("write"))
        }
    }
}
