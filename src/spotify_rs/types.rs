use serde::{Deserialize, Serialize};

use crate::models::{Artist, Playlist, Track};

/// Spotify user profile
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyUser {
    pub id: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyOwner {
    pub id: String,
}

/// Simplified playlist from /me/playlists
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPlaylist {
    pub id: String,
    pub name: String,
    pub owner: SpotifyOwner,
}

impl From<SpotifyPlaylist> for Playlist {
    fn from(playlist: SpotifyPlaylist) -> Self {
        Playlist {
            id: playlist.id,
            name: playlist.name,
            tracks: Vec::new(),
            parent_id: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    /// Null for local files.
    pub id: Option<String>,
    pub name: String,
}

/// Spotify track from API
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTrack {
    /// Null for local files.
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SpotifyArtist>,
    pub duration_ms: Option<u64>,
}

impl SpotifyTrack {
    /// Local files have no id and cannot be added to playlists.
    pub fn into_track(self) -> Option<Track> {
        let id = self.id?;
        let artist = self
            .artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Some(Track {
            id,
            title: self.name,
            artist,
            duration_ms: self.duration_ms,
            key: None,
            artist_ids: self.artists.into_iter().filter_map(|a| a.id).collect(),
        })
    }
}

/// Offset-paginated list.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    pub track: Option<SpotifyTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SavedTrack {
    pub track: SpotifyTrack,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub tracks: Page<SpotifyTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowedArtist {
    pub id: String,
    pub name: String,
}

impl From<FollowedArtist> for Artist {
    fn from(artist: FollowedArtist) -> Self {
        Artist {
            id: artist.id,
            name: artist.name,
        }
    }
}

/// /me/following wraps its cursor page in an `artists` object.
#[derive(Debug, Clone, Deserialize)]
pub struct FollowedArtistsResponse {
    pub artists: Page<FollowedArtist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPlaylist {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatePlaylistRequest<'a> {
    pub name: &'a str,
    pub public: bool,
    pub description: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackUris {
    pub uris: Vec<String>,
}

impl TrackUris {
    pub fn from_ids(ids: &[String]) -> Self {
        Self {
            uris: ids.iter().map(|id| format!("spotify:track:{id}")).collect(),
        }
    }
}
