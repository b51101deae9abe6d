use std::collections::HashSet;
use std::path::Path;

use color_eyre::eyre::{Result, WrapErr};
use serde::Deserialize;

use crate::models::{Artist, Playlist, Track};
use crate::ports::library::{AdapterError, LibraryCapability, MusicLibrary};

#[derive(Debug, Deserialize)]
struct LibrarySnapshot {
    playlists: Vec<Playlist>,
}

/// Read-only source library backed by an exported JSON snapshot.
pub struct JsonLibrary {
    playlists: Vec<Playlist>,
}

impl JsonLibrary {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .wrap_err_with(|| format!("Failed to read source library {}", path.display()))?;
        let library = Self::from_json(&raw)
            .wrap_err_with(|| format!("Failed to parse source library {}", path.display()))?;
        log::info!(
            "Loaded {} top-level playlists from {}",
            library.playlists.len(),
            path.display()
        );
        Ok(library)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: LibrarySnapshot = serde_json::from_str(raw)?;
        let playlists = snapshot
            .playlists
            .into_iter()
            .map(|p| with_parent_ids(p, None))
            .collect();
        Ok(Self { playlists })
    }
}

fn with_parent_ids(mut playlist: Playlist, parent: Option<&str>) -> Playlist {
    playlist.parent_id = parent.map(str::to_string);
    let id = playlist.id.clone();
    playlist.children = playlist
        .children
        .into_iter()
        .map(|child| with_parent_ids(child, Some(&id)))
        .collect();
    playlist
}

fn find<'a>(playlists: &'a [Playlist], id: &str) -> Option<&'a Playlist> {
    playlists
        .iter()
        .find_map(|p| if p.id == id { Some(p) } else { find(&p.children, id) })
}

#[async_trait::async_trait]
impl MusicLibrary for JsonLibrary {
    fn capability(&self) -> LibraryCapability {
        LibraryCapability::SourceOnly
    }

    async fn list_playlists(&self) -> Result<Vec<Playlist>, AdapterError> {
        Ok(self.playlists.clone())
    }

    async fn list_tracks_in_playlist(&self, playlist_id: &str) -> Result<Vec<Track>, AdapterError> {
        find(&self.playlists, playlist_id)
            .map(|p| p.tracks.clone())
            .ok_or_else(|| AdapterError::Remote {
                status: 404,
                message: format!("playlist {playlist_id} not in snapshot"),
            })
    }

    async fn create_playlist(
        &self,
        _name: &str,
        _track_ids: &[String],
    ) -> Result<String, AdapterError> {
        Err(AdapterError::unsupported("create_playlist"))
    }

    async fn replace_playlist_tracks(
        &self,
        _playlist_id: &str,
        _track_ids: &[String],
    ) -> Result<(), AdapterError> {
        Err(AdapterError::unsupported("replace_playlist_tracks"))
    }

    async fn delete_playlist(&self, _playlist_id: &str) -> Result<(), AdapterError> {
        Err(AdapterError::unsupported("delete_playlist"))
    }

    async fn search_tracks(&self, title: &str, artist: &str) -> Result<Vec<Track>, AdapterError> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut stack: Vec<&Playlist> = self.playlists.iter().collect();
        while let Some(playlist) = stack.pop() {
            stack.extend(playlist.children.iter());
            for track in &playlist.tracks {
                if track.title.eq_ignore_ascii_case(title)
                    && track.artist.eq_ignore_ascii_case(artist)
                    && seen.insert(track.id.clone())
                {
                    found.push(track.clone());
                }
            }
        }
        Ok(found)
    }

    async fn get_liked_tracks(&self) -> Result<HashSet<String>, AdapterError> {
        Ok(HashSet::new())
    }

    async fn follow_artist(&self, _artist_id: &str) -> Result<(), AdapterError> {
        Err(AdapterError::unsupported("follow_artist"))
    }

    async fn get_followed_artists(&self) -> Result<Vec<Artist>, AdapterError> {
        Ok(Vec::new())
    }
}
