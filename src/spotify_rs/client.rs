use std::collections::HashSet;
use std::num::NonZeroU32;
use std::time::Duration;

use color_eyre::eyre::{OptionExt, Result, WrapErr};
use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed,
};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use url::Url;

use crate::models::{Artist, Playlist, Track};
use crate::ports::library::{AdapterError, LibraryCapability, MusicLibrary};
use crate::spotify_rs::types::{
    CreatePlaylistRequest, CreatedPlaylist, FollowedArtistsResponse, Page, PlaylistItem,
    SavedTrack, SearchResponse, SpotifyPlaylist, SpotifyUser, TrackUris,
};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Spotify accepts at most 100 tracks per add/replace call.
const TRACK_BATCH: usize = 100;
const SEARCH_LIMIT: &str = "10";
/// Stop following `next` links after this many pages.
const MAX_PAGES: usize = 100;

/// Spotify Web API client, used as the target library.
pub struct SpotifyClient {
    access_token: String,
    api_base: Url,
    client: reqwest::Client,
    rate_limiter: DirectRateLimiter,
    user_id: OnceCell<String>,
}

impl SpotifyClient {
    pub fn new(access_token: String, api_base: &str, requests_per_second: u32) -> Result<Self> {
        // trailing slash so relative joins keep the version segment
        let base = format!("{}/", api_base.trim_end_matches('/'));
        let api_base =
            Url::parse(&base).wrap_err_with(|| format!("Invalid API base {}", api_base))?;
        let per_second = NonZeroU32::new(requests_per_second)
            .ok_or_eyre("requests_per_second must be positive")?;

        Ok(Self {
            access_token,
            api_base,
            client: reqwest::Client::new(),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
            user_id: OnceCell::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AdapterError> {
        self.api_base
            .join(path)
            .map_err(|e| AdapterError::Decode(format!("invalid endpoint {path}: {e}")))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, AdapterError> {
        self.rate_limiter.until_ready().await;
        let response = request
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(AdapterError::RateLimited { retry_after });
        }
        Ok(response.error_for_status()?)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: impl reqwest::IntoUrl,
    ) -> Result<T, AdapterError> {
        let response = self.send(self.client.get(url)).await?;
        Ok(response.json().await?)
    }

    /// Follow `next` links from `first`, collecting every item.
    async fn get_all<T: DeserializeOwned>(&self, first: Url) -> Result<Vec<T>, AdapterError> {
        let mut items = Vec::new();
        let mut next_url = Some(first.to_string());
        let mut pages = 0;

        while let Some(url) = next_url {
            let page: Page<T> = self.get_json(url).await?;
            items.extend(page.items);
            next_url = page.next;
            pages += 1;
            if pages >= MAX_PAGES {
                log::warn!("Stopped paging after {} pages", MAX_PAGES);
                break;
            }
        }
        Ok(items)
    }

    async fn current_user_id(&self) -> Result<&str, AdapterError> {
        let id = self
            .user_id
            .get_or_try_init(|| async {
                let user: SpotifyUser = self.get_json(self.endpoint("me")?).await?;
                log::debug!(
                    "Authenticated as {} ({})",
                    user.display_name.as_deref().unwrap_or("unknown"),
                    user.id
                );
                Ok::<_, AdapterError>(user.id)
            })
            .await?;
        Ok(id.as_str())
    }

    async fn add_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<(), AdapterError> {
        let url = self.endpoint(&format!("playlists/{playlist_id}/tracks"))?;
        for batch in track_ids.chunks(TRACK_BATCH) {
            self.send(self.client.post(url.clone()).json(&TrackUris::from_ids(batch)))
                .await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl MusicLibrary for SpotifyClient {
    fn capability(&self) -> LibraryCapability {
        LibraryCapability::ReadWrite
    }

    /// Only playlists owned by the current user; followed playlists can't be mutated.
    async fn list_playlists(&self) -> Result<Vec<Playlist>, AdapterError> {
        let user_id = self.current_user_id().await?.to_string();
        let mut url = self.endpoint("me/playlists")?;
        url.query_pairs_mut().append_pair("limit", "50");

        let playlists: Vec<SpotifyPlaylist> = self.get_all(url).await?;
        Ok(playlists
            .into_iter()
            .filter(|p| p.owner.id == user_id)
            .map(Playlist::from)
            .collect())
    }

    async fn list_tracks_in_playlist(&self, playlist_id: &str) -> Result<Vec<Track>, AdapterError> {
        let mut url = self.endpoint(&format!("playlists/{playlist_id}/tracks"))?;
        url.query_pairs_mut().append_pair("limit", "100");

        let items: Vec<PlaylistItem> = self.get_all(url).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| item.track)
            .filter_map(|track| track.into_track())
            .collect())
    }

    async fn create_playlist(
        &self,
        name: &str,
        track_ids: &[String],
    ) -> Result<String, AdapterError> {
        let user_id = self.current_user_id().await?;
        let url = self.endpoint(&format!("users/{user_id}/playlists"))?;
        let body = CreatePlaylistRequest {
            name,
            public: false,
            description: "Synced by crate-mirror",
        };

        let created: CreatedPlaylist = self
            .send(self.client.post(url).json(&body))
            .await?
            .json()
            .await?;
        self.add_tracks(&created.id, track_ids).await?;
        Ok(created.id)
    }

    async fn replace_playlist_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<(), AdapterError> {
        let url = self.endpoint(&format!("playlists/{playlist_id}/tracks"))?;
        let (first, rest) = track_ids.split_at(track_ids.len().min(TRACK_BATCH));

        self.send(self.client.put(url).json(&TrackUris::from_ids(first)))
            .await?;
        self.add_tracks(playlist_id, rest).await
    }

    /// Spotify has no hard delete; unfollowing removes it from the library.
    async fn delete_playlist(&self, playlist_id: &str) -> Result<(), AdapterError> {
        let url = self.endpoint(&format!("playlists/{playlist_id}/followers"))?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn search_tracks(&self, title: &str, artist: &str) -> Result<Vec<Track>, AdapterError> {
        let mut url = self.endpoint("search")?;
        url.query_pairs_mut()
            .append_pair("q", &search_query(title, artist))
            .append_pair("type", "track")
            .append_pair("limit", SEARCH_LIMIT);

        let response: SearchResponse = self.get_json(url).await?;
        Ok(response
            .tracks
            .items
            .into_iter()
            .filter_map(|track| track.into_track())
            .collect())
    }

    async fn get_liked_tracks(&self) -> Result<HashSet<String>, AdapterError> {
        let mut url = self.endpoint("me/tracks")?;
        url.query_pairs_mut().append_pair("limit", "50");

        let saved: Vec<SavedTrack> = self.get_all(url).await?;
        Ok(saved.into_iter().filter_map(|s| s.track.id).collect())
    }

    async fn follow_artist(&self, artist_id: &str) -> Result<(), AdapterError> {
        let mut url = self.endpoint("me/following")?;
        url.query_pairs_mut()
            .append_pair("type", "artist")
            .append_pair("ids", artist_id);
        self.send(self.client.put(url)).await?;
        Ok(())
    }

    async fn get_followed_artists(&self) -> Result<Vec<Artist>, AdapterError> {
        let mut url = self.endpoint("me/following")?;
        url.query_pairs_mut()
            .append_pair("type", "artist")
            .append_pair("limit", "50");

        let mut artists = Vec::new();
        let mut next_url = Some(url.to_string());
        let mut pages = 0;
        while let Some(url) = next_url {
            let response: FollowedArtistsResponse = self.get_json(url).await?;
            artists.extend(response.artists.items.into_iter().map(Artist::from));
            next_url = response.artists.next;
            pages += 1;
            if pages >= MAX_PAGES {
                break;
            }
        }
        Ok(artists)
    }
}

fn search_query(title: &str, artist: &str) -> String {
    if artist.trim().is_empty() {
        format!("track:{title}")
    } else {
        format!("track:{title} artist:{artist}")
    }
}
