use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::models::{Artist, Playlist, Track};
use crate::ports::library::{AdapterError, LibraryCapability, MusicLibrary};
use crate::retry::RetryPolicy;

pub fn track(id: &str, title: &str, artist: &str) -> Track {
    Track {
        id: id.to_string(),
        title: title.to_string(),
        artist: artist.to_string(),
        duration_ms: None,
        key: None,
        artist_ids: vec![artist.to_lowercase().replace(' ', "-")],
    }
}

pub fn playlist(id: &str, name: &str, tracks: Vec<Track>) -> Playlist {
    Playlist {
        id: id.to_string(),
        name: name.to_string(),
        tracks,
        parent_id: None,
        children: Vec::new(),
    }
}

pub fn folder(id: &str, name: &str, children: Vec<Playlist>) -> Playlist {
    Playlist {
        id: id.to_string(),
        name: name.to_string(),
        tracks: Vec::new(),
        parent_id: None,
        children: children
            .into_iter()
            .map(|mut child| {
                child.parent_id = Some(id.to_string());
                child
            })
            .collect(),
    }
}

/// Three attempts, millisecond delays.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        min_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LibraryCall {
    ListPlaylists,
    ListTracks { playlist_id: String },
    Search { title: String, artist: String },
    Liked,
    FollowedArtists,
    Create { name: String },
    Replace { playlist_id: String },
    Delete { playlist_id: String },
    Follow { artist_id: String },
}

impl LibraryCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            LibraryCall::Create { .. }
                | LibraryCall::Replace { .. }
                | LibraryCall::Delete { .. }
                | LibraryCall::Follow { .. }
        )
    }
}

#[derive(Default)]
struct FakeState {
    playlists: Vec<Playlist>,
    followed: Vec<String>,
    next_id: usize,
    calls: Vec<LibraryCall>,
}

/// In-memory library that records every call it receives.
pub struct FakeLibrary {
    capability: LibraryCapability,
    search_results: HashMap<(String, String), Vec<Track>>,
    liked: HashSet<String>,
    failing_creates: HashSet<String>,
    unreadable: HashSet<String>,
    search_down: AtomicBool,
    replace_failures: AtomicUsize,
    state: Mutex<FakeState>,
}

impl FakeLibrary {
    /// Empty read-write library.
    pub fn new() -> Self {
        Self {
            capability: LibraryCapability::ReadWrite,
            search_results: HashMap::new(),
            liked: HashSet::new(),
            failing_creates: HashSet::new(),
            unreadable: HashSet::new(),
            search_down: AtomicBool::new(false),
            replace_failures: AtomicUsize::new(0),
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Read-only library holding `playlists`.
    pub fn source(playlists: Vec<Playlist>) -> Self {
        let fake = Self {
            capability: LibraryCapability::SourceOnly,
            ..Self::new()
        };
        fake.state.lock().unwrap().playlists = playlists;
        fake
    }

    pub fn with_search_result(mut self, title: &str, artist: &str, tracks: Vec<Track>) -> Self {
        self.search_results
            .insert((title.to_string(), artist.to_string()), tracks);
        self
    }

    pub fn with_liked<'a>(mut self, ids: impl IntoIterator<Item = &'a str>) -> Self {
        self.liked.extend(ids.into_iter().map(str::to_string));
        self
    }

    pub fn with_playlist(self, playlist: Playlist) -> Self {
        self.state.lock().unwrap().playlists.push(playlist);
        self
    }

    /// Creating a playlist with this name fails with a non-transient error.
    pub fn failing_create(mut self, name: &str) -> Self {
        self.failing_creates.insert(name.to_string());
        self
    }

    /// Reading this playlist's tracks always times out.
    pub fn unreadable(mut self, playlist_id: &str) -> Self {
        self.unreadable.insert(playlist_id.to_string());
        self
    }

    /// The next `times` replace calls fail transiently.
    pub fn flaky_replace(self, times: usize) -> Self {
        self.replace_failures.store(times, Ordering::SeqCst);
        self
    }

    /// While down, every search is rate limited.
    pub fn set_search_down(&self, down: bool) {
        self.search_down.store(down, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<LibraryCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn playlist_named(&self, name: &str) -> Option<Playlist> {
        self.state
            .lock()
            .unwrap()
            .playlists
            .iter()
            .find(|p| p.name == name)
            .cloned()
    }

    pub fn followed_artists(&self) -> Vec<String> {
        self.state.lock().unwrap().followed.clone()
    }

    fn record(&self, call: LibraryCall) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn writable(&self, operation: &'static str) -> Result<(), AdapterError> {
        match self.capability {
            LibraryCapability::ReadWrite => Ok(()),
            LibraryCapability::SourceOnly => Err(AdapterError::unsupported(operation)),
        }
    }

    fn resolve_tracks(&self, ids: &[String]) -> Vec<Track> {
        let known: HashMap<&str, &Track> = self
            .search_results
            .values()
            .flatten()
            .map(|t| (t.id.as_str(), t))
            .collect();
        ids.iter()
            .map(|id| match known.get(id.as_str()) {
                Some(track) => (*track).clone(),
                None => track(id, "", ""),
            })
            .collect()
    }
}

fn find_playlist<'a>(playlists: &'a [Playlist], id: &str) -> Option<&'a Playlist> {
    playlists.iter().find_map(|p| {
        if p.id == id {
            Some(p)
        } else {
            find_playlist(&p.children, id)
        }
    })
}

#[async_trait::async_trait]
impl MusicLibrary for FakeLibrary {
    fn capability(&self) -> LibraryCapability {
        self.capability
    }

    async fn list_playlists(&self) -> Result<Vec<Playlist>, AdapterError> {
        self.record(LibraryCall::ListPlaylists);
        Ok(self.state.lock().unwrap().playlists.clone())
    }

    async fn list_tracks_in_playlist(&self, playlist_id: &str) -> Result<Vec<Track>, AdapterError> {
        self.record(LibraryCall::ListTracks {
            playlist_id: playlist_id.to_string(),
        });
        if self.unreadable.contains(playlist_id) {
            return Err(AdapterError::Transient("timeout".into()));
        }
        let state = self.state.lock().unwrap();
        find_playlist(&state.playlists, playlist_id)
            .map(|p| p.tracks.clone())
            .ok_or_else(|| AdapterError::Remote {
                status: 404,
                message: format!("no playlist {playlist_id}"),
            })
    }

    async fn create_playlist(
        &self,
        name: &str,
        track_ids: &[String],
    ) -> Result<String, AdapterError> {
        self.writable("create_playlist")?;
        self.record(LibraryCall::Create {
            name: name.to_string(),
        });
        if self.failing_creates.contains(name) {
            return Err(AdapterError::Remote {
                status: 400,
                message: "rejected".into(),
            });
        }
        let tracks = self.resolve_tracks(track_ids);
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("created-{}", state.next_id);
        state.playlists.push(playlist(&id, name, tracks));
        Ok(id)
    }

    async fn replace_playlist_tracks(
        &self,
        playlist_id: &str,
        track_ids: &[String],
    ) -> Result<(), AdapterError> {
        self.writable("replace_playlist_tracks")?;
        self.record(LibraryCall::Replace {
            playlist_id: playlist_id.to_string(),
        });
        let failing = self
            .replace_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AdapterError::Transient("connection reset".into()));
        }
        let tracks = self.resolve_tracks(track_ids);
        let mut state = self.state.lock().unwrap();
        match state.playlists.iter_mut().find(|p| p.id == playlist_id) {
            Some(p) => {
                p.tracks = tracks;
                Ok(())
            }
            None => Err(AdapterError::Remote {
                status: 404,
                message: format!("no playlist {playlist_id}"),
            }),
        }
    }

    async fn delete_playlist(&self, playlist_id: &str) -> Result<(), AdapterError> {
        self.writable("delete_playlist")?;
        self.record(LibraryCall::Delete {
            playlist_id: playlist_id.to_string(),
        });
        self.state
            .lock()
            .unwrap()
            .playlists
            .retain(|p| p.id != playlist_id);
        Ok(())
    }

    async fn search_tracks(&self, title: &str, artist: &str) -> Result<Vec<Track>, AdapterError> {
        self.record(LibraryCall::Search {
            title: title.to_string(),
            artist: artist.to_string(),
        });
        if self.search_down.load(Ordering::SeqCst) {
            return Err(AdapterError::RateLimited { retry_after: None });
        }
        Ok(self
            .search_results
            .get(&(title.to_string(), artist.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_liked_tracks(&self) -> Result<HashSet<String>, AdapterError> {
        self.record(LibraryCall::Liked);
        Ok(self.liked.clone())
    }

    async fn follow_artist(&self, artist_id: &str) -> Result<(), AdapterError> {
        self.writable("follow_artist")?;
        self.record(LibraryCall::Follow {
            artist_id: artist_id.to_string(),
        });
        self.state.lock().unwrap().followed.push(artist_id.to_string());
        Ok(())
    }

    async fn get_followed_artists(&self) -> Result<Vec<Artist>, AdapterError> {
        self.record(LibraryCall::FollowedArtists);
        Ok(self
            .state
            .lock()
            .unwrap()
            .followed
            .iter()
            .map(|id| Artist {
                id: id.clone(),
                name: id.clone(),
            })
            .collect())
    }
}
