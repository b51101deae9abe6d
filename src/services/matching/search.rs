use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::OnceCell;

use crate::models::Candidate;
use crate::ports::library::{AdapterError, MusicLibrary};
use crate::retry::{RetryPolicy, with_backoff};

/// A search that kept failing after every retry. Callers treat it as
/// "no candidates this attempt" rather than aborting the run.
#[derive(Debug, Error)]
#[error("search for `{title}` by `{artist}` failed: {source}")]
pub struct RecoverableSearchFailure {
    pub title: String,
    pub artist: String,
    #[source]
    pub source: AdapterError,
}

/// Queries the target library for candidates and tags them with liked state.
pub struct CandidateSearch {
    target: Arc<dyn MusicLibrary>,
    retry: RetryPolicy,
    liked: OnceCell<HashSet<String>>,
    remote_calls: AtomicUsize,
}

impl CandidateSearch {
    pub fn new(target: Arc<dyn MusicLibrary>, retry: RetryPolicy) -> Self {
        Self {
            target,
            retry,
            liked: OnceCell::new(),
            remote_calls: AtomicUsize::new(0),
        }
    }

    /// Use an already-fetched liked set instead of asking the target library.
    pub fn with_liked(self, liked: HashSet<String>) -> Self {
        Self {
            liked: OnceCell::new_with(Some(liked)),
            ..self
        }
    }

    /// Number of search requests issued so far (retries included).
    pub fn remote_calls(&self) -> usize {
        self.remote_calls.load(Ordering::Relaxed)
    }

    async fn liked_tracks(&self) -> &HashSet<String> {
        self.liked
            .get_or_init(|| async {
                match with_backoff(&self.retry, "fetch liked tracks", || {
                    self.target.get_liked_tracks()
                })
                .await
                {
                    Ok(liked) => {
                        log::info!("Loaded {} liked tracks from target library", liked.len());
                        liked
                    }
                    Err(e) => {
                        log::warn!("Could not load liked tracks, no liked bonus this run: {}", e);
                        HashSet::new()
                    }
                }
            })
            .await
    }

    pub async fn search(
        &self,
        title: &str,
        artist: &str,
    ) -> Result<Vec<Candidate>, RecoverableSearchFailure> {
        let tracks = with_backoff(&self.retry, "search", || {
            self.remote_calls.fetch_add(1, Ordering::Relaxed);
            self.target.search_tracks(title, artist)
        })
        .await
        .map_err(|source| RecoverableSearchFailure {
            title: title.to_string(),
            artist: artist.to_string(),
            source,
        })?;

        let liked = self.liked_tracks().await;
        Ok(tracks
            .into_iter()
            .map(|track| Candidate {
                is_liked: liked.contains(&track.id),
                track,
            })
            .collect())
    }
}
