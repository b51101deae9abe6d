use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use serde::Serialize;

use crate::models::MatchedTrack;
use crate::ports::library::MusicLibrary;
use crate::retry::{RetryPolicy, with_backoff};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FollowReport {
    /// Distinct target artists seen across matched tracks.
    pub artists_analyzed: usize,
    /// Artists at or above the threshold.
    pub candidates: usize,
    pub already_followed: usize,
    pub newly_followed: usize,
    /// Artist ids whose follow call failed.
    pub failed: Vec<String>,
}

/// Number of distinct matched target tracks per target artist id.
pub fn tally_artists(matched: &[MatchedTrack]) -> HashMap<String, usize> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut tally: HashMap<String, usize> = HashMap::new();
    for track in matched {
        if !seen.insert(track.target_track_id.as_str()) {
            continue;
        }
        let artists: HashSet<&String> = track.target_artist_ids.iter().collect();
        for artist_id in artists {
            *tally.entry(artist_id.clone()).or_default() += 1;
        }
    }
    tally
}

/// Follows target artists that show up often enough in the synced playlists.
pub struct ArtistFollowPolicy {
    target: Arc<dyn MusicLibrary>,
    threshold: usize,
    retry: RetryPolicy,
}

impl ArtistFollowPolicy {
    pub fn new(target: Arc<dyn MusicLibrary>, threshold: usize, retry: RetryPolicy) -> Self {
        Self {
            target,
            threshold,
            retry,
        }
    }

    pub async fn apply(&self, matched: &[MatchedTrack], dry_run: bool) -> Result<FollowReport> {
        let tally = tally_artists(matched);
        let mut candidates: Vec<(&String, usize)> = tally
            .iter()
            .filter(|(_, count)| **count >= self.threshold)
            .map(|(id, count)| (id, *count))
            .collect();
        // most frequent first, id as tie-breaker for a stable order
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let followed: HashSet<String> = with_backoff(&self.retry, "fetch followed artists", || {
            self.target.get_followed_artists()
        })
        .await
        .wrap_err("Failed to fetch followed artists")?
        .into_iter()
        .map(|artist| artist.id)
        .collect();

        let mut report = FollowReport {
            artists_analyzed: tally.len(),
            candidates: candidates.len(),
            ..Default::default()
        };

        for (artist_id, count) in candidates {
            if followed.contains(artist_id) {
                report.already_followed += 1;
                continue;
            }
            if dry_run {
                log::info!("Would follow artist {} ({} tracks)", artist_id, count);
                report.newly_followed += 1;
                continue;
            }

            match with_backoff(&self.retry, "follow artist", || {
                self.target.follow_artist(artist_id)
            })
            .await
            {
                Ok(()) => {
                    log::info!("Followed artist {} ({} tracks)", artist_id, count);
                    report.newly_followed += 1;
                }
                Err(e) => {
                    log::error!("Failed to follow artist {}: {}", artist_id, e);
                    report.failed.push(artist_id.clone());
                }
            }
        }

        Ok(report)
    }
}
