use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use color_eyre::eyre::{Result, WrapErr};

use super::naming::{NamingRules, SourcePlaylist};
use super::plan::{DesiredPlaylist, SyncPlan};
use super::report::{PlaylistFailure, SyncReport};
use crate::models::{MatchedTrack, Track};
use crate::ports::library::{AdapterError, MusicLibrary};
use crate::retry::{RetryPolicy, with_backoff};
use crate::services::follow::ArtistFollowPolicy;
use crate::services::matching::{DecisionOrigin, MatchOutcome, MatchingEngine};

/// Mirrors the source library's playlists into the prefixed part of the
/// target library.
pub struct SyncEngine {
    source: Arc<dyn MusicLibrary>,
    target: Arc<dyn MusicLibrary>,
    naming: NamingRules,
    retry: RetryPolicy,
    dry_run: bool,
}

struct SelectedPlaylist {
    playlist: SourcePlaylist,
    tracks: Vec<Track>,
}

/// Source playlists that could be read, plus the target names of those that
/// could not.
struct LoadedSource {
    selected: Vec<SelectedPlaylist>,
    unreadable: HashSet<String>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn MusicLibrary>,
        target: Arc<dyn MusicLibrary>,
        naming: NamingRules,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            target,
            naming,
            retry,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn run(
        &self,
        matcher: &MatchingEngine,
        follow: Option<&ArtistFollowPolicy>,
    ) -> Result<SyncReport> {
        let started = Instant::now();
        let mut report = SyncReport {
            dry_run: self.dry_run,
            ..Default::default()
        };

        let LoadedSource {
            selected,
            unreadable: mut held,
        } = self.load_source(&mut report).await?;

        let unique_tracks = unique_tracks(&selected);
        log::info!(
            "Matching {} tracks from {} playlists",
            unique_tracks.len(),
            selected.len()
        );
        let decided = matcher.match_tracks(&unique_tracks).await?;
        let outcomes: HashMap<&str, &MatchOutcome> = unique_tracks
            .iter()
            .map(|t| t.id.as_str())
            .zip(decided.iter())
            .collect();

        for outcome in outcomes.values() {
            if outcome.is_deferred() {
                report.tracks_deferred += 1;
            } else if outcome.is_match() {
                report.tracks_matched += 1;
            } else {
                report.tracks_unmatched += 1;
            }
            if outcome.origin == DecisionOrigin::Cached {
                report.cache_hits += 1;
            }
        }
        report.remote_searches = matcher.remote_calls();

        let mut matched_tracks: Vec<MatchedTrack> = Vec::new();
        let mut desired: Vec<DesiredPlaylist> = Vec::with_capacity(selected.len());
        for entry in &selected {
            let deferred = entry
                .tracks
                .iter()
                .filter(|t| outcomes.get(t.id.as_str()).is_some_and(|o| o.is_deferred()))
                .count();
            if deferred > 0 {
                log::warn!(
                    "{}: {} tracks could not be matched this run, leaving it unchanged",
                    entry.playlist.target_name,
                    deferred
                );
                report.failures.push(PlaylistFailure {
                    name: entry.playlist.target_name.clone(),
                    track_count: entry.tracks.len(),
                    message: format!("{deferred} tracks could not be matched this run"),
                });
                held.insert(entry.playlist.target_name.clone());
                continue;
            }

            let matched: Vec<MatchedTrack> = entry
                .tracks
                .iter()
                .filter_map(|t| outcomes.get(t.id.as_str()))
                .filter_map(|o| MatchedTrack::from_decision(&o.decision))
                .collect();
            log::debug!(
                "{}: {}/{} tracks matched",
                entry.playlist.target_name,
                matched.len(),
                entry.tracks.len()
            );
            if matched.is_empty() {
                report.playlists_skipped_empty += 1;
            }
            desired.push(DesiredPlaylist {
                name: entry.playlist.target_name.clone(),
                track_ids: matched.iter().map(|m| m.target_track_id.clone()).collect(),
            });
            matched_tracks.extend(matched);
        }

        let existing = with_backoff(&self.retry, "list target playlists", || {
            self.target.list_playlists()
        })
        .await
        .wrap_err("Failed to list target playlists")?;

        let plan = SyncPlan::build(&desired, &held, &existing, &self.naming);
        if plan.is_empty() {
            log::info!("Nothing to sync");
        }
        self.apply(&plan, &mut report).await;

        if let Some(policy) = follow {
            match policy.apply(&matched_tracks, self.dry_run).await {
                Ok(follow_report) => report.follow = Some(follow_report),
                Err(e) => log::error!("Artist follow step failed: {:?}", e),
            }
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// List, flatten and fetch tracks for every selected source playlist.
    async fn load_source(&self, report: &mut SyncReport) -> Result<LoadedSource> {
        let tree = with_backoff(&self.retry, "list source playlists", || {
            self.source.list_playlists()
        })
        .await
        .wrap_err("Failed to list source playlists")?;

        let mut names: HashSet<String> = HashSet::new();
        let mut selected = Vec::new();
        let mut unreadable = HashSet::new();
        for playlist in self.naming.flatten(&tree) {
            if !names.insert(playlist.target_name.clone()) {
                log::warn!(
                    "{} ({}) generates the same name as an earlier playlist, skipping",
                    playlist.full_name,
                    playlist.target_name
                );
                report.failures.push(PlaylistFailure {
                    name: playlist.target_name.clone(),
                    track_count: 0,
                    message: format!("duplicate name generated by `{}`", playlist.full_name),
                });
                continue;
            }

            let source_id = playlist.source_id.clone();
            match with_backoff(&self.retry, "list source tracks", || {
                self.source.list_tracks_in_playlist(&source_id)
            })
            .await
            {
                Ok(tracks) => selected.push(SelectedPlaylist { playlist, tracks }),
                Err(e) => {
                    log::error!("Failed to read tracks of {}: {}", playlist.full_name, e);
                    report.failures.push(PlaylistFailure {
                        name: playlist.target_name.clone(),
                        track_count: 0,
                        message: e.to_string(),
                    });
                    unreadable.insert(playlist.target_name);
                }
            }
        }
        Ok(LoadedSource {
            selected,
            unreadable,
        })
    }

    /// Create the playlist empty, then upload its tracks. The two calls are
    /// retried separately, so a failed upload never creates a second playlist.
    async fn create_with_tracks(&self, playlist: &DesiredPlaylist) -> Result<String, AdapterError> {
        let id = with_backoff(&self.retry, "create playlist", || {
            self.target.create_playlist(&playlist.name, &[])
        })
        .await?;
        with_backoff(&self.retry, "upload playlist tracks", || {
            self.target.replace_playlist_tracks(&id, &playlist.track_ids)
        })
        .await?;
        Ok(id)
    }

    /// Creates and replaces first, deletes last. One failing playlist never
    /// stops the rest.
    async fn apply(&self, plan: &SyncPlan, report: &mut SyncReport) {
        if self.dry_run {
            for playlist in &plan.to_create {
                log::info!(
                    "Would create {} ({} tracks)",
                    playlist.name,
                    playlist.track_ids.len()
                );
            }
            for playlist in &plan.to_update {
                log::info!(
                    "Would replace {} ({} tracks)",
                    playlist.name,
                    playlist.track_ids.len()
                );
            }
            for playlist in &plan.to_delete {
                log::info!("Would delete {}", playlist.name);
            }
            report.playlists_created = plan.to_create.len();
            report.playlists_updated = plan.to_update.len();
            report.playlists_deleted = plan.to_delete.len();
            return;
        }

        for playlist in &plan.to_create {
            match self.create_with_tracks(playlist).await {
                Ok(id) => {
                    log::info!(
                        "Created {} ({} tracks) as {}",
                        playlist.name,
                        playlist.track_ids.len(),
                        id
                    );
                    report.playlists_created += 1;
                }
                Err(e) => {
                    log::error!(
                        "Failed to create {} ({} tracks): {}",
                        playlist.name,
                        playlist.track_ids.len(),
                        e
                    );
                    report.failures.push(PlaylistFailure {
                        name: playlist.name.clone(),
                        track_count: playlist.track_ids.len(),
                        message: e.to_string(),
                    });
                }
            }
        }

        for playlist in &plan.to_update {
            let result = with_backoff(&self.retry, "replace playlist tracks", || {
                self.target
                    .replace_playlist_tracks(&playlist.playlist_id, &playlist.track_ids)
            })
            .await;
            match result {
                Ok(()) => {
                    log::info!("Replaced {} ({} tracks)", playlist.name, playlist.track_ids.len());
                    report.playlists_updated += 1;
                }
                Err(e) => {
                    log::error!(
                        "Failed to replace {} ({} tracks): {}",
                        playlist.name,
                        playlist.track_ids.len(),
                        e
                    );
                    report.failures.push(PlaylistFailure {
                        name: playlist.name.clone(),
                        track_count: playlist.track_ids.len(),
                        message: e.to_string(),
                    });
                }
            }
        }

        for playlist in &plan.to_delete {
            let result = with_backoff(&self.retry, "delete playlist", || {
                self.target.delete_playlist(&playlist.playlist_id)
            })
            .await;
            match result {
                Ok(()) => {
                    log::info!("Deleted {}", playlist.name);
                    report.playlists_deleted += 1;
                }
                Err(e) => {
                    log::error!("Failed to delete {}: {}", playlist.name, e);
                    report.failures.push(PlaylistFailure {
                        name: playlist.name.clone(),
                        track_count: 0,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Every distinct source track in first-seen order.
fn unique_tracks(selected: &[SelectedPlaylist]) -> Vec<Track> {
    let mut seen: HashSet<&str> = HashSet::new();
    selected
        .iter()
        .flat_map(|entry| entry.tracks.iter())
        .filter(|track| seen.insert(track.id.as_str()))
        .cloned()
        .collect()
}
