use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::services::follow::FollowReport;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaylistFailure {
    pub name: String,
    pub track_count: usize,
    pub message: String,
}

/// Summary of one sync run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub dry_run: bool,
    pub tracks_matched: usize,
    pub tracks_unmatched: usize,
    /// Tracks whose search or prompt failed; retried on the next run.
    pub tracks_deferred: usize,
    pub cache_hits: usize,
    pub remote_searches: usize,
    pub playlists_created: usize,
    pub playlists_updated: usize,
    pub playlists_deleted: usize,
    pub playlists_skipped_empty: usize,
    pub failures: Vec<PlaylistFailure>,
    pub follow: Option<FollowReport>,
    #[serde(serialize_with = "serialize_elapsed")]
    pub elapsed: Duration,
}

fn serialize_elapsed<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(elapsed.as_millis() as u64)
}

impl SyncReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = |done: &'static str, planned: &'static str| {
            if self.dry_run { planned } else { done }
        };

        if self.dry_run {
            writeln!(f, "Dry run: no changes were made to the target library")?;
        }
        writeln!(
            f,
            "Tracks: {} matched, {} unmatched, {} undecided ({} from cache, {} searches)",
            self.tracks_matched,
            self.tracks_unmatched,
            self.tracks_deferred,
            self.cache_hits,
            self.remote_searches
        )?;
        writeln!(
            f,
            "Playlists: {} {}, {} {}, {} {}, {} skipped (empty)",
            self.playlists_created,
            verb("created", "to create"),
            self.playlists_updated,
            verb("updated", "to update"),
            self.playlists_deleted,
            verb("deleted", "to delete"),
            self.playlists_skipped_empty
        )?;
        if let Some(follow) = &self.follow {
            writeln!(
                f,
                "Artists: {} analyzed, {} over threshold, {} already followed, {} {}",
                follow.artists_analyzed,
                follow.candidates,
                follow.already_followed,
                follow.newly_followed,
                verb("newly followed", "to follow")
            )?;
            if !follow.failed.is_empty() {
                writeln!(f, "  {} follow calls failed", follow.failed.len())?;
            }
        }
        for failure in &self.failures {
            writeln!(
                f,
                "  failed: {} ({} tracks): {}",
                failure.name, failure.track_count, failure.message
            )?;
        }
        write!(
            f,
            "Elapsed: {}",
            humantime::format_duration(Duration::from_secs(self.elapsed.as_secs()))
        )
    }
}
