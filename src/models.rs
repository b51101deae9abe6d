use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A track as seen by one library. Identity is `id` within its owning library;
/// tracks from different libraries are only related through a [`MatchDecision`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub key: Option<String>,
    /// Artist ids on the owning platform. Empty for libraries without artist entities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artist_ids: Vec<String>,
}

/// A playlist with its ordered tracks. Folders are playlists without tracks
/// that only carry `children`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children: Vec<Playlist>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
}

/// Persisted verdict linking one source track to at most one target track.
///
/// `target_track_id == None` is a confirmed non-match, not "never attempted".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDecision {
    #[serde(skip)]
    pub source_track_id: String,
    pub target_track_id: Option<String>,
    pub algorithm_version: String,
    pub confidence_score: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub manual_override: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_artist_ids: Vec<String>,
}

impl MatchDecision {
    pub fn matched(
        source_track_id: impl Into<String>,
        target: &Track,
        algorithm_version: &str,
        confidence_score: f64,
    ) -> Self {
        Self {
            source_track_id: source_track_id.into(),
            target_track_id: Some(target.id.clone()),
            algorithm_version: algorithm_version.to_string(),
            confidence_score,
            created_at: Utc::now(),
            manual_override: false,
            target_artist_ids: target.artist_ids.clone(),
        }
    }

    pub fn unmatched(
        source_track_id: impl Into<String>,
        algorithm_version: &str,
        confidence_score: f64,
    ) -> Self {
        Self {
            source_track_id: source_track_id.into(),
            target_track_id: None,
            algorithm_version: algorithm_version.to_string(),
            confidence_score,
            created_at: Utc::now(),
            manual_override: false,
            target_artist_ids: Vec::new(),
        }
    }

    pub fn with_manual_override(mut self) -> Self {
        self.manual_override = true;
        self
    }

    pub fn is_match(&self) -> bool {
        self.target_track_id.is_some()
    }
}

/// A search hit on the target library, annotated with the user's liked state.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub track: Track,
    pub is_liked: bool,
}

/// A successfully resolved source track.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedTrack {
    pub source_track_id: String,
    pub target_track_id: String,
    pub target_artist_ids: Vec<String>,
}

impl MatchedTrack {
    pub fn from_decision(decision: &MatchDecision) -> Option<Self> {
        decision
            .target_track_id
            .as_ref()
            .map(|target_track_id| MatchedTrack {
                source_track_id: decision.source_track_id.clone(),
                target_track_id: target_track_id.clone(),
                target_artist_ids: decision.target_artist_ids.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_serializes_without_source_id() {
        let target = Track {
            id: "sp1".into(),
            title: "Song".into(),
            artist: "Artist".into(),
            duration_ms: None,
            key: None,
            artist_ids: vec!["a1".into()],
        };
        let decision = MatchDecision::matched("rb1", &target, "v1", 0.9);
        let json = serde_json::to_value(&decision).unwrap();

        assert!(json.get("source_track_id").is_none());
        assert_eq!(json["target_track_id"], "sp1");
        assert_eq!(json["target_artist_ids"][0], "a1");
    }

    #[test]
    fn test_unmatched_decision_has_no_matched_track() {
        let decision = MatchDecision::unmatched("rb1", "v1", 0.2).with_manual_override();
        assert!(decision.manual_override);
        assert!(!decision.is_match());
        assert!(MatchedTrack::from_decision(&decision).is_none());
    }
}
