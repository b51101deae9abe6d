use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::naming::NamingRules;
use crate::models::Playlist;

/// A target playlist the source wants to exist, with its tracks in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredPlaylist {
    pub name: String,
    pub track_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedUpdate {
    pub playlist_id: String,
    pub name: String,
    pub track_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedDelete {
    pub playlist_id: String,
    pub name: String,
}

/// Mutations needed to bring the owned part of the target library in line
/// with the source. Recomputed on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncPlan {
    pub to_create: Vec<DesiredPlaylist>,
    pub to_update: Vec<PlannedUpdate>,
    pub to_delete: Vec<PlannedDelete>,
}

impl SyncPlan {
    /// Diff `desired` against `existing` target playlists.
    ///
    /// Only existing playlists that `naming` owns are ever scheduled for
    /// update or deletion. Desired playlists without tracks are left out, so
    /// an owned playlist of the same name gets deleted. Names in `held` could
    /// not be computed this run: their owned copies are left exactly as they
    /// are.
    pub fn build(
        desired: &[DesiredPlaylist],
        held: &HashSet<String>,
        existing: &[Playlist],
        naming: &NamingRules,
    ) -> Self {
        let mut owned: HashMap<&str, &Playlist> = HashMap::new();
        let mut duplicates: Vec<&Playlist> = Vec::new();
        for playlist in existing.iter().filter(|p| naming.owns(&p.name)) {
            if owned.contains_key(playlist.name.as_str()) {
                duplicates.push(playlist);
            } else {
                owned.insert(playlist.name.as_str(), playlist);
            }
        }

        let mut plan = SyncPlan::default();
        let mut wanted: HashSet<&str> = HashSet::new();

        for playlist in desired {
            if held.contains(&playlist.name) {
                continue;
            }
            if playlist.track_ids.is_empty() {
                log::info!("Skipping {} (no matched tracks)", playlist.name);
                continue;
            }
            if !naming.owns(&playlist.name) {
                log::warn!(
                    "Refusing to sync {}: name does not carry the prefix {:?}",
                    playlist.name,
                    naming.marker()
                );
                continue;
            }
            if !wanted.insert(playlist.name.as_str()) {
                continue;
            }

            match owned.get(playlist.name.as_str()) {
                Some(target) => plan.to_update.push(PlannedUpdate {
                    playlist_id: target.id.clone(),
                    name: playlist.name.clone(),
                    track_ids: playlist.track_ids.clone(),
                }),
                None => plan.to_create.push(playlist.clone()),
            }
        }

        for playlist in existing.iter().filter(|p| naming.owns(&p.name)) {
            if held.contains(&playlist.name) {
                log::info!("Leaving {} unchanged this run", playlist.name);
                continue;
            }
            let is_kept = wanted.contains(playlist.name.as_str())
                && owned
                    .get(playlist.name.as_str())
                    .is_some_and(|kept| kept.id == playlist.id);
            if !is_kept {
                plan.to_delete.push(PlannedDelete {
                    playlist_id: playlist.id.clone(),
                    name: playlist.name.clone(),
                });
            }
        }

        if !duplicates.is_empty() {
            log::info!(
                "{} duplicate owned playlists scheduled for deletion",
                duplicates.len()
            );
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::playlist;

    fn rules(prefix: &str, separator: &str) -> NamingRules {
        NamingRules::new(prefix, separator, vec![], vec![])
    }

    fn build(
        desired: &[DesiredPlaylist],
        existing: &[Playlist],
        naming: &NamingRules,
    ) -> SyncPlan {
        SyncPlan::build(desired, &HashSet::new(), existing, naming)
    }

    fn desired(name: &str, ids: &[&str]) -> DesiredPlaylist {
        DesiredPlaylist {
            name: name.to_string(),
            track_ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_create_update_delete() {
        let existing = vec![
            playlist("sp-a", "rb House", vec![]),
            playlist("sp-b", "rb Old", vec![]),
            playlist("sp-c", "Personal", vec![]),
        ];
        let plan = build(
            &[desired("rb House", &["1", "2"]), desired("rb Techno", &["3"])],
            &existing,
            &rules("rb", " "),
        );

        assert_eq!(plan.to_create, vec![desired("rb Techno", &["3"])]);
        assert_eq!(
            plan.to_update,
            vec![PlannedUpdate {
                playlist_id: "sp-a".into(),
                name: "rb House".into(),
                track_ids: vec!["1".into(), "2".into()],
            }]
        );
        assert_eq!(
            plan.to_delete,
            vec![PlannedDelete {
                playlist_id: "sp-b".into(),
                name: "rb Old".into(),
            }]
        );
    }

    #[test]
    fn test_unprefixed_playlists_are_never_touched() {
        let existing = vec![
            playlist("sp-1", "not-prefixed-but-similar", vec![]),
            playlist("sp-2", "similar", vec![]),
        ];
        // generated name collides with an unowned playlist once the prefix is stripped
        let plan = build(&[desired("rb-similar", &["1"])], &existing, &rules("rb", "-"));

        assert_eq!(plan.to_create, vec![desired("rb-similar", &["1"])]);
        assert!(plan.to_update.is_empty());
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn test_empty_desired_playlist_is_skipped_and_stale_copy_deleted() {
        let existing = vec![playlist("sp-a", "rb Empty", vec![])];
        let plan = build(
            &[desired("rb Empty", &[]), desired("rb New", &[])],
            &existing,
            &rules("rb", " "),
        );

        assert!(plan.to_create.is_empty());
        assert!(plan.to_update.is_empty());
        assert_eq!(plan.to_delete.len(), 1);
        assert_eq!(plan.to_delete[0].playlist_id, "sp-a");
    }

    #[test]
    fn test_duplicate_owned_playlists_keep_first() {
        let existing = vec![
            playlist("sp-a", "rb House", vec![]),
            playlist("sp-b", "rb House", vec![]),
        ];
        let plan = build(&[desired("rb House", &["1"])], &existing, &rules("rb", " "));

        assert_eq!(plan.to_update[0].playlist_id, "sp-a");
        assert_eq!(plan.to_delete.len(), 1);
        assert_eq!(plan.to_delete[0].playlist_id, "sp-b");
    }

    #[test]
    fn test_in_sync_library_still_replaces() {
        let existing = vec![playlist("sp-a", "rb House", vec![])];
        let plan = build(&[desired("rb House", &["1"])], &existing, &rules("rb", " "));
        assert!(!plan.is_empty());
        assert_eq!(plan.to_update.len(), 1);
    }

    #[test]
    fn test_held_playlists_are_neither_replaced_nor_deleted() {
        let existing = vec![
            playlist("sp-a", "rb House", vec![]),
            playlist("sp-b", "rb Techno", vec![]),
        ];
        let held = HashSet::from(["rb House".to_string(), "rb Disco".to_string()]);
        let plan = SyncPlan::build(
            &[desired("rb Techno", &["1"]), desired("rb Disco", &["2"])],
            &held,
            &existing,
            &rules("rb", " "),
        );

        assert!(plan.to_create.is_empty());
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].playlist_id, "sp-b");
        assert!(plan.to_delete.is_empty());
    }
}
