use crate::models::Playlist;

/// A source playlist selected for syncing, with its generated target name.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePlaylist {
    pub source_id: String,
    /// Ancestor names and own name joined with single spaces.
    pub full_name: String,
    pub target_name: String,
}

/// Turns a source playlist tree into prefixed target names and decides which
/// target playlists this tool owns.
#[derive(Debug, Clone)]
pub struct NamingRules {
    prefix: String,
    separator: String,
    ignore_playlists: Vec<String>,
    exclude_terms: Vec<String>,
}

impl NamingRules {
    pub fn new(
        prefix: impl Into<String>,
        separator: impl Into<String>,
        ignore_playlists: Vec<String>,
        exclude_terms: Vec<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            separator: separator.into(),
            ignore_playlists,
            exclude_terms: exclude_terms.into_iter().filter(|t| !t.is_empty()).collect(),
        }
    }

    /// Every owned target playlist name starts with this.
    pub fn marker(&self) -> String {
        format!("{}{}", self.prefix, self.separator)
    }

    pub fn owns(&self, target_playlist_name: &str) -> bool {
        target_playlist_name.starts_with(&self.marker())
    }

    pub fn target_name(&self, full_name: &str) -> String {
        format!("{}{}", self.marker(), self.clean_name(full_name))
    }

    fn clean_name(&self, name: &str) -> String {
        let mut cleaned = name.to_string();
        for term in &self.exclude_terms {
            cleaned = remove_ignore_case(&cleaned, term);
        }
        cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn is_excluded(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.exclude_terms
            .iter()
            .any(|term| lower.contains(&term.to_lowercase()))
    }

    /// Flatten the tree depth-first in source order.
    ///
    /// Folders (playlists with children) are descended into but not synced
    /// themselves. Ignored names drop the whole subtree; names containing an
    /// excluded term drop only that playlist.
    pub fn flatten(&self, playlists: &[Playlist]) -> Vec<SourcePlaylist> {
        let mut out = Vec::new();
        self.flatten_into(playlists, &[], &mut out);
        out
    }

    fn flatten_into(
        &self,
        playlists: &[Playlist],
        ancestors: &[&str],
        out: &mut Vec<SourcePlaylist>,
    ) {
        for playlist in playlists {
            if self.ignore_playlists.iter().any(|n| n == &playlist.name) {
                log::debug!("Ignoring playlist {}", playlist.name);
                continue;
            }

            let mut path = ancestors.to_vec();
            path.push(playlist.name.as_str());

            if !playlist.children.is_empty() {
                self.flatten_into(&playlist.children, &path, out);
                continue;
            }
            if self.is_excluded(&playlist.name) {
                log::debug!("Skipping playlist {} (excluded term)", playlist.name);
                continue;
            }

            let full_name = path.join(" ");
            out.push(SourcePlaylist {
                source_id: playlist.id.clone(),
                target_name: self.target_name(&full_name),
                full_name,
            });
        }
    }
}

fn remove_ignore_case(haystack: &str, needle: &str) -> String {
    let lower_haystack = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    // lowercasing can change byte lengths outside ASCII; fall back to exact matching there
    if lower_haystack.len() != haystack.len() || lower_needle.len() != needle.len() {
        return haystack.replace(needle, "");
    }

    let mut out = String::with_capacity(haystack.len());
    let mut rest = 0;
    for (start, _) in lower_haystack.match_indices(&lower_needle) {
        out.push_str(&haystack[rest..start]);
        rest = start + needle.len();
    }
    out.push_str(&haystack[rest..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{folder, playlist, track};

    fn rules() -> NamingRules {
        NamingRules::new("rb", " ", vec!["Ignored".into()], vec!["[WIP]".into()])
    }

    #[test]
    fn test_target_name_uses_marker() {
        let rules = rules();
        assert_eq!(rules.marker(), "rb ");
        assert_eq!(rules.target_name("Deep House"), "rb Deep House");
        assert!(rules.owns("rb Deep House"));
        assert!(!rules.owns("rbDeep House"));
        assert!(!rules.owns("Deep House"));
    }

    #[test]
    fn test_excluded_terms_removed_from_names() {
        let rules = NamingRules::new("rb", " ", vec![], vec!["(sync)".into()]);
        assert_eq!(rules.target_name("Techno (SYNC)  Peak"), "rb Techno Peak");
    }

    #[test]
    fn test_flatten_nested_tree() {
        let tree = vec![
            folder(
                "f1",
                "Genres",
                vec![
                    playlist("p1", "House", vec![track("t1", "A", "B")]),
                    folder("f2", "Techno", vec![playlist("p2", "Peak", vec![])]),
                ],
            ),
            playlist("p3", "Warmup", vec![]),
        ];

        let flat = rules().flatten(&tree);
        let names: Vec<_> = flat.iter().map(|p| p.target_name.as_str()).collect();

        assert_eq!(names, vec!["rb Genres House", "rb Genres Techno Peak", "rb Warmup"]);
        assert_eq!(flat[0].source_id, "p1");
        assert_eq!(flat[1].full_name, "Genres Techno Peak");
    }

    #[test]
    fn test_flatten_ignore_and_exclude() {
        let tree = vec![
            folder("f1", "Ignored", vec![playlist("p1", "Child", vec![])]),
            playlist("p2", "Set [WIP]", vec![]),
            folder("f2", "Gigs [WIP]", vec![playlist("p3", "Friday", vec![])]),
        ];

        let flat = rules().flatten(&tree);
        let names: Vec<_> = flat.iter().map(|p| p.target_name.as_str()).collect();

        assert_eq!(names, vec!["rb Gigs Friday"]);
    }
}
