use std::sync::LazyLock;

use regex::Regex;
use unaccent::unaccent;

/// Separators used inside multi-artist credits ("A, B & C").
static ARTIST_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s+|\s+&\s+").expect("artist separator regex is valid"));

/// Lowercase, strip diacritics and collapse whitespace.
pub fn clean_text(s: &str) -> String {
    unaccent(s)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a multi-artist credit into cleaned individual artist names.
pub fn split_artists(artist: &str) -> Vec<String> {
    ARTIST_SEPARATOR
        .split(artist)
        .map(clean_text)
        .filter(|a| !a.is_empty())
        .collect()
}

/// Cleaned form of a title/artist pair used for the second search phase.
///
/// Artist tokens are rejoined with single spaces so that queries and scoring
/// both see the same string regardless of the original separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedQuery {
    pub title: String,
    pub artist: String,
}

impl CleanedQuery {
    pub fn new(title: &str, artist: &str) -> Self {
        Self {
            title: clean_text(title),
            artist: split_artists(artist).join(" "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  Café   del  MAR "), "cafe del mar");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_split_artists() {
        assert_eq!(
            split_artists("Disclosure, Sam Smith & Jessie Ware"),
            vec!["disclosure", "sam smith", "jessie ware"]
        );
        assert_eq!(split_artists("Above & Beyond"), vec!["above", "beyond"]);
        assert_eq!(split_artists("Solo"), vec!["solo"]);
        assert!(split_artists("").is_empty());
    }

    #[test]
    fn test_cleaned_query_rejoins_artists() {
        let query = CleanedQuery::new("Latch ", "Disclosure, Sam Smith");
        assert_eq!(query.title, "latch");
        assert_eq!(query.artist, "disclosure sam smith");
    }
}
