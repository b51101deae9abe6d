//! Text similarity between a source track and a target candidate.
//!
//! Title and artist are compared independently with normalized Levenshtein
//! distance (`1 - distance / max(len)`, 1.0 for two empty strings) and
//! averaged. Candidates the listener already liked on the target platform
//! receive a fixed bonus.

/// Bonus added when the candidate is in the target library's liked set.
pub const LIKED_BONUS: f64 = 0.4;

/// Scores above this are accepted regardless of liked state.
pub const ACCEPT_THRESHOLD: f64 = 0.75;

/// Liked candidates scoring above this are accepted.
pub const LIKED_ACCEPT_THRESHOLD: f64 = 0.35;

/// Similarity of two strings in `[0, 1]`, counted in characters.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Mean of title and artist similarity, before any liked bonus.
pub fn base_score(
    source_title: &str,
    source_artist: &str,
    candidate_title: &str,
    candidate_artist: &str,
) -> f64 {
    let title = text_similarity(source_title, candidate_title);
    let artist = text_similarity(source_artist, candidate_artist);
    (title + artist) / 2.0
}

/// Final score: base score plus the liked bonus, clamped to 1.0.
pub fn score(
    source_title: &str,
    source_artist: &str,
    candidate_title: &str,
    candidate_artist: &str,
    is_liked: bool,
) -> f64 {
    let base = base_score(source_title, source_artist, candidate_title, candidate_artist);
    if is_liked {
        (base + LIKED_BONUS).min(1.0)
    } else {
        base
    }
}

/// Acceptance rule applied to an already-bonused score. Both comparisons are strict.
pub fn is_accepted(score: f64, is_liked: bool) -> bool {
    score > ACCEPT_THRESHOLD || (is_liked && score > LIKED_ACCEPT_THRESHOLD)
}
