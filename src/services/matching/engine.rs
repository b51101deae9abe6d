use std::collections::HashMap;
use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use futures::{StreamExt, TryStreamExt};

use super::cache::{CacheWriter, MappingCache, RemapScope};
use super::query::{CleanedQuery, clean_text, split_artists};
use super::resolver::{InteractiveResolver, Resolution, ResolutionRequest};
use super::search::CandidateSearch;
use super::similarity::{self, ACCEPT_THRESHOLD};
use crate::models::{Candidate, MatchDecision, Track};

/// Tag written into every decision produced by this matcher.
pub const ALGORITHM_VERSION: &str = "levenshtein-v1";

#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub remap: RemapScope,
    pub interactive: bool,
    /// Tracks matched in parallel.
    pub concurrency: usize,
    /// Candidates offered in an interactive prompt.
    pub max_candidates_shown: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            remap: RemapScope::None,
            interactive: false,
            concurrency: 4,
            max_candidates_shown: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOrigin {
    Cached,
    Automatic,
    Interactive,
    /// Left undecided this run (search outage or failed prompt); not cached.
    Deferred,
}

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub decision: MatchDecision,
    pub origin: DecisionOrigin,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        self.decision.is_match()
    }

    pub fn is_deferred(&self) -> bool {
        self.origin == DecisionOrigin::Deferred
    }

    fn deferred(source: &Track, best_score: f64) -> Self {
        Self {
            decision: MatchDecision::unmatched(&source.id, ALGORITHM_VERSION, best_score),
            origin: DecisionOrigin::Deferred,
        }
    }
}

#[derive(Debug, Clone)]
struct ScoredCandidate {
    candidate: Candidate,
    score: f64,
}

/// Merged candidates of every search phase, best first.
struct Ranked {
    candidates: Vec<ScoredCandidate>,
    /// False when any phase gave up after exhausting its retries.
    complete: bool,
}

/// Resolves source tracks to target tracks: cache first, then progressive
/// search phases, then the optional human fallback.
pub struct MatchingEngine {
    search: CandidateSearch,
    cache: CacheWriter,
    resolver: Option<Arc<dyn InteractiveResolver>>,
    options: MatchOptions,
}

impl MatchingEngine {
    pub fn new(
        search: CandidateSearch,
        cache: MappingCache,
        save_every: usize,
        options: MatchOptions,
    ) -> Self {
        Self {
            search,
            cache: CacheWriter::new(cache, save_every),
            resolver: None,
            options,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn InteractiveResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn remote_calls(&self) -> usize {
        self.search.remote_calls()
    }

    /// Hand the cache back to the caller once matching is over.
    pub fn into_cache(self) -> MappingCache {
        self.cache.into_inner()
    }

    /// Match `tracks` with bounded parallelism, returning outcomes in input order.
    pub async fn match_tracks(&self, tracks: &[Track]) -> Result<Vec<MatchOutcome>> {
        let total = tracks.len();
        let outcomes = futures::stream::iter(tracks.iter().enumerate())
            .map(|(i, track)| async move {
                let outcome = self.match_track(track).await;
                if (i + 1) % 50 == 0 {
                    log::info!("Matched {}/{} tracks", i + 1, total);
                }
                outcome
            })
            .buffered(self.options.concurrency.max(1))
            .try_collect::<Vec<_>>()
            .await?;

        self.cache
            .flush()
            .await
            .wrap_err("Failed to save mapping cache")?;
        Ok(outcomes)
    }

    pub async fn match_track(&self, source: &Track) -> Result<MatchOutcome> {
        if let Some(decision) = self.cache.reusable(&source.id, &self.options.remap).await {
            log::trace!("Cache hit for {}", source.id);
            return Ok(MatchOutcome {
                decision,
                origin: DecisionOrigin::Cached,
            });
        }

        let ranked = self.ranked_candidates(source).await;
        let best = ranked.candidates.first();
        let best_score = best.map(|b| b.score).unwrap_or(0.0);

        let outcome = match best {
            Some(best) if similarity::is_accepted(best.score, best.candidate.is_liked) => {
                log::debug!(
                    "Matched {} - {} to {} ({:.2})",
                    source.artist,
                    source.title,
                    best.candidate.track.id,
                    best.score
                );
                MatchOutcome {
                    decision: MatchDecision::matched(
                        &source.id,
                        &best.candidate.track,
                        ALGORITHM_VERSION,
                        best.score,
                    ),
                    origin: DecisionOrigin::Automatic,
                }
            }
            _ if !ranked.complete => {
                log::warn!(
                    "Search for {} - {} did not complete, leaving it undecided",
                    source.artist,
                    source.title
                );
                return Ok(MatchOutcome::deferred(source, best_score));
            }
            _ => match (&self.resolver, self.options.interactive) {
                (Some(resolver), true) => {
                    let shown = &ranked.candidates;
                    match self.resolve_interactively(resolver.as_ref(), source, shown).await {
                        Some(outcome) => outcome,
                        // leave uncached so the next run asks again
                        None => return Ok(MatchOutcome::deferred(source, best_score)),
                    }
                }
                _ => {
                    log::debug!(
                        "No match for {} - {} (best {:.2})",
                        source.artist,
                        source.title,
                        best_score
                    );
                    MatchOutcome {
                        decision: MatchDecision::unmatched(
                            &source.id,
                            ALGORITHM_VERSION,
                            best_score,
                        ),
                        origin: DecisionOrigin::Automatic,
                    }
                }
            },
        };

        self.cache
            .record(outcome.decision.clone())
            .await
            .wrap_err("Failed to save mapping cache")?;
        Ok(outcome)
    }

    /// Phase 1 (raw), Phase 2 (cleaned, only when Phase 1 is not convincing),
    /// Phase 3 (merge). Best first; ties keep discovery order.
    async fn ranked_candidates(&self, source: &Track) -> Ranked {
        let mut complete = true;
        let raw = self
            .search_phase(&source.title, &source.artist, &mut complete)
            .await
            .into_iter()
            .map(|candidate| ScoredCandidate {
                score: similarity::score(
                    &source.title,
                    &source.artist,
                    &candidate.track.title,
                    &candidate.track.artist,
                    candidate.is_liked,
                ),
                candidate,
            })
            .collect::<Vec<_>>();

        let raw_best = raw.iter().map(|c| c.score).fold(0.0, f64::max);
        let mut merged = raw;

        if raw_best < ACCEPT_THRESHOLD {
            let cleaned = CleanedQuery::new(&source.title, &source.artist);
            if cleaned.title != source.title || cleaned.artist != source.artist {
                let cleaned_scored = self
                    .search_phase(&cleaned.title, &cleaned.artist, &mut complete)
                    .await
                    .into_iter()
                    .map(|candidate| ScoredCandidate {
                        score: similarity::score(
                            &cleaned.title,
                            &cleaned.artist,
                            &clean_text(&candidate.track.title),
                            &split_artists(&candidate.track.artist).join(" "),
                            candidate.is_liked,
                        ),
                        candidate,
                    });
                merged.extend(cleaned_scored);
            }
        }

        Ranked {
            candidates: merge_candidates(merged),
            complete,
        }
    }

    /// A failed phase contributes no candidates and clears `complete`.
    async fn search_phase(
        &self,
        title: &str,
        artist: &str,
        complete: &mut bool,
    ) -> Vec<Candidate> {
        match self.search.search(title, artist).await {
            Ok(candidates) => candidates,
            Err(e) => {
                log::warn!("{}; no candidates this attempt", e);
                *complete = false;
                Vec::new()
            }
        }
    }

    async fn resolve_interactively(
        &self,
        resolver: &dyn InteractiveResolver,
        source: &Track,
        ranked: &[ScoredCandidate],
    ) -> Option<MatchOutcome> {
        let shown: Vec<(Candidate, f64)> = ranked
            .iter()
            .take(self.options.max_candidates_shown)
            .map(|c| (c.candidate.clone(), c.score))
            .collect();
        let request = ResolutionRequest {
            source: source.clone(),
            candidates: shown.clone(),
        };

        let decision = match resolver.resolve(request).await {
            Ok(Resolution::Select(i)) => match shown.get(i) {
                Some((candidate, score)) => MatchDecision::matched(
                    &source.id,
                    &candidate.track,
                    ALGORITHM_VERSION,
                    *score,
                ),
                None => {
                    log::warn!("Selection {} out of range for {}", i + 1, source.id);
                    return None;
                }
            },
            Ok(Resolution::Skip) => MatchDecision::unmatched(
                &source.id,
                ALGORITHM_VERSION,
                shown.first().map(|(_, s)| *s).unwrap_or(0.0),
            ),
            Err(e) => {
                log::warn!("Interactive resolution failed for {}: {:?}", source.id, e);
                return None;
            }
        };

        Some(MatchOutcome {
            decision: decision.with_manual_override(),
            origin: DecisionOrigin::Interactive,
        })
    }
}

/// Keep the best score per target track and sort best first.
fn merge_candidates(scored: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<ScoredCandidate> = Vec::new();

    for item in scored {
        match index.get(&item.candidate.track.id) {
            Some(&i) => {
                if item.score > merged[i].score {
                    merged[i].score = item.score;
                }
            }
            None => {
                index.insert(item.candidate.track.id.clone(), merged.len());
                merged.push(item);
            }
        }
    }

    // stable sort keeps discovery order between equal scores
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged
}
