use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::MatchDecision;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to write mapping cache {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize mapping cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Which cached decisions a run should ignore and re-match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RemapScope {
    /// Reuse every cached decision.
    #[default]
    None,
    /// Re-match everything except manual overrides.
    All,
    /// Re-match decisions tagged with this algorithm version, manual or not.
    Version(String),
}

impl RemapScope {
    pub fn targets(&self, decision: &MatchDecision) -> bool {
        match self {
            RemapScope::None => false,
            RemapScope::All => !decision.manual_override,
            RemapScope::Version(version) => &decision.algorithm_version == version,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub matched: usize,
    pub non_matches: usize,
    pub manual_overrides: usize,
    pub by_algorithm: BTreeMap<String, usize>,
}

/// Persistent map from source track id to its single [`MatchDecision`].
///
/// The snapshot is one JSON object keyed by source track id. A missing file is
/// an empty cache; a malformed one is reported and discarded.
#[derive(Debug)]
pub struct MappingCache {
    path: PathBuf,
    decisions: HashMap<String, MatchDecision>,
    unsaved: usize,
}

impl MappingCache {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            decisions: HashMap::new(),
            unsaved: 0,
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No mapping cache at {}, starting empty", path.display());
                return Self::empty(path);
            }
            Err(e) => {
                log::warn!(
                    "Could not read mapping cache {}, starting empty: {}",
                    path.display(),
                    e
                );
                return Self::empty(path);
            }
        };

        match serde_json::from_str::<HashMap<String, MatchDecision>>(&contents) {
            Ok(mut decisions) => {
                for (source_id, decision) in decisions.iter_mut() {
                    decision.source_track_id = source_id.clone();
                }
                log::info!(
                    "Loaded {} cached track mappings from {}",
                    decisions.len(),
                    path.display()
                );
                Self {
                    path,
                    decisions,
                    unsaved: 0,
                }
            }
            Err(e) => {
                log::warn!(
                    "Corrupted mapping cache {}, starting fresh: {}",
                    path.display(),
                    e
                );
                Self::empty(path)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn get(&self, source_track_id: &str) -> Option<&MatchDecision> {
        self.decisions.get(source_track_id)
    }

    /// Insert or replace the decision for its source track.
    pub fn put(&mut self, decision: MatchDecision) {
        self.decisions
            .insert(decision.source_track_id.clone(), decision);
        self.unsaved += 1;
    }

    /// Number of puts since the last save.
    pub fn unsaved(&self) -> usize {
        self.unsaved
    }

    /// The cached decision to reuse, or `None` when the track must be matched.
    pub fn reusable(&self, source_track_id: &str, remap: &RemapScope) -> Option<&MatchDecision> {
        self.get(source_track_id)
            .filter(|decision| !remap.targets(decision))
    }

    /// Rewrite the whole snapshot. The file is replaced atomically.
    pub fn save(&mut self) -> Result<(), CacheError> {
        let ordered: BTreeMap<&String, &MatchDecision> = self.decisions.iter().collect();
        let json = serde_json::to_vec(&ordered)?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        log::debug!(
            "Saved {} track mappings to {}",
            self.decisions.len(),
            self.path.display()
        );
        self.unsaved = 0;
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<usize, CacheError> {
        let cleared = self.decisions.len();
        self.decisions.clear();
        self.save()?;
        Ok(cleared)
    }

    pub fn clear_by_algorithm(&mut self, algorithm_version: &str) -> Result<usize, CacheError> {
        let before = self.decisions.len();
        self.decisions
            .retain(|_, decision| decision.algorithm_version != algorithm_version);
        let cleared = before - self.decisions.len();
        if cleared > 0 {
            self.save()?;
        }
        Ok(cleared)
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            total: self.decisions.len(),
            ..Default::default()
        };
        for decision in self.decisions.values() {
            if decision.is_match() {
                stats.matched += 1;
            } else {
                stats.non_matches += 1;
            }
            if decision.manual_override {
                stats.manual_overrides += 1;
            }
            *stats
                .by_algorithm
                .entry(decision.algorithm_version.clone())
                .or_default() += 1;
        }
        stats
    }
}

/// Single update path for the cache while matching runs in parallel.
///
/// Every put happens under one lock, and the snapshot is saved every
/// `save_every` decisions so a crash loses at most one batch.
pub struct CacheWriter {
    cache: Mutex<MappingCache>,
    save_every: usize,
}

impl CacheWriter {
    pub fn new(cache: MappingCache, save_every: usize) -> Self {
        Self {
            cache: Mutex::new(cache),
            save_every: save_every.max(1),
        }
    }

    pub async fn reusable(
        &self,
        source_track_id: &str,
        remap: &RemapScope,
    ) -> Option<MatchDecision> {
        self.cache
            .lock()
            .await
            .reusable(source_track_id, remap)
            .cloned()
    }

    pub async fn record(&self, decision: MatchDecision) -> Result<(), CacheError> {
        let mut cache = self.cache.lock().await;
        cache.put(decision);
        if cache.unsaved() >= self.save_every {
            cache.save()?;
        }
        Ok(())
    }

    /// Save any decisions recorded since the last batch.
    pub async fn flush(&self) -> Result<(), CacheError> {
        let mut cache = self.cache.lock().await;
        if cache.unsaved() > 0 {
            cache.save()?;
        }
        Ok(())
    }

    pub fn into_inner(self) -> MappingCache {
        self.cache.into_inner()
    }
}
