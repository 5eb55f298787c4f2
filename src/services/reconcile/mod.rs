//! Record reconciliation: map freshly extracted candidates onto stored rows.
//!
//! Every candidate is scored against every enabled stored record of the same
//! source. Pairs at or above the threshold are assigned greedily in
//! descending score order, each side at most once. Matched pairs whose
//! mutable fields differ become updates; unmatched candidates become new
//! records; unmatched stored records are left alone.

mod normalize;
mod similarity;
mod tokenize;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use normalize::{char_prefix, normalize_text};
pub use similarity::{
    partial_ratio, partial_token_set_ratio, ratio, token_set_ratio, token_sort_ratio,
    weighted_ratio,
};
pub use tokenize::{
    default_segmenter, Decomposer, MorphologicalSegmenter, ScriptSegmenter, Segmenter, Token,
    TokenCache, TokenClass,
};

use crate::models::{CandidateRecord, Provenance, Source, StoredRecord};

/// Per-field weights of the combined score.
///
/// The trail name carries most of the weight: within one source the mountain
/// is often shared and titles and descriptions repeat the same boilerplate
/// ("通行止め"), so only the trail name tells two reports apart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldWeights {
    #[serde(default = "default_mountain_weight")]
    pub mountain: f64,
    #[serde(default = "default_trail_weight")]
    pub trail: f64,
    #[serde(default = "default_title_weight")]
    pub title: f64,
    #[serde(default = "default_description_weight")]
    pub description: f64,
}

fn default_mountain_weight() -> f64 {
    0.1
}

fn default_trail_weight() -> f64 {
    0.65
}

fn default_title_weight() -> f64 {
    0.1
}

fn default_description_weight() -> f64 {
    0.15
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            mountain: default_mountain_weight(),
            trail: default_trail_weight(),
            title: default_title_weight(),
            description: default_description_weight(),
        }
    }
}

/// Reconciliation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Minimum combined score for a match (inclusive).
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub weights: FieldWeights,
    /// Added when statuses are equal.
    #[serde(default)]
    pub status_bonus: f64,
    /// Added when the reported date is near the stored record's creation.
    #[serde(default)]
    pub date_bonus: f64,
    #[serde(default = "default_proximity_days")]
    pub proximity_days: i64,
    /// Descriptions are compared over this many leading characters.
    #[serde(default = "default_description_prefix")]
    pub description_prefix_chars: usize,
    /// Descriptions at most this long on both sides use the stricter set ratio.
    #[serde(default = "default_short_description")]
    pub short_description_chars: usize,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Leave records with a resolved date out of the matching pool.
    #[serde(default)]
    pub exclude_resolved: bool,
}

fn default_threshold() -> f64 {
    0.7
}

fn default_proximity_days() -> i64 {
    14
}

fn default_description_prefix() -> usize {
    200
}

fn default_short_description() -> usize {
    20
}

fn default_cache_capacity() -> usize {
    2048
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            weights: FieldWeights::default(),
            status_bonus: 0.0,
            date_bonus: 0.0,
            proximity_days: default_proximity_days(),
            description_prefix_chars: default_description_prefix(),
            short_description_chars: default_short_description(),
            cache_capacity: default_cache_capacity(),
            exclude_resolved: false,
        }
    }
}

impl ReconcileConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Per-field breakdown of one pair's score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScore {
    pub mountain: f64,
    pub trail: f64,
    pub title: f64,
    /// `None` when either side has no description.
    pub description: Option<f64>,
    pub bonus: f64,
    pub total: f64,
}

/// A candidate assigned to a stored record.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPair {
    /// Index into the pool passed to [`RecordReconciler::reconcile`].
    pub stored_index: usize,
    pub stored_id: Option<i32>,
    pub candidate_index: usize,
    pub score: f64,
    /// Whether the pair produced an update.
    pub changed: bool,
}

/// A qualifying pair that lost its stored record to a higher-scoring candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateWarning {
    pub candidate_index: usize,
    pub stored_index: usize,
    pub stored_id: Option<i32>,
    pub score: f64,
    /// The candidate that claimed the stored record.
    pub claimed_by: usize,
}

/// Result of reconciling one source.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub to_update: Vec<StoredRecord>,
    pub to_create: Vec<StoredRecord>,
    pub matches: Vec<MatchedPair>,
    pub duplicate_warnings: Vec<DuplicateWarning>,
}

impl Reconciliation {
    /// Matched pairs with nothing to change.
    pub fn unchanged_count(&self) -> usize {
        self.matches.iter().filter(|m| !m.changed).count()
    }
}

/// Matches candidates against stored records.
///
/// Owns its token cache; create one per run.
pub struct RecordReconciler {
    config: ReconcileConfig,
    decomposer: Decomposer,
}

impl RecordReconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self::with_segmenter(config, default_segmenter())
    }

    pub fn with_segmenter(config: ReconcileConfig, segmenter: Box<dyn Segmenter>) -> Self {
        let decomposer = Decomposer::new(segmenter, config.cache_capacity);
        Self { config, decomposer }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Whether a stored record takes part in matching for `source`.
    pub fn in_pool(&self, source: &Source, record: &StoredRecord) -> bool {
        record.source_id == source.id
            && !record.disabled
            && !(self.config.exclude_resolved && record.resolved_at.is_some())
    }

    /// Score one pair.
    pub fn score(&mut self, stored: &StoredRecord, candidate: &CandidateRecord) -> PairScore {
        let mountain = token_set_ratio(
            &self.decomposer.decompose(&stored.mountain_name_raw, true),
            &self.decomposer.decompose(&candidate.mountain_name_raw, true),
        );
        let trail = token_sort_ratio(
            &self.decomposer.decompose(&stored.trail_name, false),
            &self.decomposer.decompose(&candidate.trail_name, false),
        );
        let title = weighted_ratio(
            &self.decomposer.decompose(&stored.title, false),
            &self.decomposer.decompose(&candidate.title, false),
        );
        let description = self.description_score(&stored.description, &candidate.description);

        let weights = &self.config.weights;
        let base = match description {
            Some(desc) => {
                mountain * weights.mountain
                    + trail * weights.trail
                    + title * weights.title
                    + desc * weights.description
            }
            None => {
                let sum = weights.mountain + weights.trail + weights.title;
                if sum > 0.0 {
                    (mountain * weights.mountain + trail * weights.trail + title * weights.title)
                        / sum
                } else {
                    0.0
                }
            }
        };

        let mut bonus = 0.0;
        if stored.status == candidate.status {
            bonus += self.config.status_bonus;
        }
        if let Some(reported) = candidate.reported_at {
            let days = (stored.created_at.date_naive() - reported).num_days().abs();
            if days <= self.config.proximity_days {
                bonus += self.config.date_bonus;
            }
        }

        PairScore {
            mountain,
            trail,
            title,
            description,
            bonus,
            total: (base + bonus).clamp(0.0, 1.0),
        }
    }

    fn description_score(&mut self, stored: &str, candidate: &str) -> Option<f64> {
        if stored.trim().is_empty() || candidate.trim().is_empty() {
            return None;
        }
        let limit = self.config.description_prefix_chars;
        let stored = char_prefix(stored, limit);
        let candidate = char_prefix(candidate, limit);
        let short = self.config.short_description_chars;
        let both_short = stored.chars().count() <= short && candidate.chars().count() <= short;

        let a = self.decomposer.decompose(stored, false);
        let b = self.decomposer.decompose(candidate, false);
        Some(if both_short {
            token_set_ratio(&a, &b)
        } else {
            partial_token_set_ratio(&a, &b)
        })
    }

    /// Partition candidates into updates and creates.
    ///
    /// `stored` may contain records of other sources or disabled rows; they
    /// are filtered out here. Never fails.
    pub fn reconcile(
        &mut self,
        source: &Source,
        stored: &[StoredRecord],
        candidates: &[CandidateRecord],
        provenance: &Provenance,
        now: DateTime<Utc>,
    ) -> Reconciliation {
        let pool: Vec<usize> = (0..stored.len())
            .filter(|&i| self.in_pool(source, &stored[i]))
            .collect();
        debug!(
            "Reconciling {} candidate(s) against {} stored record(s) for {}",
            candidates.len(),
            pool.len(),
            source.name
        );

        // Candidate-major order; the stable sort keeps it among equal scores.
        let mut scored: Vec<(f64, usize, usize)> = Vec::new();
        for (candidate_index, candidate) in candidates.iter().enumerate() {
            for &stored_index in &pool {
                let score = self.score(&stored[stored_index], candidate).total;
                if score >= self.config.threshold {
                    scored.push((score, stored_index, candidate_index));
                }
            }
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut result = Reconciliation::default();
        let mut claimed_stored: HashSet<usize> = HashSet::new();
        let mut claimed_candidates: HashSet<usize> = HashSet::new();
        let mut owner_of: Vec<Option<usize>> = vec![None; stored.len()];
        let mut skipped: Vec<DuplicateWarning> = Vec::new();

        for &(score, stored_index, candidate_index) in &scored {
            if claimed_candidates.contains(&candidate_index) {
                continue;
            }
            if claimed_stored.contains(&stored_index) {
                if let Some(claimed_by) = owner_of[stored_index] {
                    skipped.push(DuplicateWarning {
                        candidate_index,
                        stored_index,
                        stored_id: stored[stored_index].id,
                        score,
                        claimed_by,
                    });
                }
                continue;
            }
            claimed_stored.insert(stored_index);
            claimed_candidates.insert(candidate_index);
            owner_of[stored_index] = Some(candidate_index);

            let record = &stored[stored_index];
            let candidate = &candidates[candidate_index];
            let changed = record.differs_from(candidate);
            info!(
                "Matched {}/{} to #{} {}/{} (score {:.2}{})",
                candidate.mountain_name_raw,
                candidate.trail_name,
                record.id.unwrap_or_default(),
                record.mountain_name_raw,
                record.trail_name,
                score,
                if changed { ", changed" } else { "" }
            );

            if changed {
                let mut updated = record.clone();
                updated.apply_update(candidate, provenance, now);
                result.to_update.push(updated);
            }
            result.matches.push(MatchedPair {
                stored_index,
                stored_id: record.id,
                candidate_index,
                score,
                changed,
            });
        }

        for (candidate_index, candidate) in candidates.iter().enumerate() {
            if claimed_candidates.contains(&candidate_index) {
                continue;
            }
            info!(
                "New record: {}/{}",
                candidate.mountain_name_raw, candidate.trail_name
            );
            result
                .to_create
                .push(StoredRecord::from_candidate(source, candidate, provenance, now));
        }

        // Only losers that ended up as new records are worth flagging
        let mut warned: HashSet<usize> = HashSet::new();
        for warning in skipped {
            if claimed_candidates.contains(&warning.candidate_index)
                || !warned.insert(warning.candidate_index)
            {
                continue;
            }
            warn!(
                "Possible duplicate: candidate {} scored {:.2} against #{} already claimed by candidate {}",
                warning.candidate_index,
                warning.score,
                warning.stored_id.unwrap_or_default(),
                warning.claimed_by
            );
            result.duplicate_warnings.push(warning);
        }

        info!(
            "{}: {} update(s), {} new, {} unchanged",
            source.name,
            result.to_update.len(),
            result.to_create.len(),
            result.unchanged_count()
        );
        result
    }
}
