//! Probability-ranked password corpus
//!
//! Records are kept sorted by probability, highest first, and deduplicated by
//! password. A record's rank is its 1-based position, so ranks are contiguous
//! by construction. Ties keep arrival order: the bulk pass uses a stable sort
//! and an insert lands after every record of equal probability.
//!
//! Inserts use a binary search on probability instead of re-sorting the whole
//! corpus. [`establish_order`] is the full sort + dedup pass; both paths yield
//! the same table.

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use super::features::Features;
use crate::markov::MarkovModel;
use crate::predict::{PredictStrategy, TriesPredictor};

/// Floor used when no strictly positive probability has been observed
pub const DEFAULT_FLOOR: f64 = 1e-8;

/// Zero probabilities in a bulk build become `floor * DEFAULT_FLOOR_SCALE`
pub const DEFAULT_FLOOR_SCALE: f64 = 0.1;

/// How non-positive probabilities are replaced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloorPolicy {
    pub scale: f64,
    pub default_floor: f64,
}

impl Default for FloorPolicy {
    fn default() -> Self {
        Self {
            scale: DEFAULT_FLOOR_SCALE,
            default_floor: DEFAULT_FLOOR,
        }
    }
}

/// One known password with its features and model score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PasswordRecord {
    pub password: String,
    #[serde(flatten)]
    pub features: Features,
    /// Chain-rule probability, floor-substituted so it is always positive
    pub probability: f64,
    pub log2_probability: f64,
    /// The model scored this password 0 and `probability` is a substitute
    pub substituted: bool,
}

impl PasswordRecord {
    /// Features and log2 are derived from the password and probability.
    pub(crate) fn new(password: String, probability: f64, substituted: bool) -> Self {
        let features = Features::extract(&password);
        Self {
            password,
            features,
            probability,
            log2_probability: probability.log2(),
            substituted,
        }
    }
}

/// A record together with its current rank
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRecord {
    pub rank: usize,
    #[serde(flatten)]
    pub record: PasswordRecord,
}

/// Where a password falls in the guessing order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub password: String,
    pub found: bool,
    /// Position if found, otherwise corpus size + 1
    pub rank: usize,
    pub predicted_tries: u64,
}

/// Result of a single insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted { rank: usize },
    AlreadyPresent { rank: usize },
}

impl InsertOutcome {
    pub fn rank(&self) -> usize {
        match self {
            InsertOutcome::Inserted { rank } | InsertOutcome::AlreadyPresent { rank } => *rank,
        }
    }
}

/// Smallest strictly positive probability, if any
fn min_positive(probabilities: impl Iterator<Item = f64>) -> Option<f64> {
    probabilities.filter(|&p| p > 0.0).min_by(|a, b| a.total_cmp(b))
}

/// Sort by probability descending (stable) and drop later duplicates of a password.
pub fn establish_order(mut records: Vec<PasswordRecord>) -> Vec<PasswordRecord> {
    records.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    let mut seen = FxHashSet::default();
    records.retain(|r| seen.insert(r.password.clone()));
    records
}

/// The ranked corpus and the frozen model its scores come from
#[derive(Debug, Clone)]
pub struct RankedCorpus {
    model: MarkovModel,
    records: Vec<PasswordRecord>,
    /// password -> probability, for membership and tie-range lookup
    index: FxHashMap<String, f64>,
    floor: f64,
    floor_policy: FloorPolicy,
}

impl RankedCorpus {
    /// Corpus with no records
    pub fn empty(model: MarkovModel, floor_policy: FloorPolicy) -> Self {
        Self {
            model,
            records: Vec::new(),
            index: FxHashMap::default(),
            floor: floor_policy.default_floor,
            floor_policy,
        }
    }

    /// Score, floor-substitute, sort, dedup and rank a batch of raw passwords.
    ///
    /// The floor is the minimum strictly positive probability of the whole batch,
    /// taken before any substitution.
    pub fn build(passwords: Vec<String>, model: MarkovModel, floor_policy: FloorPolicy) -> Self {
        let scored: Vec<(String, f64)> = passwords
            .into_par_iter()
            .map(|p| {
                let prob = model.ngram_probability(&p);
                (p, prob)
            })
            .collect();

        let floor = min_positive(scored.iter().map(|(_, p)| *p)).unwrap_or(floor_policy.default_floor);
        let substitute = floor * floor_policy.scale;

        let records: Vec<PasswordRecord> = scored
            .into_par_iter()
            .map(|(password, prob)| {
                if prob > 0.0 {
                    PasswordRecord::new(password, prob, false)
                } else {
                    PasswordRecord::new(password, substitute, true)
                }
            })
            .collect();

        let corpus = Self::assemble(model, records, floor, floor_policy);
        tracing::info!(
            "Ranked {} unique passwords (floor probability {:e})",
            corpus.len(),
            corpus.floor
        );
        corpus
    }

    /// Rebuild from stored records. Order and uniqueness are re-established;
    /// without a stored floor the minimum positive probability is used.
    ///
    /// Whether a record's probability was substituted is recomputed from the
    /// model, which is frozen, so it survives any number of floor changes.
    pub fn from_records(
        model: MarkovModel,
        mut records: Vec<PasswordRecord>,
        floor: Option<f64>,
        floor_policy: FloorPolicy,
    ) -> Self {
        records
            .par_iter_mut()
            .for_each(|r| r.substituted = !(model.ngram_probability(&r.password) > 0.0));

        let floor = floor
            .filter(|f| *f > 0.0)
            .or_else(|| {
                min_positive(records.iter().filter(|r| !r.substituted).map(|r| r.probability))
            })
            .unwrap_or(floor_policy.default_floor);
        Self::assemble(model, records, floor, floor_policy)
    }

    fn assemble(
        model: MarkovModel,
        records: Vec<PasswordRecord>,
        floor: f64,
        floor_policy: FloorPolicy,
    ) -> Self {
        let records = establish_order(records);
        let index = records
            .iter()
            .map(|r| (r.password.clone(), r.probability))
            .collect();
        Self {
            model,
            records,
            index,
            floor,
            floor_policy,
        }
    }

    pub fn model(&self) -> &MarkovModel {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Smallest strictly positive probability observed so far
    pub fn floor_probability(&self) -> f64 {
        self.floor
    }

    pub fn floor_policy(&self) -> FloorPolicy {
        self.floor_policy
    }

    /// Value a bulk build substitutes for zero scores, one step below the floor
    pub fn substitute_probability(&self) -> f64 {
        self.floor * self.floor_policy.scale
    }

    /// Records in rank order; rank is index + 1
    pub fn records(&self) -> &[PasswordRecord] {
        &self.records
    }

    /// Owned copy of the full ranked table
    pub fn get_data(&self) -> Vec<RankedRecord> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| RankedRecord {
                rank: i + 1,
                record: r.clone(),
            })
            .collect()
    }

    /// Model probability of `password`; the floor itself when the model scores it 0.
    pub fn probability(&self, password: &str) -> f64 {
        let raw = self.model.ngram_probability(password);
        if raw > 0.0 {
            raw
        } else {
            self.floor
        }
    }

    /// Record for `password` as an insert would store it.
    pub(crate) fn score(&self, password: &str) -> PasswordRecord {
        let raw = self.model.ngram_probability(password);
        if raw > 0.0 {
            PasswordRecord::new(password.to_string(), raw, false)
        } else {
            PasswordRecord::new(password.to_string(), self.floor, true)
        }
    }

    pub fn log2_probability(&self, password: &str) -> f64 {
        self.probability(password).log2()
    }

    /// Current 1-based rank of `password`, if present.
    pub fn rank_of(&self, password: &str) -> Option<usize> {
        let prob = *self.index.get(password)?;
        let lo = self.records.partition_point(|r| r.probability > prob);
        let hi = self.records.partition_point(|r| r.probability >= prob);
        self.records[lo..hi]
            .iter()
            .position(|r| r.password == password)
            .map(|i| lo + i + 1)
    }

    /// Add a password and keep the table sorted, unique and contiguously ranked.
    pub fn insert_password(&mut self, password: &str) -> InsertOutcome {
        let raw = self.model.ngram_probability(password);
        if raw > 0.0 && raw < self.floor {
            tracing::debug!("Floor probability lowered to {:e}", raw);
            self.floor = raw;
        }

        if let Some(rank) = self.rank_of(password) {
            return InsertOutcome::AlreadyPresent { rank };
        }

        let record = self.score(password);
        let prob = record.probability;
        let pos = self.records.partition_point(|r| r.probability >= prob);
        self.records.insert(pos, record);
        self.index.insert(password.to_string(), prob);
        InsertOutcome::Inserted { rank: pos + 1 }
    }

    /// Guess-count estimate from the regression, using the password's model probability.
    pub fn predict_tries(
        &self,
        password: &str,
        predictor: &TriesPredictor,
        strategy: PredictStrategy,
    ) -> u64 {
        predictor.predict(self.log2_probability(password), strategy)
    }

    /// Look up `password`; absent passwords rank one past the end.
    pub fn search(&self, password: &str, predictor: &TriesPredictor) -> SearchResult {
        let rank = self.rank_of(password);
        SearchResult {
            password: password.to_string(),
            found: rank.is_some(),
            rank: rank.unwrap_or(self.records.len() + 1),
            predicted_tries: self.predict_tries(password, predictor, predictor.default_strategy),
        }
    }

    /// `(log2_probability, rank)` pairs for fitting a strategy's regression.
    ///
    /// `Likely` keeps only records whose probability came from the model.
    pub fn regression_points(&self, strategy: PredictStrategy) -> Vec<(f64, f64)> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| match strategy {
                PredictStrategy::Inclusive => true,
                PredictStrategy::Likely => !r.substituted,
            })
            .map(|(i, r)| (r.log2_probability, (i + 1) as f64))
            .collect()
    }
}
