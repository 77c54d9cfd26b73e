//! Character-level Markov chain of fixed order k
//!
//! Learns "which character follows which k characters" from a training text and
//! scores longer strings with the chain rule:
//!
//! ```text
//! P(password) = P(pa) * P(s|pa) * P(s|as) * P(w|ss) * P(o|sw) * P(r|wo) * P(d|or)   (k = 2)
//! ```
//!
//! The training text is treated as cyclic: its first k characters are appended
//! to the end so every position has a successor. A built model is frozen; the
//! only way to change it is to build a new one.

mod generate;

pub use generate::Generate;

use std::ops::Range;

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{RankError, Result};

/// Substitute for a zero numerator or denominator inside the chain-rule product
pub const DEFAULT_EPSILON: f64 = 1e-5;

/// What `sample_next` does when the context k-gram never occurred in training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnseenGramPolicy {
    /// Draw uniformly over the alphabet
    #[default]
    Uniform,
    /// Return `RankError::UnseenGram`
    Fail,
}

/// How undefined ratios are handled in probability math and sampling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothingPolicy {
    pub epsilon: f64,
    pub unseen: UnseenGramPolicy,
}

impl Default for SmoothingPolicy {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            unseen: UnseenGramPolicy::default(),
        }
    }
}

/// Partial counts over a range of window positions. Shards merge by summing.
#[derive(Debug, Default)]
struct Counts {
    kgrams: FxHashMap<String, u64>,
    transitions: FxHashMap<String, FxHashMap<char, u64>>,
}

impl Counts {
    /// Count every window starting in `range`. `chars` already carries the cyclic tail.
    fn count_range(chars: &[char], order: usize, range: Range<usize>) -> Self {
        let mut counts = Counts::default();
        for i in range {
            let window: String = chars[i..i + order].iter().collect();
            let next = chars[i + order];
            *counts.transitions
                .entry(window.clone())
                .or_default()
                .entry(next)
                .or_insert(0) += 1;
            *counts.kgrams.entry(window).or_insert(0) += 1;
        }
        counts
    }

    fn merge(self, other: Self) -> Self {
        // Fold the smaller map into the larger one
        let (mut into, from) = if self.kgrams.len() >= other.kgrams.len() {
            (self, other)
        } else {
            (other, self)
        };
        for (gram, count) in from.kgrams {
            *into.kgrams.entry(gram).or_insert(0) += count;
        }
        for (gram, nexts) in from.transitions {
            let slot = into.transitions.entry(gram).or_default();
            for (next, count) in nexts {
                *slot.entry(next).or_insert(0) += count;
            }
        }
        into
    }
}

/// Frozen character-transition statistics of order k
#[derive(Debug, Clone, PartialEq)]
pub struct MarkovModel {
    order: usize,
    /// k-gram -> occurrences in the cyclic training text
    kgram_counts: FxHashMap<String, u64>,
    /// k-gram -> (following character -> occurrences)
    transitions: FxHashMap<String, FxHashMap<char, u64>>,
    /// Distinct training characters, sorted so sampling is reproducible under a seeded RNG
    alphabet: Vec<char>,
    /// Sum of all k-gram counts (= training text length)
    total: u64,
    policy: SmoothingPolicy,
}

impl MarkovModel {
    /// Build a model of the given order from a single training string.
    pub fn build(text: &str, order: usize) -> Result<Self> {
        Self::build_sharded(text, order, 1)
    }

    /// Build with window counting split across `shards` rayon tasks.
    /// Produces exactly the same model as `build`.
    pub fn build_parallel(text: &str, order: usize, shards: usize) -> Result<Self> {
        Self::build_sharded(text, order, shards.max(1))
    }

    fn build_sharded(text: &str, order: usize, shards: usize) -> Result<Self> {
        let mut chars: Vec<char> = text.chars().collect();
        let n = chars.len();
        if order == 0 || order >= n {
            return Err(RankError::InvalidOrder {
                order,
                text_len: n,
            });
        }

        let mut alphabet = chars.clone();
        alphabet.sort_unstable();
        alphabet.dedup();

        chars.extend_from_within(..order);

        let shards = shards.min(n);
        let counts = if shards == 1 {
            Counts::count_range(&chars, order, 0..n)
        } else {
            let chunk = n.div_ceil(shards);
            (0..shards)
                .into_par_iter()
                .map(|s| {
                    let start = (s * chunk).min(n);
                    let end = ((s + 1) * chunk).min(n);
                    Counts::count_range(&chars, order, start..end)
                })
                .reduce(Counts::default, Counts::merge)
        };

        tracing::debug!(
            "Built order-{} Markov model: {} chars, {} distinct k-grams, alphabet {}",
            order,
            n,
            counts.kgrams.len(),
            alphabet.len()
        );

        Ok(Self {
            order,
            kgram_counts: counts.kgrams,
            transitions: counts.transitions,
            alphabet,
            total: n as u64,
            policy: SmoothingPolicy::default(),
        })
    }

    /// Reassemble a model from persisted parts, verifying the count invariant.
    pub(crate) fn from_parts(
        order: usize,
        kgram_counts: FxHashMap<String, u64>,
        transitions: FxHashMap<String, FxHashMap<char, u64>>,
        alphabet: Vec<char>,
        policy: SmoothingPolicy,
    ) -> std::result::Result<Self, String> {
        if order == 0 {
            return Err("order must be positive".to_string());
        }
        let total = kgram_counts.values().sum();
        let model = Self {
            order,
            kgram_counts,
            transitions,
            alphabet,
            total,
            policy,
        };
        if total == 0 || model.alphabet.is_empty() {
            return Err("model has no observations".to_string());
        }
        if !model.is_consistent() {
            return Err("transition counts do not sum to k-gram counts".to_string());
        }
        Ok(model)
    }

    /// Replace the smoothing policy.
    pub fn with_policy(mut self, policy: SmoothingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn policy(&self) -> SmoothingPolicy {
        self.policy
    }

    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    /// Total window observations (the training text length)
    pub fn total_observations(&self) -> u64 {
        self.total
    }

    pub fn distinct_kgrams(&self) -> usize {
        self.kgram_counts.len()
    }

    pub(crate) fn kgram_counts(&self) -> &FxHashMap<String, u64> {
        &self.kgram_counts
    }

    pub(crate) fn transitions(&self) -> &FxHashMap<String, FxHashMap<char, u64>> {
        &self.transitions
    }

    /// Check `kgram_count[g] == sum_c transition_count[(g, c)]` for every observed g.
    pub fn is_consistent(&self) -> bool {
        self.kgram_counts.len() == self.transitions.len()
            && self.kgram_counts.iter().all(|(gram, &count)| {
                self.transitions
                    .get(gram)
                    .map(|nexts| nexts.values().sum::<u64>() == count)
                    .unwrap_or(false)
            })
    }

    fn check_order(&self, gram: &str) -> Result<()> {
        let actual = gram.chars().count();
        if actual != self.order {
            return Err(RankError::WrongGramLength {
                expected: self.order,
                actual,
            });
        }
        Ok(())
    }

    fn kgram_count(&self, gram: &str) -> u64 {
        self.kgram_counts.get(gram).copied().unwrap_or(0)
    }

    fn transition_count(&self, gram: &str, next: char) -> u64 {
        self.transitions
            .get(gram)
            .and_then(|nexts| nexts.get(&next))
            .copied()
            .unwrap_or(0)
    }

    /// Number of times `gram` occurred in the training text.
    pub fn kgram_frequency(&self, gram: &str) -> Result<u64> {
        self.check_order(gram)?;
        Ok(self.kgram_count(gram))
    }

    /// Number of times `next` followed `gram` in the training text.
    pub fn transition_frequency(&self, gram: &str, next: char) -> Result<u64> {
        self.check_order(gram)?;
        Ok(self.transition_count(gram, next))
    }

    /// Draw the character following `gram` from its empirical distribution.
    pub fn sample_next<R: Rng>(&self, gram: &str, rng: &mut R) -> Result<char> {
        let total = self.kgram_frequency(gram)?;
        let unseen = || RankError::UnseenGram {
            gram: gram.to_string(),
        };

        if total == 0 {
            return match self.policy.unseen {
                UnseenGramPolicy::Uniform if !self.alphabet.is_empty() => {
                    Ok(self.alphabet[rng.random_range(0..self.alphabet.len())])
                }
                _ => Err(unseen()),
            };
        }

        let weights: Vec<u64> = self
            .alphabet
            .iter()
            .map(|&c| self.transition_count(gram, c))
            .collect();
        let dist = WeightedIndex::<u64>::new(&weights).map_err(|_| unseen())?;
        Ok(self.alphabet[dist.sample(rng)])
    }

    /// Lazily generate `len` characters starting from the context `gram`.
    pub fn generator<R: Rng>(&self, gram: &str, len: usize, rng: R) -> Result<Generate<'_, R>> {
        self.check_order(gram)?;
        Ok(Generate::new(self, gram, len, rng))
    }

    /// Generate a string of exactly `len` sampled characters.
    pub fn generate<R: Rng>(&self, gram: &str, len: usize, rng: R) -> Result<String> {
        self.generator(gram, len, rng)?.collect()
    }

    /// Chain-rule probability of `ngram`. Strings not longer than the order score exactly 0.0.
    pub fn ngram_probability(&self, ngram: &str) -> f64 {
        let chars: Vec<char> = ngram.chars().collect();
        let k = self.order;
        let n = chars.len();
        if n <= k {
            return 0.0;
        }

        let epsilon = self.policy.epsilon;
        let substitute = |x: f64| if x == 0.0 { epsilon } else { x };

        let prefix: String = chars[..k].iter().collect();
        let mut prob = self.kgram_count(&prefix) as f64 / self.total as f64;

        for i in 0..n - k {
            let window: String = chars[i..i + k].iter().collect();
            let a = substitute(self.transition_count(&window, chars[i + k]) as f64);
            let b = substitute(self.kgram_count(&window) as f64);
            prob *= a / b;
        }
        prob
    }
}

#[cfg(test)]
mod tests;
