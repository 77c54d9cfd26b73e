//! Guess-count regression
//!
//! Maps a password's log2 probability to an estimated number of guesses a
//! probability-ordered attacker needs. The polynomial coefficients are data,
//! not code: they come from configuration and can be refitted from a built
//! corpus with [`Polynomial::fit`].

use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{RankError, Result};

/// Which fitted regression to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictStrategy {
    /// Fitted only on passwords the model considers likely (no floor substitution)
    #[default]
    Likely,
    /// Fitted on every password, including floor-substituted ones
    Inclusive,
}

impl PredictStrategy {
    pub const ALL: [PredictStrategy; 2] = [PredictStrategy::Likely, PredictStrategy::Inclusive];

    pub fn name(&self) -> &'static str {
        match self {
            PredictStrategy::Likely => "likely",
            PredictStrategy::Inclusive => "inclusive",
        }
    }
}

impl fmt::Display for PredictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PredictStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "likely" => Ok(PredictStrategy::Likely),
            "inclusive" => Ok(PredictStrategy::Inclusive),
            other => Err(format!("unknown strategy '{}' (expected likely or inclusive)", other)),
        }
    }
}

/// Polynomial in log2 probability, coefficients in ascending power order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polynomial {
    pub coefficients: Vec<f64>,
    /// Where the coefficients came from (data set, date, fit parameters)
    #[serde(default)]
    pub provenance: String,
}

impl Polynomial {
    pub fn new(coefficients: Vec<f64>, provenance: impl Into<String>) -> Self {
        Self {
            coefficients,
            provenance: provenance.into(),
        }
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    /// Horner evaluation
    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * x + c)
    }

    /// Least-squares fit of `y ~ c0 + c1*x + ... + cd*x^d` over `(x, y)` points.
    pub fn fit(points: &[(f64, f64)], degree: usize) -> Result<Self> {
        let cols = degree + 1;
        if points.len() < cols {
            return Err(RankError::Fit(format!(
                "need at least {} points for degree {}, got {}",
                cols,
                degree,
                points.len()
            )));
        }
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(RankError::Fit("non-finite input point".to_string()));
        }

        let design = DMatrix::from_fn(points.len(), cols, |i, j| points[i].0.powi(j as i32));
        let targets = DVector::from_iterator(points.len(), points.iter().map(|p| p.1));

        let beta = design
            .svd(true, true)
            .solve(&targets, 1e-12)
            .map_err(|e| RankError::Fit(e.to_string()))?;

        Ok(Self::new(
            beta.iter().copied().collect(),
            format!("least squares, degree {}, {} points", degree, points.len()),
        ))
    }
}

/// Both regression strategies plus the one `search` attaches by default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriesPredictor {
    #[serde(default)]
    pub default_strategy: PredictStrategy,
    #[serde(default = "default_likely")]
    pub likely: Polynomial,
    #[serde(default = "default_inclusive")]
    pub inclusive: Polynomial,
}

fn default_likely() -> Polynomial {
    Polynomial::new(
        vec![-391522.073409, 20015.215713, 2713.500203, 43.268947, 0.198609],
        "rank ~ log2_prob, degree 4, fitted on the combined 000webhost/ignis-1M/myspace/hotmail \
corpus excluding floor-substituted passwords",
    )
}

fn default_inclusive() -> Polynomial {
    Polynomial::new(
        vec![-1.361021e6, -7.556119e4, -4.919591e2],
        "rank ~ log2_prob, degree 2, fitted on the combined 000webhost/ignis-1M/myspace/hotmail \
corpus including floor-substituted passwords",
    )
}

impl Default for TriesPredictor {
    fn default() -> Self {
        Self {
            default_strategy: PredictStrategy::default(),
            likely: default_likely(),
            inclusive: default_inclusive(),
        }
    }
}

impl TriesPredictor {
    pub fn polynomial(&self, strategy: PredictStrategy) -> &Polynomial {
        match strategy {
            PredictStrategy::Likely => &self.likely,
            PredictStrategy::Inclusive => &self.inclusive,
        }
    }

    pub fn set_polynomial(&mut self, strategy: PredictStrategy, polynomial: Polynomial) {
        match strategy {
            PredictStrategy::Likely => self.likely = polynomial,
            PredictStrategy::Inclusive => self.inclusive = polynomial,
        }
    }

    /// Estimated guesses for a password with the given log2 probability. Never below 1.
    pub fn predict(&self, log2_probability: f64, strategy: PredictStrategy) -> u64 {
        let tries = self.polynomial(strategy).evaluate(log2_probability).trunc();
        if tries >= 1.0 {
            tries as u64
        } else {
            1
        }
    }
}
