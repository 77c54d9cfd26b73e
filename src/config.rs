//! Engine configuration
//!
//! Loaded from the first of:
//! 1. an explicit `--config <path>`
//! 2. `./pwrank.toml`
//! 3. `~/.config/pwrank/config.toml`
//!
//! Missing files fall back to defaults. `PWRANK_DATA_DIR` overrides the
//! snapshot directory.
//!
//! ```toml
//! [model]
//! order = 2
//! epsilon = 1e-5
//! unseen = "uniform"
//!
//! [corpus]
//! floor_scale = 0.1
//! default_token = "abc-default-pwd"
//! shuffle_seed = 42
//!
//! [snapshot]
//! dir = "/var/lib/pwrank"
//! autosave = true
//!
//! [regression]
//! default_strategy = "likely"
//!
//! [regression.likely]
//! coefficients = [-391522.073409, 20015.215713, 2713.500203, 43.268947, 0.198609]
//! provenance = "fitted 2026-01-04 on combined corpus"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::corpus::{FloorPolicy, DEFAULT_FLOOR, DEFAULT_FLOOR_SCALE};
use crate::error::{RankError, Result};
use crate::markov::{SmoothingPolicy, UnseenGramPolicy, DEFAULT_EPSILON};
use crate::predict::TriesPredictor;
use crate::snapshot::SnapshotPaths;

pub const CONFIG_FILENAME: &str = "pwrank.toml";
pub const DATA_DIR_ENV: &str = "PWRANK_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Markov order k
    pub order: usize,
    /// Substitute for zero counts in the chain-rule product
    pub epsilon: f64,
    pub unseen: UnseenGramPolicy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            order: 2,
            epsilon: DEFAULT_EPSILON,
            unseen: UnseenGramPolicy::default(),
        }
    }
}

impl ModelConfig {
    pub fn smoothing(&self) -> SmoothingPolicy {
        SmoothingPolicy {
            epsilon: self.epsilon,
            unseen: self.unseen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub floor_scale: f64,
    pub default_floor: f64,
    /// Replaces query input that is too short after whitespace removal
    pub default_token: String,
    pub min_input_len: usize,
    /// Reproducible shuffle of ingested passwords
    pub shuffle_seed: Option<u64>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            floor_scale: DEFAULT_FLOOR_SCALE,
            default_floor: DEFAULT_FLOOR,
            default_token: "abc-default-pwd".to_string(),
            min_input_len: 2,
            shuffle_seed: None,
        }
    }
}

impl CorpusConfig {
    pub fn floor_policy(&self) -> FloorPolicy {
        FloorPolicy {
            scale: self.floor_scale,
            default_floor: self.default_floor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Data directory (default: platform data dir + /pwrank)
    pub dir: Option<PathBuf>,
    pub model_file: String,
    pub corpus_file: String,
    pub manifest_file: String,
    /// Persist the corpus after every insert
    pub autosave: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            dir: None,
            model_file: "markov.bin".to_string(),
            corpus_file: "combined-data.csv".to_string(),
            manifest_file: "manifest.json".to_string(),
            autosave: false,
        }
    }
}

impl SnapshotConfig {
    pub fn data_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|d| d.join("pwrank"))
                .unwrap_or_else(|| PathBuf::from(".pwrank"))
        })
    }

    pub fn paths(&self) -> SnapshotPaths {
        SnapshotPaths::in_dir(
            &self.data_dir(),
            &self.model_file,
            &self.corpus_file,
            &self.manifest_file,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub model: ModelConfig,
    pub corpus: CorpusConfig,
    pub snapshot: SnapshotConfig,
    pub regression: TriesPredictor,
}

impl EngineConfig {
    /// Load with the discovery order described in the module docs.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => Self::discover(),
        };

        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                config.snapshot.dir = Some(PathBuf::from(dir));
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn discover() -> Self {
        let candidates = [
            Some(PathBuf::from(CONFIG_FILENAME)),
            Self::user_config_path(),
        ];
        for path in candidates.into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            match Self::from_file(&path) {
                Ok(config) => {
                    debug!("Loaded config from {}", path.display());
                    return config;
                }
                Err(e) => warn!("Failed to load {}: {}", path.display(), e),
            }
        }
        debug!("No config found, using defaults");
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// `~/.config/pwrank/config.toml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pwrank").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(RankError::Config(msg));
        if self.model.order == 0 {
            return invalid("model.order must be at least 1".to_string());
        }
        if !(self.model.epsilon > 0.0) {
            return invalid(format!("model.epsilon must be positive, got {}", self.model.epsilon));
        }
        if !(self.corpus.floor_scale > 0.0) {
            return invalid(format!(
                "corpus.floor_scale must be positive, got {}",
                self.corpus.floor_scale
            ));
        }
        if !(self.corpus.default_floor > 0.0) {
            return invalid(format!(
                "corpus.default_floor must be positive, got {}",
                self.corpus.default_floor
            ));
        }
        if self.corpus.default_token.chars().count() < self.corpus.min_input_len {
            return invalid(format!(
                "corpus.default_token {:?} is shorter than corpus.min_input_len",
                self.corpus.default_token
            ));
        }
        Ok(())
    }
}
