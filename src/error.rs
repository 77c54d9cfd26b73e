//! Error taxonomy for the ranking engine

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building, querying or persisting the engine
#[derive(Error, Debug)]
pub enum RankError {
    #[error("Invalid model order {order}: must be in 1..{text_len} for a training text of {text_len} characters")]
    InvalidOrder { order: usize, text_len: usize },

    #[error("Wrong k-gram length: expected {expected} characters, got {actual}")]
    WrongGramLength { expected: usize, actual: usize },

    #[error("Cannot sample after unseen k-gram {gram:?}")]
    UnseenGram { gram: String },

    #[error("Snapshot not found: {}", path.display())]
    MissingSnapshot { path: PathBuf },

    #[error("Malformed row {line} in {source_name}: {reason}")]
    MalformedInputRow {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("Corrupt snapshot {}: {reason}", path.display())]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("Snapshot encoding failed: {0}")]
    Encode(String),

    #[error("Refusing to overwrite snapshot: {0}")]
    SnapshotBlocked(String),

    #[error("Regression fit failed: {0}")]
    Fit(String),

    #[error("Corpus state poisoned by a panicking writer")]
    StatePoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RankError>;
