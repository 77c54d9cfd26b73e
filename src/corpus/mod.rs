//! Ranked password corpus
//!
//! Ingests raw password lists, scores them with the Markov model and keeps them
//! in probability-first guessing order.

pub mod features;
pub mod ingest;
mod store;

pub use features::Features;
pub use ingest::{ingest_files, read_tokens, training_text, IngestReport};
pub use store::{
    establish_order, FloorPolicy, InsertOutcome, PasswordRecord, RankedCorpus, RankedRecord,
    SearchResult, DEFAULT_FLOOR, DEFAULT_FLOOR_SCALE,
};
