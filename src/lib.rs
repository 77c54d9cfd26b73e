//! pwrank - Markov-chain password guessability ranking
//!
//! A character-level Markov model scores passwords by chain-rule probability.
//! A corpus of known passwords is kept sorted by that probability, so a
//! password's rank is the number of guesses an attacker trying the most likely
//! passwords first would need.

pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod markov;
pub mod predict;
pub mod session;
pub mod snapshot;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{RankError, Result};
