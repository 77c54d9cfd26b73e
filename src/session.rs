//! Interactive session
//!
//! A session accumulates one result row per submitted password. Each
//! submission either inserts the password first (so it is guaranteed to be
//! found) or searches the corpus as it stands. A failed submission leaves the
//! accumulated rows untouched and reports why in the status line.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::engine::Engine;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitMode {
    #[default]
    InsertFirst,
    AsIs,
}

impl SubmitMode {
    pub fn status_message(&self) -> &'static str {
        match self {
            SubmitMode::InsertFirst => "The password is now guaranteed to be found.",
            SubmitMode::AsIs => "The password MAY not be found.",
        }
    }
}

impl fmt::Display for SubmitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitMode::InsertFirst => write!(f, "insert"),
            SubmitMode::AsIs => write!(f, "as-is"),
        }
    }
}

impl FromStr for SubmitMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" | "insert-first" => Ok(SubmitMode::InsertFirst),
            "as-is" | "asis" | "search" => Ok(SubmitMode::AsIs),
            _ => Err(format!("unknown submit mode: {} (expected insert or as-is)", s)),
        }
    }
}

/// One line of the session's results table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    /// 1-based submission number
    #[serde(rename = "Result")]
    pub result: usize,
    #[serde(rename = "pwd")]
    pub password: String,
    pub found: bool,
    pub predicted_tries: u64,
    /// Rank in the corpus, or corpus size + 1 when absent
    pub actual_tries: usize,
}

/// Rows after a submission plus the line to show the user
#[derive(Debug)]
pub struct Submission<'a> {
    pub rows: &'a [ResultRow],
    pub status: String,
    pub accepted: bool,
}

pub struct Session<'e> {
    engine: &'e Engine,
    rows: Vec<ResultRow>,
}

impl<'e> Session<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            rows: Vec::new(),
        }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn submit(&mut self, raw: &str, mode: SubmitMode) -> Submission<'_> {
        match self.evaluate(raw, mode) {
            Ok(row) => {
                self.rows.push(row);
                Submission {
                    rows: &self.rows,
                    status: mode.status_message().to_string(),
                    accepted: true,
                }
            }
            Err(e) => {
                tracing::warn!("Submission failed: {}", e);
                Submission {
                    rows: &self.rows,
                    status: format!("Could not process the password: {}", e),
                    accepted: false,
                }
            }
        }
    }

    fn evaluate(&self, raw: &str, mode: SubmitMode) -> Result<ResultRow> {
        if mode == SubmitMode::InsertFirst {
            self.engine.insert_password(raw)?;
        }
        let result = self.engine.search(raw)?;
        Ok(ResultRow {
            result: self.rows.len() + 1,
            password: result.password,
            found: result.found,
            predicted_tries: result.predicted_tries,
            actual_tries: result.rank,
        })
    }
}
