//! Raw corpus ingestion
//!
//! Input files hold one password per line. Whitespace separates fields, so a
//! line with more than one field (or one that is not valid UTF-8) is malformed:
//! it is logged, counted and skipped. Blank lines are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{RankError, Result};

/// Passwords gathered from one or more sources
#[derive(Debug, Default)]
pub struct IngestReport {
    pub passwords: Vec<String>,
    /// Malformed rows skipped across all sources
    pub skipped: usize,
    pub sources: Vec<PathBuf>,
}

/// Read every source, concatenate and shuffle.
///
/// With `shuffle_seed` the order is reproducible; without it the thread RNG is used.
pub fn ingest_files(paths: &[PathBuf], shuffle_seed: Option<u64>) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for path in paths {
        let skipped = ingest_file(path, &mut report.passwords)?;
        report.skipped += skipped;
        report.sources.push(path.clone());
    }

    match shuffle_seed {
        Some(seed) => report.passwords.shuffle(&mut ChaCha8Rng::seed_from_u64(seed)),
        None => report.passwords.shuffle(&mut rand::rng()),
    }

    tracing::info!(
        "Ingested {} passwords from {} source(s), skipped {} malformed row(s)",
        report.passwords.len(),
        report.sources.len(),
        report.skipped
    );
    Ok(report)
}

fn ingest_file(path: &Path, out: &mut Vec<String>) -> Result<usize> {
    let file = File::open(path)?;
    read_tokens(BufReader::new(file), &path.display().to_string(), out)
}

/// Append one token per well-formed line to `out`. Returns the number of skipped rows.
pub fn read_tokens<R: BufRead>(reader: R, source_name: &str, out: &mut Vec<String>) -> Result<usize> {
    let mut skipped = 0;
    for (idx, line) in reader.split(b'\n').enumerate() {
        let bytes = line?;
        match parse_row(&bytes) {
            Ok(Some(token)) => out.push(token),
            Ok(None) => {}
            Err(reason) => {
                let err = RankError::MalformedInputRow {
                    source_name: source_name.to_string(),
                    line: idx + 1,
                    reason,
                };
                tracing::debug!("{}", err);
                skipped += 1;
            }
        }
    }
    Ok(skipped)
}

fn parse_row(bytes: &[u8]) -> std::result::Result<Option<String>, String> {
    let line = std::str::from_utf8(bytes).map_err(|_| "not valid UTF-8".to_string())?;
    let mut fields = line.split_whitespace();
    match (fields.next(), fields.next()) {
        (None, _) => Ok(None),
        (Some(token), None) => Ok(Some(token.to_string())),
        (Some(_), Some(_)) => Err(format!(
            "expected 1 field, found {}",
            line.split_whitespace().count()
        )),
    }
}

/// Training text for the Markov model: every password followed by a space.
pub fn training_text<S: AsRef<str>>(passwords: &[S]) -> String {
    let mut text = String::with_capacity(passwords.iter().map(|p| p.as_ref().len() + 1).sum());
    for password in passwords {
        text.push_str(password.as_ref());
        text.push(' ');
    }
    text
}
