//! Snapshot persistence
//!
//! Three files live side by side in the data directory:
//! - the Markov model, an opaque bitcode blob (`markov.bin`)
//! - the ranked table, a CSV with one record per line (`combined-data.csv`)
//! - a JSON manifest with build provenance and the exact floor probability
//!
//! The table can be read and written without the model. Loading reproduces
//! every query result bit for bit.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::corpus::{FloorPolicy, PasswordRecord, RankedCorpus};
use crate::error::{RankError, Result};
use crate::markov::{MarkovModel, SmoothingPolicy, UnseenGramPolicy};

/// Column order of the corpus table
pub const CORPUS_COLUMNS: [&str; 10] = [
    "password",
    "length",
    "upperCase",
    "lowerCase",
    "numbers",
    "specialChars",
    "vowels",
    "probability",
    "log2Prob",
    "rank",
];

const MODEL_VERSION: u32 = 1;

/// Serialized model layout. Maps are flattened to sorted vectors so equal
/// models encode to equal bytes.
#[derive(Serialize, Deserialize)]
struct ModelSnapshot {
    version: u32,
    order: u64,
    epsilon: f64,
    unseen: UnseenGramPolicy,
    alphabet: Vec<u32>,
    kgrams: Vec<(String, u64)>,
    transitions: Vec<(String, Vec<(u32, u64)>)>,
}

impl ModelSnapshot {
    fn from_model(model: &MarkovModel) -> Self {
        let mut kgrams: Vec<(String, u64)> = model
            .kgram_counts()
            .iter()
            .map(|(g, &c)| (g.clone(), c))
            .collect();
        kgrams.sort_unstable();

        let mut transitions: Vec<(String, Vec<(u32, u64)>)> = model
            .transitions()
            .iter()
            .map(|(g, nexts)| {
                let mut nexts: Vec<(u32, u64)> =
                    nexts.iter().map(|(&c, &n)| (c as u32, n)).collect();
                nexts.sort_unstable();
                (g.clone(), nexts)
            })
            .collect();
        transitions.sort_unstable();

        let policy = model.policy();
        Self {
            version: MODEL_VERSION,
            order: model.order() as u64,
            epsilon: policy.epsilon,
            unseen: policy.unseen,
            alphabet: model.alphabet().iter().map(|&c| c as u32).collect(),
            kgrams,
            transitions,
        }
    }

    fn into_model(self) -> std::result::Result<MarkovModel, String> {
        if self.version != MODEL_VERSION {
            return Err(format!(
                "model snapshot version {} (expected {})",
                self.version, MODEL_VERSION
            ));
        }
        let to_char = |c: u32| char::from_u32(c).ok_or_else(|| format!("invalid char {:#x}", c));

        let alphabet = self
            .alphabet
            .into_iter()
            .map(to_char)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let kgrams: FxHashMap<String, u64> = self.kgrams.into_iter().collect();
        let mut transitions: FxHashMap<String, FxHashMap<char, u64>> = FxHashMap::default();
        for (gram, nexts) in self.transitions {
            let slot = transitions.entry(gram).or_default();
            for (c, n) in nexts {
                slot.insert(to_char(c)?, n);
            }
        }

        let policy = SmoothingPolicy {
            epsilon: self.epsilon,
            unseen: self.unseen,
        };
        MarkovModel::from_parts(self.order as usize, kgrams, transitions, alphabet, policy)
    }
}

/// One row of the corpus table
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CorpusRow {
    password: String,
    length: u32,
    upper_case: u32,
    lower_case: u32,
    numbers: u32,
    special_chars: u32,
    vowels: u32,
    probability: f64,
    log2_prob: f64,
    rank: usize,
}

impl CorpusRow {
    fn from_record(rank: usize, r: &PasswordRecord) -> Self {
        Self {
            password: r.password.clone(),
            length: r.features.length,
            upper_case: r.features.upper_case,
            lower_case: r.features.lower_case,
            numbers: r.features.numbers,
            special_chars: r.features.special_chars,
            vowels: r.features.vowels,
            probability: r.probability,
            log2_prob: r.log2_probability,
            rank,
        }
    }

    /// Only the password and probability are trusted; features, log2 and
    /// rank are derived again.
    fn into_record(self) -> std::result::Result<PasswordRecord, String> {
        if !(self.probability > 0.0 && self.probability <= 1.0) {
            return Err(format!("probability {} outside (0, 1]", self.probability));
        }
        Ok(PasswordRecord::new(self.password, self.probability, false))
    }
}

/// Build metadata written next to the snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub generated_at: String,
    pub order: usize,
    pub records: usize,
    pub floor_probability: f64,
    #[serde(default)]
    pub skipped_rows: usize,
    #[serde(default)]
    pub sources: Vec<PathBuf>,
}

impl Manifest {
    pub const VERSION: u32 = 1;

    /// Manifest describing the current state of `corpus`.
    pub fn describe(corpus: &RankedCorpus, sources: Vec<PathBuf>, skipped_rows: usize) -> Self {
        Self {
            version: Self::VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            order: corpus.model().order(),
            records: corpus.len(),
            floor_probability: corpus.floor_probability(),
            skipped_rows,
            sources,
        }
    }

    /// Same provenance, refreshed counts after the corpus changed.
    pub fn refreshed(&self, corpus: &RankedCorpus) -> Self {
        Self::describe(corpus, self.sources.clone(), self.skipped_rows)
    }
}

/// Locations of the three snapshot files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub model: PathBuf,
    pub corpus: PathBuf,
    pub manifest: PathBuf,
}

impl SnapshotPaths {
    pub fn in_dir(dir: &Path, model_file: &str, corpus_file: &str, manifest_file: &str) -> Self {
        Self {
            model: dir.join(model_file),
            corpus: dir.join(corpus_file),
            manifest: dir.join(manifest_file),
        }
    }
}

impl SnapshotPaths {
    fn all(&self) -> [&Path; 3] {
        [&self.model, &self.corpus, &self.manifest]
    }

    /// Snapshot files present on disk
    pub fn existing(&self) -> Vec<PathBuf> {
        self.all()
            .into_iter()
            .filter(|p| p.exists())
            .map(Path::to_path_buf)
            .collect()
    }
}

/// Suffix appended to snapshot files that could not be loaded
pub const QUARANTINE_SUFFIX: &str = "corrupt";

/// Where `path` is moved when its snapshot cannot be loaded.
pub fn quarantine_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(QUARANTINE_SUFFIX);
    PathBuf::from(name)
}

/// Move every existing snapshot file to `<file>.corrupt`.
///
/// Nothing is moved if any target already exists, so an earlier quarantine is
/// never clobbered. Returns the new locations.
pub fn quarantine(paths: &SnapshotPaths) -> Result<Vec<PathBuf>> {
    let existing = paths.existing();
    for path in &existing {
        let target = quarantine_path(path);
        if target.exists() {
            return Err(RankError::SnapshotBlocked(format!(
                "{} cannot be moved aside, {} already exists",
                path.display(),
                target.display()
            )));
        }
    }

    let mut moved = Vec::with_capacity(existing.len());
    for path in existing {
        let target = quarantine_path(&path);
        std::fs::rename(&path, &target)?;
        tracing::warn!("Moved unreadable snapshot {} to {}", path.display(), target.display());
        moved.push(target);
    }
    Ok(moved)
}

/// Corpus table rows read from disk
#[derive(Debug, Default)]
pub struct LoadedTable {
    pub records: Vec<PasswordRecord>,
    /// Rows dropped for a wrong column count, unparsable values or a
    /// probability outside (0, 1]
    pub skipped: usize,
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Write via a temp file and rename so readers never see a half-written snapshot.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn require(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(RankError::MissingSnapshot {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

pub fn save_model(model: &MarkovModel, path: &Path) -> Result<()> {
    let bytes = bitcode::serialize(&ModelSnapshot::from_model(model))
        .map_err(|e| RankError::Encode(e.to_string()))?;
    write_atomic(path, &bytes)?;
    tracing::debug!("Saved model snapshot ({} bytes) to {}", bytes.len(), path.display());
    Ok(())
}

pub fn load_model(path: &Path) -> Result<MarkovModel> {
    require(path)?;
    let bytes = std::fs::read(path)?;
    let corrupt = |reason: String| RankError::CorruptSnapshot {
        path: path.to_path_buf(),
        reason,
    };
    let snapshot: ModelSnapshot =
        bitcode::deserialize(&bytes).map_err(|e| corrupt(e.to_string()))?;
    snapshot.into_model().map_err(corrupt)
}

pub fn save_corpus(records: &[PasswordRecord], path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let tmp = path.with_extension("tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        for (i, record) in records.iter().enumerate() {
            writer.serialize(CorpusRow::from_record(i + 1, record))?;
        }
        if records.is_empty() {
            writer.write_record(CORPUS_COLUMNS)?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    tracing::debug!("Saved {} corpus rows to {}", records.len(), path.display());
    Ok(())
}

pub fn load_corpus(path: &Path) -> Result<LoadedTable> {
    require(path)?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;

    let headers = reader.headers()?.clone();
    if headers.iter().ne(CORPUS_COLUMNS.iter().copied()) {
        return Err(RankError::CorruptSnapshot {
            path: path.to_path_buf(),
            reason: format!("unexpected header {:?}", headers.iter().collect::<Vec<_>>()),
        });
    }

    let mut table = LoadedTable::default();
    for (idx, row) in reader.records().enumerate() {
        let parsed = row
            .map_err(|e| e.to_string())
            .and_then(|row| {
                if row.len() != CORPUS_COLUMNS.len() {
                    return Err(format!(
                        "expected {} columns, found {}",
                        CORPUS_COLUMNS.len(),
                        row.len()
                    ));
                }
                row.deserialize::<CorpusRow>(Some(&headers))
                    .map_err(|e| e.to_string())
            })
            .and_then(CorpusRow::into_record);

        match parsed {
            Ok(record) => table.records.push(record),
            Err(reason) => {
                let err = RankError::MalformedInputRow {
                    source_name: path.display().to_string(),
                    line: idx + 2,
                    reason,
                };
                tracing::debug!("{}", err);
                table.skipped += 1;
            }
        }
    }

    if table.skipped > 0 {
        tracing::warn!(
            "Skipped {} malformed row(s) in {}",
            table.skipped,
            path.display()
        );
    }
    Ok(table)
}

pub fn save_manifest(manifest: &Manifest, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest)?;
    write_atomic(path, json.as_bytes())
}

/// Missing or unreadable manifests are not fatal: the floor is then derived from the table.
pub fn load_manifest(path: &Path) -> Option<Manifest> {
    let data = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<Manifest>(&data) {
        Ok(manifest) if manifest.version == Manifest::VERSION => Some(manifest),
        Ok(manifest) => {
            tracing::warn!(
                "Manifest version mismatch ({} vs {}), ignoring",
                manifest.version,
                Manifest::VERSION
            );
            None
        }
        Err(e) => {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            None
        }
    }
}

/// Persist model, table and manifest.
pub fn save_snapshot(corpus: &RankedCorpus, manifest: &Manifest, paths: &SnapshotPaths) -> Result<()> {
    save_model(corpus.model(), &paths.model)?;
    save_corpus(corpus.records(), &paths.corpus)?;
    save_manifest(manifest, &paths.manifest)?;
    tracing::info!(
        "Saved snapshot: {} records, model order {}",
        corpus.len(),
        corpus.model().order()
    );
    Ok(())
}

/// Load model, table and (optionally) manifest back into a ranked corpus.
pub fn load_snapshot(
    paths: &SnapshotPaths,
    floor_policy: FloorPolicy,
) -> Result<(RankedCorpus, Option<Manifest>)> {
    let model = load_model(&paths.model)?;
    let table = load_corpus(&paths.corpus)?;
    let manifest = load_manifest(&paths.manifest);

    if let Some(m) = &manifest {
        if m.order != model.order() {
            tracing::warn!(
                "Manifest order {} does not match model order {}",
                m.order,
                model.order()
            );
        }
    }

    let floor = manifest.as_ref().map(|m| m.floor_probability);
    let corpus = RankedCorpus::from_records(model, table.records, floor, floor_policy);
    tracing::info!(
        "Loaded snapshot: {} records, model order {}",
        corpus.len(),
        corpus.model().order()
    );
    Ok((corpus, manifest))
}
