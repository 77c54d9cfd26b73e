//! Query engine
//!
//! Owns the ranked corpus behind a reader/writer lock. The engine starts
//! uninitialized; the first query runs a single initialization that loads the
//! snapshots or, if they are missing or unreadable, falls back to an empty
//! corpus with a placeholder model. Callers never see a half-built state.
//!
//! Inserts serialize on the write lock; searches and reads share the read lock.

use std::path::PathBuf;
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::corpus::{
    ingest_files, training_text, InsertOutcome, PasswordRecord, RankedCorpus, RankedRecord,
    SearchResult,
};
use crate::error::{RankError, Result};
use crate::markov::MarkovModel;
use crate::predict::{Polynomial, PredictStrategy, TriesPredictor};
use crate::snapshot::{load_snapshot, quarantine, save_snapshot, Manifest, SnapshotPaths};

/// Training text and order of the placeholder model used when no snapshot exists
const PLACEHOLDER_TEXT: &str = "   ";
const PLACEHOLDER_ORDER: usize = 2;

/// Where the current corpus came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Loaded from snapshots
    Snapshot,
    /// No snapshot on disk; empty corpus and placeholder model
    Fallback,
    /// Snapshot unreadable and moved aside; empty corpus and placeholder model
    Quarantined,
    /// Snapshot unreadable and could not be moved aside; writes are refused
    Unreadable,
    /// Built from raw corpus files in this process
    Built,
}

struct Ready {
    corpus: RankedCorpus,
    manifest: Manifest,
    origin: Origin,
    /// Files moved aside during initialization
    quarantined: Vec<PathBuf>,
    /// Set when writing a snapshot would clobber files we could not load
    persist_blocked: Option<String>,
}

impl Ready {
    fn new(corpus: RankedCorpus, manifest: Manifest, origin: Origin) -> Self {
        Self {
            corpus,
            manifest,
            origin,
            quarantined: Vec::new(),
            persist_blocked: None,
        }
    }
}

/// Summary of the engine's current state
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub origin: Origin,
    pub records: usize,
    pub order: usize,
    pub distinct_kgrams: usize,
    pub alphabet_size: usize,
    pub total_observations: u64,
    pub floor_probability: f64,
    pub skipped_rows: usize,
    pub sources: Vec<PathBuf>,
    pub data_dir: PathBuf,
    pub quarantined: Vec<PathBuf>,
    pub persist_blocked: Option<String>,
}

pub struct Engine {
    config: EngineConfig,
    paths: SnapshotPaths,
    state: OnceLock<RwLock<Ready>>,
}

impl Engine {
    /// Engine that lazily loads its snapshots on first use.
    pub fn new(config: EngineConfig) -> Self {
        let paths = config.snapshot.paths();
        Self {
            config,
            paths,
            state: OnceLock::new(),
        }
    }

    /// Build a fresh corpus and model from raw password files.
    ///
    /// The model is trained on the shuffled corpus itself; window counting and
    /// scoring run on the rayon pool.
    pub fn build(config: EngineConfig, files: &[PathBuf]) -> Result<Self> {
        let report = ingest_files(files, config.corpus.shuffle_seed)?;
        let text = training_text(&report.passwords);
        let shards = rayon::current_num_threads();

        let model = MarkovModel::build_parallel(&text, config.model.order, shards)?
            .with_policy(config.model.smoothing());
        let corpus = RankedCorpus::build(report.passwords, model, config.corpus.floor_policy());
        let manifest = Manifest::describe(&corpus, report.sources, report.skipped);

        Ok(Self::initialized(config, Ready::new(corpus, manifest, Origin::Built)))
    }

    /// Engine over an existing corpus, already initialized.
    pub fn with_corpus(config: EngineConfig, corpus: RankedCorpus) -> Self {
        let manifest = Manifest::describe(&corpus, Vec::new(), 0);
        Self::initialized(config, Ready::new(corpus, manifest, Origin::Built))
    }

    fn initialized(config: EngineConfig, ready: Ready) -> Self {
        let paths = config.snapshot.paths();
        Self {
            config,
            paths,
            state: OnceLock::from(RwLock::new(ready)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn predictor(&self) -> &TriesPredictor {
        &self.config.regression
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    fn ready(&self) -> &RwLock<Ready> {
        self.state.get_or_init(|| RwLock::new(self.initialize()))
    }

    fn initialize(&self) -> Ready {
        let floor_policy = self.config.corpus.floor_policy();
        let load_error = match load_snapshot(&self.paths, floor_policy) {
            Ok((corpus, manifest)) => {
                let manifest = manifest.unwrap_or_else(|| Manifest::describe(&corpus, Vec::new(), 0));
                return Ready::new(corpus, manifest, Origin::Snapshot);
            }
            Err(e) => e,
        };

        let corpus = RankedCorpus::empty(self.placeholder_model(), floor_policy);
        let manifest = Manifest::describe(&corpus, Vec::new(), 0);
        let mut ready = Ready::new(corpus, manifest, Origin::Fallback);

        // Anything left on disk must survive the next persist
        if self.paths.existing().is_empty() {
            tracing::warn!("{}; starting with an empty corpus", load_error);
            return ready;
        }
        tracing::error!(
            "Failed to load snapshot: {}; starting with an empty corpus",
            load_error
        );
        match quarantine(&self.paths) {
            Ok(moved) => {
                ready.origin = Origin::Quarantined;
                ready.quarantined = moved;
            }
            Err(e) => {
                tracing::error!("{}; snapshot writes disabled", e);
                ready.origin = Origin::Unreadable;
                ready.persist_blocked = Some(format!("{} ({})", load_error, e));
            }
        }
        ready
    }

    fn save(&self, state: &mut Ready) -> Result<()> {
        if let Some(reason) = &state.persist_blocked {
            return Err(RankError::SnapshotBlocked(reason.clone()));
        }
        state.manifest = state.manifest.refreshed(&state.corpus);
        save_snapshot(&state.corpus, &state.manifest, &self.paths)
    }

    fn placeholder_model(&self) -> MarkovModel {
        MarkovModel::build(PLACEHOLDER_TEXT, PLACEHOLDER_ORDER)
            .expect("placeholder text is longer than the placeholder order")
            .with_policy(self.config.model.smoothing())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Ready>> {
        self.ready().read().map_err(|_| RankError::StatePoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Ready>> {
        self.ready().write().map_err(|_| RankError::StatePoisoned)
    }

    /// Strip all whitespace; too-short input becomes the configured default token.
    pub fn normalize_input(&self, raw: &str) -> String {
        let cleaned: String = raw.split_whitespace().collect();
        if cleaned.chars().count() < self.config.corpus.min_input_len {
            self.config.corpus.default_token.clone()
        } else {
            cleaned
        }
    }

    /// Add a password to the corpus. With `snapshot.autosave` the snapshot is rewritten.
    pub fn insert_password(&self, raw: &str) -> Result<InsertOutcome> {
        let password = self.normalize_input(raw);
        let mut state = self.write()?;
        let outcome = state.corpus.insert_password(&password);
        tracing::debug!("Insert {:?}: {:?}", password, outcome);

        if self.config.snapshot.autosave && matches!(outcome, InsertOutcome::Inserted { .. }) {
            self.save(&mut state)?;
        }
        Ok(outcome)
    }

    pub fn search(&self, raw: &str) -> Result<SearchResult> {
        let password = self.normalize_input(raw);
        let state = self.read()?;
        Ok(state.corpus.search(&password, self.predictor()))
    }

    /// Guess estimate; `None` uses the configured default strategy.
    pub fn predict_tries(&self, raw: &str, strategy: Option<PredictStrategy>) -> Result<u64> {
        let password = self.normalize_input(raw);
        let strategy = strategy.unwrap_or(self.predictor().default_strategy);
        let state = self.read()?;
        Ok(state.corpus.predict_tries(&password, self.predictor(), strategy))
    }

    /// Owned copy of the ranked table.
    pub fn get_data(&self) -> Result<Vec<RankedRecord>> {
        Ok(self.read()?.corpus.get_data())
    }

    /// Borrow the ranked table under the read lock.
    pub fn with_data<T>(&self, f: impl FnOnce(&[PasswordRecord]) -> T) -> Result<T> {
        let state = self.read()?;
        Ok(f(state.corpus.records()))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.corpus.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Sample `len` characters from the model starting at context `gram`.
    pub fn generate(&self, gram: &str, len: usize, seed: Option<u64>) -> Result<String> {
        let rng = ChaCha8Rng::seed_from_u64(seed.unwrap_or_else(rand::random));
        let state = self.read()?;
        state.corpus.model().generate(gram, len, rng)
    }

    /// Fit a strategy's regression against the current ranks.
    pub fn fit(&self, strategy: PredictStrategy, degree: usize) -> Result<Polynomial> {
        let points = self.read()?.corpus.regression_points(strategy);
        let mut polynomial = Polynomial::fit(&points, degree)?;
        polynomial.provenance = format!(
            "rank ~ log2_prob, {} strategy, {}, fitted {}",
            strategy,
            polynomial.provenance,
            chrono::Utc::now().format("%Y-%m-%d")
        );
        Ok(polynomial)
    }

    /// Write model, table and manifest to the data directory.
    pub fn persist(&self) -> Result<Manifest> {
        let mut state = self.write()?;
        self.save(&mut state)?;
        Ok(state.manifest.clone())
    }

    pub fn stats(&self) -> Result<EngineStats> {
        let state = self.read()?;
        let model = state.corpus.model();
        Ok(EngineStats {
            origin: state.origin,
            records: state.corpus.len(),
            order: model.order(),
            distinct_kgrams: model.distinct_kgrams(),
            alphabet_size: model.alphabet().len(),
            total_observations: model.total_observations(),
            floor_probability: state.corpus.floor_probability(),
            skipped_rows: state.manifest.skipped_rows,
            sources: state.manifest.sources.clone(),
            data_dir: self.config.snapshot.data_dir(),
            quarantined: state.quarantined.clone(),
            persist_blocked: state.persist_blocked.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::quarantine_path;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn config_in(dir: &std::path::Path) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.snapshot.dir = Some(dir.to_path_buf());
        config.corpus.shuffle_seed = Some(1);
        config
    }

    fn write_corpus(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("leak.txt");
        std::fs::write(
            &path,
            "123456\npassword\nqwerty\nletmein\ndragon\nmonkey\npassword\n123456\nsunshine\nbad line\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_lazy_fallback_when_no_snapshot() {
        let dir = tempdir().unwrap();
        let engine = Engine::new(config_in(dir.path()));
        assert!(!engine.is_initialized());

        assert_eq!(engine.len().unwrap(), 0);
        assert!(engine.is_initialized());

        let stats = engine.stats().unwrap();
        assert_eq!(stats.origin, Origin::Fallback);
        assert_eq!(stats.order, PLACEHOLDER_ORDER);

        let result = engine.search("anything").unwrap();
        assert!(!result.found);
        assert_eq!(result.rank, 1);
    }

    #[test]
    fn test_build_persist_reload() {
        let dir = tempdir().unwrap();
        let file = write_corpus(dir.path());
        let engine = Engine::build(config_in(dir.path()), &[file.clone()]).unwrap();

        assert_eq!(engine.len().unwrap(), 7);
        let stats = engine.stats().unwrap();
        assert_eq!(stats.origin, Origin::Built);
        assert_eq!(stats.skipped_rows, 1);
        assert_eq!(stats.sources, vec![file]);

        let before = engine.search("password").unwrap();
        assert!(before.found);
        engine.persist().unwrap();

        let reloaded = Engine::new(config_in(dir.path()));
        assert_eq!(reloaded.stats().unwrap().origin, Origin::Snapshot);
        assert_eq!(reloaded.get_data().unwrap(), engine.get_data().unwrap());
        for query in ["password", "dragon", "nothere", "x"] {
            assert_eq!(reloaded.search(query).unwrap(), engine.search(query).unwrap());
        }
    }

    #[test]
    fn test_unreadable_snapshot_moved_aside_before_persist() {
        let dir = tempdir().unwrap();
        let file = write_corpus(dir.path());
        let config = config_in(dir.path());
        Engine::build(config.clone(), &[file]).unwrap().persist().unwrap();

        let paths = config.snapshot.paths();
        let table = std::fs::read_to_string(&paths.corpus).unwrap();
        let damaged = table.replacen("log2Prob", "log2_prob", 1);
        std::fs::write(&paths.corpus, &damaged).unwrap();
        let model_bytes = std::fs::read(&paths.model).unwrap();

        let engine = Engine::new(config.clone());
        let stats = engine.stats().unwrap();
        assert_eq!(stats.origin, Origin::Quarantined);
        assert_eq!(stats.quarantined.len(), 3);
        assert!(stats.persist_blocked.is_none());

        assert_eq!(
            engine.insert_password("after-crash").unwrap(),
            InsertOutcome::Inserted { rank: 1 }
        );
        engine.persist().unwrap();

        assert_eq!(
            std::fs::read_to_string(quarantine_path(&paths.corpus)).unwrap(),
            damaged
        );
        assert_eq!(std::fs::read(quarantine_path(&paths.model)).unwrap(), model_bytes);

        let reloaded = Engine::new(config);
        assert_eq!(reloaded.stats().unwrap().origin, Origin::Snapshot);
        assert_eq!(reloaded.len().unwrap(), 1);
        assert!(reloaded.search("after-crash").unwrap().found);
    }

    #[test]
    fn test_writes_refused_when_snapshot_cannot_be_moved() {
        let dir = tempdir().unwrap();
        let file = write_corpus(dir.path());
        let mut config = config_in(dir.path());
        Engine::build(config.clone(), &[file]).unwrap().persist().unwrap();

        let paths = config.snapshot.paths();
        std::fs::write(&paths.corpus, "password,rank\nx,1\n").unwrap();
        std::fs::write(quarantine_path(&paths.corpus), "earlier damage").unwrap();
        let model_bytes = std::fs::read(&paths.model).unwrap();

        config.snapshot.autosave = true;
        let engine = Engine::new(config);
        let stats = engine.stats().unwrap();
        assert_eq!(stats.origin, Origin::Unreadable);
        assert!(stats.quarantined.is_empty());
        assert!(stats.persist_blocked.is_some());

        assert!(matches!(
            engine.insert_password("lost-write"),
            Err(RankError::SnapshotBlocked(_))
        ));
        assert!(matches!(engine.persist(), Err(RankError::SnapshotBlocked(_))));

        assert_eq!(
            std::fs::read_to_string(&paths.corpus).unwrap(),
            "password,rank\nx,1\n"
        );
        assert_eq!(std::fs::read(&paths.model).unwrap(), model_bytes);
        assert_eq!(
            std::fs::read_to_string(quarantine_path(&paths.corpus)).unwrap(),
            "earlier damage"
        );
    }

    #[test]
    fn test_input_normalization() {
        let dir = tempdir().unwrap();
        let engine = Engine::new(config_in(dir.path()));
        assert_eq!(engine.normalize_input("  pass word \t"), "password");
        assert_eq!(engine.normalize_input(" a "), "abc-default-pwd");
        assert_eq!(engine.normalize_input(""), "abc-default-pwd");
        assert_eq!(engine.normalize_input("ab"), "ab");

        let result = engine.search("   ").unwrap();
        assert_eq!(result.password, "abc-default-pwd");
    }

    #[test]
    fn test_insert_then_search() {
        let dir = tempdir().unwrap();
        let file = write_corpus(dir.path());
        let engine = Engine::build(config_in(dir.path()), &[file]).unwrap();

        assert!(!engine.search("correcthorse").unwrap().found);
        let outcome = engine.insert_password("correct horse").unwrap();
        let result = engine.search("correcthorse").unwrap();
        assert!(result.found);
        assert_eq!(result.rank, outcome.rank());
        assert_eq!(engine.len().unwrap(), 8);
    }

    #[test]
    fn test_autosave_writes_snapshot() {
        let dir = tempdir().unwrap();
        let file = write_corpus(dir.path());
        let mut config = config_in(dir.path());
        config.snapshot.autosave = true;
        let engine = Engine::build(config.clone(), &[file]).unwrap();

        engine.insert_password("fresh-one").unwrap();
        let reloaded = Engine::new(config);
        assert!(reloaded.search("fresh-one").unwrap().found);
    }

    #[test]
    fn test_predict_strategies() {
        let dir = tempdir().unwrap();
        let file = write_corpus(dir.path());
        let engine = Engine::build(config_in(dir.path()), &[file]).unwrap();

        let default = engine.predict_tries("password", None).unwrap();
        let likely = engine
            .predict_tries("password", Some(PredictStrategy::Likely))
            .unwrap();
        assert_eq!(default, likely);
        assert!(engine
            .predict_tries("password", Some(PredictStrategy::Inclusive))
            .unwrap() >= 1);
        assert_eq!(engine.search("password").unwrap().predicted_tries, likely);
    }

    #[test]
    fn test_generate_is_seeded() {
        let dir = tempdir().unwrap();
        let file = write_corpus(dir.path());
        let engine = Engine::build(config_in(dir.path()), &[file]).unwrap();

        let a = engine.generate("pa", 16, Some(5)).unwrap();
        let b = engine.generate("pa", 16, Some(5)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.chars().count(), 16);
        assert!(matches!(
            engine.generate("p", 4, Some(5)),
            Err(RankError::WrongGramLength { .. })
        ));
    }

    #[test]
    fn test_concurrent_inserts_keep_ranks_contiguous() {
        let dir = tempdir().unwrap();
        let file = write_corpus(dir.path());
        let engine = Arc::new(Engine::build(config_in(dir.path()), &[file]).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        engine.insert_password(&format!("user{}pass{}", t, i)).unwrap();
                        engine.search("password").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len().unwrap(), 7 + 100);
        let data = engine.get_data().unwrap();
        for (i, row) in data.iter().enumerate() {
            assert_eq!(row.rank, i + 1);
        }
        for pair in data.windows(2) {
            assert!(pair[0].record.probability >= pair[1].record.probability);
        }
    }

    #[test]
    fn test_fit_from_corpus() {
        let dir = tempdir().unwrap();
        let file = write_corpus(dir.path());
        let engine = Engine::build(config_in(dir.path()), &[file]).unwrap();

        let poly = engine.fit(PredictStrategy::Inclusive, 1).unwrap();
        assert_eq!(poly.coefficients.len(), 2);
        assert!(poly.provenance.contains("inclusive"));
        assert!(engine.fit(PredictStrategy::Inclusive, 20).is_err());
    }
}
