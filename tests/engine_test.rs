//! End-to-end tests through the library API
//!
//! Build from raw files, query, insert, persist, reload, and compare.

use std::path::{Path, PathBuf};

use pwrank::corpus::{establish_order, InsertOutcome};
use pwrank::engine::Origin;
use pwrank::predict::PredictStrategy;
use pwrank::session::{Session, SubmitMode};
use pwrank::snapshot::quarantine_path;
use pwrank::{Engine, EngineConfig};

const LEAK: &str = "\
123456
password
123456789
qwerty
password
iloveyou
princess
1234567
rockyou
12345678
abc123
nicole
daniel
babygirl
monkey
lovely
jessica
654321
michael
ashley
two fields
";

fn config_in(dir: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.snapshot.dir = Some(dir.join("data"));
    config.corpus.shuffle_seed = Some(7);
    config
}

fn write_leak(dir: &Path) -> PathBuf {
    let path = dir.join("leak.txt");
    std::fs::write(&path, LEAK).unwrap();
    path
}

#[test]
fn test_build_ranks_corpus_in_probability_order() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::build(config_in(dir.path()), &[write_leak(dir.path())]).unwrap();

    let data = engine.get_data().unwrap();
    assert_eq!(data.len(), 19);
    for (i, row) in data.iter().enumerate() {
        assert_eq!(row.rank, i + 1);
        assert!(row.record.probability > 0.0);
        assert_eq!(row.record.log2_probability, row.record.probability.log2());
    }
    for pair in data.windows(2) {
        assert!(pair[0].record.probability >= pair[1].record.probability);
    }

    let stats = engine.stats().unwrap();
    assert_eq!(stats.skipped_rows, 1);
    assert_eq!(stats.order, 2);
}

#[test]
fn test_insert_matches_full_rerank() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::build(config_in(dir.path()), &[write_leak(dir.path())]).unwrap();

    for pwd in ["sunshine", "trustno1", "password", "zzzzzz", "qwerty123"] {
        engine.insert_password(pwd).unwrap();
    }

    let incremental = engine
        .with_data(|records| records.to_vec())
        .unwrap();
    let reranked = establish_order(incremental.clone());
    assert_eq!(incremental, reranked);
}

#[test]
fn test_duplicate_insert_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::build(config_in(dir.path()), &[write_leak(dir.path())]).unwrap();

    let before = engine.len().unwrap();
    let outcome = engine.insert_password("monkey").unwrap();
    assert!(matches!(outcome, InsertOutcome::AlreadyPresent { .. }));
    assert_eq!(engine.len().unwrap(), before);
}

#[test]
fn test_snapshot_reload_reproduces_queries() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let engine = Engine::build(config.clone(), &[write_leak(dir.path())]).unwrap();
    engine.insert_password("brand-new-pw").unwrap();
    engine.persist().unwrap();

    let reloaded = Engine::new(config);
    assert_eq!(reloaded.stats().unwrap().origin, Origin::Snapshot);
    assert_eq!(reloaded.get_data().unwrap(), engine.get_data().unwrap());

    for query in ["password", "brand-new-pw", "never-seen", "a", "x y z"] {
        assert_eq!(reloaded.search(query).unwrap(), engine.search(query).unwrap());
        for strategy in PredictStrategy::ALL {
            assert_eq!(
                reloaded.predict_tries(query, Some(strategy)).unwrap(),
                engine.predict_tries(query, Some(strategy)).unwrap()
            );
        }
    }
}

#[test]
fn test_missing_snapshot_falls_back_to_empty_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(config_in(dir.path()));

    assert!(engine.is_empty().unwrap());
    assert_eq!(engine.stats().unwrap().origin, Origin::Fallback);

    // Inserting into the fallback corpus works and ranks from 1
    let outcome = engine.insert_password("first").unwrap();
    assert_eq!(outcome, InsertOutcome::Inserted { rank: 1 });
    assert!(engine.search("first").unwrap().found);
}

#[test]
fn test_corrupt_model_is_moved_aside() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let engine = Engine::build(config.clone(), &[write_leak(dir.path())]).unwrap();
    engine.persist().unwrap();

    let paths = config.snapshot.paths();
    std::fs::write(&paths.model, b"not a model").unwrap();
    let reloaded = Engine::new(config);
    let stats = reloaded.stats().unwrap();
    assert_eq!(stats.origin, Origin::Quarantined);
    assert!(reloaded.is_empty().unwrap());
    assert!(!paths.model.exists());
    assert_eq!(
        std::fs::read(quarantine_path(&paths.model)).unwrap(),
        b"not a model"
    );
    assert!(quarantine_path(&paths.corpus).exists());
}

#[test]
fn test_session_table() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::build(config_in(dir.path()), &[write_leak(dir.path())]).unwrap();
    let total = engine.len().unwrap();

    let mut session = Session::new(&engine);
    session.submit("not-in-corpus", SubmitMode::AsIs);
    session.submit("not-in-corpus", SubmitMode::InsertFirst);
    session.submit("password", SubmitMode::AsIs);

    let rows = session.rows();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().map(|r| r.result).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(!rows[0].found);
    assert_eq!(rows[0].actual_tries, total + 1);
    assert!(rows[1].found);
    assert!(rows[2].found);
}
