//! Single-password queries and corpus listing

use anyhow::{Context, Result};
use console::style;

use pwrank::corpus::InsertOutcome;
use pwrank::predict::PredictStrategy;
use pwrank::snapshot::CORPUS_COLUMNS;
use pwrank::Engine;

pub fn search(engine: &Engine, password: &str, format: &str) -> Result<()> {
    let result = engine.search(password)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let total = engine.len()?;
    if result.found {
        println!(
            "{} {} is #{} of {}",
            style("✓").green(),
            style(&result.password).bold(),
            style(result.rank).cyan(),
            total
        );
    } else {
        println!(
            "{} {} is not in the corpus; it would be guessed after all {} known passwords",
            style("✗").red(),
            style(&result.password).bold(),
            total
        );
    }
    println!(
        "  Predicted tries: {}",
        style(result.predicted_tries).cyan()
    );
    Ok(())
}

pub fn insert(engine: &Engine, passwords: &[String], save: bool) -> Result<()> {
    let mut inserted = 0;
    for raw in passwords {
        match engine.insert_password(raw)? {
            InsertOutcome::Inserted { rank } => {
                inserted += 1;
                println!(
                    "{} {} inserted at #{}",
                    style("+").green(),
                    engine.normalize_input(raw),
                    rank
                );
            }
            InsertOutcome::AlreadyPresent { rank } => {
                println!(
                    "{} {} already present at #{}",
                    style("=").dim(),
                    engine.normalize_input(raw),
                    rank
                );
            }
        }
    }

    if save && inserted > 0 && !engine.config().snapshot.autosave {
        engine.persist().context("Failed to save snapshot")?;
    }
    Ok(())
}

pub fn predict(engine: &Engine, password: &str, strategy: Option<&str>) -> Result<()> {
    let strategy = strategy
        .map(str::parse::<PredictStrategy>)
        .transpose()
        .map_err(anyhow::Error::msg)?;
    let tries = engine.predict_tries(password, strategy)?;
    println!("{}", tries);
    Ok(())
}

pub fn top(engine: &Engine, limit: usize, format: &str) -> Result<()> {
    let mut rows = engine.get_data()?;
    rows.truncate(limit);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&rows)?),
        "csv" => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record(CORPUS_COLUMNS)?;
            for row in &rows {
                let r = &row.record;
                let f = &r.features;
                writer.write_record([
                    r.password.clone(),
                    f.length.to_string(),
                    f.upper_case.to_string(),
                    f.lower_case.to_string(),
                    f.numbers.to_string(),
                    f.special_chars.to_string(),
                    f.vowels.to_string(),
                    r.probability.to_string(),
                    r.log2_probability.to_string(),
                    row.rank.to_string(),
                ])?;
            }
            writer.flush()?;
        }
        _ => {
            if rows.is_empty() {
                println!(
                    "Corpus is empty. Run {} first.",
                    style("pwrank build <files>").cyan()
                );
                return Ok(());
            }
            println!(
                "{:>8}  {:<24} {:>14} {:>10}",
                style("rank").bold(),
                style("password").bold(),
                style("probability").bold(),
                style("log2").bold()
            );
            for row in &rows {
                println!(
                    "{:>8}  {:<24} {:>14.6e} {:>10.3}",
                    row.rank, row.record.password, row.record.probability, row.record.log2_probability
                );
            }
        }
    }
    Ok(())
}

pub fn generate(engine: &Engine, gram: &str, length: usize, seed: Option<u64>) -> Result<()> {
    let text = engine.generate(gram, length, seed)?;
    println!("{}", text);
    Ok(())
}
