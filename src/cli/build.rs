//! Build command - train the model and write a fresh snapshot

use anyhow::{Context, Result};
use console::style;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use pwrank::{Engine, EngineConfig};

pub fn run(config: EngineConfig, files: &[PathBuf]) -> Result<()> {
    for file in files {
        if !file.is_file() {
            anyhow::bail!("Input file does not exist: {}", file.display());
        }
    }

    let start = Instant::now();
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(super::create_spinner_style());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!(
        "Training order-{} model on {} file(s)...",
        config.model.order,
        files.len()
    ));

    let data_dir = config.snapshot.data_dir();
    let engine = Engine::build(config, files).context("Failed to build corpus")?;

    spinner.set_message("Saving snapshot...");
    let manifest = engine
        .persist()
        .with_context(|| format!("Failed to save snapshot to {}", data_dir.display()))?;
    spinner.finish_and_clear();

    println!(
        "{} Ranked {} passwords with an order-{} model in {:.1}s",
        style("✓").green(),
        style(manifest.records).cyan(),
        manifest.order,
        start.elapsed().as_secs_f64()
    );
    if manifest.skipped_rows > 0 {
        println!(
            "  {} Skipped {} malformed row(s)",
            style("!").yellow(),
            manifest.skipped_rows
        );
    }
    println!("  Snapshot: {}", style(data_dir.display()).dim());
    Ok(())
}
