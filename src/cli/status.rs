//! Status command - show snapshot location and model summary

use anyhow::Result;
use console::style;

use pwrank::engine::Origin;
use pwrank::Engine;

/// Run the status command
pub fn run(engine: &Engine, format: &str) -> Result<()> {
    let stats = engine.stats()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("\npwrank Status\n");
    println!("  Data dir: {}", style(stats.data_dir.display()).cyan());
    println!();

    match stats.origin {
        Origin::Fallback => println!(
            "  {} No snapshot yet. Run {}",
            style("[--]").dim(),
            style("pwrank build <files>").cyan()
        ),
        Origin::Quarantined => {
            println!(
                "  {} Snapshot was unreadable and has been moved aside",
                style("[!!]").yellow()
            );
            for path in &stats.quarantined {
                println!("      {}", style(path.display()).dim());
            }
        }
        Origin::Unreadable => println!(
            "  {} Snapshot unreadable, writes disabled: {}",
            style("[!!]").red(),
            stats.persist_blocked.as_deref().unwrap_or("unknown reason")
        ),
        _ => {
            println!("  {} Snapshot loaded", style("[OK]").green());
            println!(
                "      {} passwords, order-{} model",
                style(stats.records).cyan(),
                stats.order
            );
            println!(
                "      {} distinct k-grams over {} symbols, {} windows",
                style(stats.distinct_kgrams).cyan(),
                stats.alphabet_size,
                stats.total_observations
            );
            println!("      floor probability {:e}", stats.floor_probability);
            if stats.skipped_rows > 0 {
                println!(
                    "      {} malformed row(s) skipped at build",
                    style(stats.skipped_rows).yellow()
                );
            }
            for source in &stats.sources {
                println!("      source: {}", style(source.display()).dim());
            }
        }
    }

    let predictor = engine.predictor();
    println!();
    println!("  Regression (default: {}):", predictor.default_strategy);
    for strategy in pwrank::predict::PredictStrategy::ALL {
        let poly = predictor.polynomial(strategy);
        println!(
            "    {:<10} degree {}  {}",
            strategy.name(),
            poly.degree(),
            style(&poly.provenance).dim()
        );
    }
    println!();
    Ok(())
}
