//! Session command - results table for passwords read from stdin

use anyhow::{Context, Result};
use console::style;
use std::io::{BufRead, IsTerminal};

use pwrank::session::{ResultRow, Session, SubmitMode};
use pwrank::Engine;

pub fn run(engine: &Engine, mode: &str, format: &str, save: bool) -> Result<()> {
    let mode: SubmitMode = mode.parse().map_err(anyhow::Error::msg)?;
    let interactive = std::io::stdin().is_terminal();
    if interactive {
        eprintln!(
            "Enter one password per line ({} mode), Ctrl-D to finish.",
            style(mode).cyan()
        );
    }

    let mut session = Session::new(engine);
    for line in std::io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let submission = session.submit(&line, mode);
        if interactive {
            if let Some(row) = submission.rows.last().filter(|_| submission.accepted) {
                eprintln!(
                    "  {} #{} predicted {}",
                    row.password, row.actual_tries, row.predicted_tries
                );
            }
            eprintln!("  {}", style(&submission.status).dim());
        } else if !submission.accepted {
            eprintln!("{}", submission.status);
        }
    }

    print_rows(session.rows(), format)?;

    if save && mode == SubmitMode::InsertFirst && !engine.config().snapshot.autosave {
        engine.persist().context("Failed to save snapshot")?;
    }
    Ok(())
}

fn print_rows(rows: &[ResultRow], format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(rows)?),
        "csv" => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        _ => {
            println!(
                "{:>6}  {:<24} {:>6} {:>16} {:>14}",
                style("Result").bold(),
                style("pwd").bold(),
                style("found").bold(),
                style("predicted_tries").bold(),
                style("actual_tries").bold()
            );
            for row in rows {
                println!(
                    "{:>6}  {:<24} {:>6} {:>16} {:>14}",
                    row.result, row.password, row.found, row.predicted_tries, row.actual_tries
                );
            }
        }
    }
    Ok(())
}
