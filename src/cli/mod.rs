//! CLI command definitions and handlers

mod build;
mod fit;
mod query;
mod session;
mod status;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::ProgressStyle;
use std::path::PathBuf;

use pwrank::{Engine, EngineConfig};

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// pwrank - Markov-chain password guessability ranking
#[derive(Parser, Debug)]
#[command(name = "pwrank")]
#[command(
    version,
    about = "Rank passwords by how soon a probability-first attacker would guess them",
    long_about = "pwrank trains a character-level Markov model on a password corpus and keeps \
the corpus sorted by model probability. A password's rank in that order is the number of \
guesses an attacker trying the most likely passwords first would need.\n\n\
Build the corpus once from leaked password lists, then query it:\n  \
pwrank build rockyou.txt\n  \
pwrank search hunter2",
    after_help = "\
Examples:
  pwrank build leak1.txt leak2.txt          Build model and ranked corpus
  pwrank search hunter2                     Rank and predicted tries for a password
  pwrank insert correcthorse                Add a password to the corpus
  pwrank predict hunter2 --strategy inclusive
  pwrank top --limit 50 --format csv        Most guessable passwords
  pwrank session --mode as-is < list.txt    Results table for many passwords
  pwrank status                             Snapshot and model summary"
)]
pub struct Cli {
    /// Config file (default: ./pwrank.toml, then ~/.config/pwrank/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Snapshot directory (overrides config and PWRANK_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Number of parallel workers (1-64, default: all cores)
    #[arg(long, global = true, value_parser = parse_workers)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the model on raw password files and write a fresh ranked corpus
    #[command(after_help = "\
Input files hold one password per line. Lines with more than one
whitespace-separated field are skipped and counted.

Examples:
  pwrank build rockyou.txt
  pwrank build a.txt b.txt --order 3 --seed 42")]
    Build {
        /// Password list files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Markov order (overrides model.order)
        #[arg(long)]
        order: Option<usize>,

        /// Shuffle seed for a reproducible build (overrides corpus.shuffle_seed)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Look up a password's rank and predicted number of tries
    Search {
        password: String,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Add passwords to the corpus and save the snapshot
    Insert {
        #[arg(required = true)]
        passwords: Vec<String>,

        /// Keep the changes in memory only
        #[arg(long)]
        no_save: bool,
    },

    /// Predicted number of guesses from the regression
    Predict {
        password: String,

        /// Regression strategy (default: regression.default_strategy)
        #[arg(long, value_parser = ["likely", "inclusive"])]
        strategy: Option<String>,
    },

    /// Show the most guessable passwords in the corpus
    Top {
        /// Number of rows
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,

        /// Output format: text, json, csv
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json", "csv"])]
        format: String,
    },

    /// Sample characters from the model
    Generate {
        /// Starting context, exactly `order` characters
        gram: String,

        /// Characters to generate
        #[arg(long, short = 'l', default_value = "16")]
        length: usize,

        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Refit a tries regression against the current corpus
    #[command(after_help = "\
Prints a [regression.<strategy>] table to paste into pwrank.toml.

Examples:
  pwrank fit --strategy likely --degree 4
  pwrank fit --strategy inclusive --degree 2")]
    Fit {
        #[arg(long, default_value = "likely", value_parser = ["likely", "inclusive"])]
        strategy: String,

        /// Polynomial degree (default: degree of the configured polynomial)
        #[arg(long)]
        degree: Option<usize>,
    },

    /// Rank passwords read from stdin, one per line, into a results table
    Session {
        /// insert: add each password first; as-is: search the corpus unchanged
        #[arg(long, default_value = "insert", value_parser = ["insert", "as-is"])]
        mode: String,

        /// Output format: text, json, csv
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json", "csv"])]
        format: String,

        /// Save inserted passwords to the snapshot when done
        #[arg(long)]
        save: bool,
    },

    /// Show snapshot location and model summary
    Status {
        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
}

/// Resolve configuration from the global flags.
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.snapshot.dir = Some(dir.clone());
    }
    Ok(config)
}

fn init_workers(workers: Option<usize>) -> Result<()> {
    if let Some(n) = workers {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .context("Failed to configure worker pool")?;
    }
    Ok(())
}

/// Create spinner progress style
fn create_spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
        .expect("valid template")
}

/// Run the CLI
pub fn run(cli: Cli) -> Result<()> {
    init_workers(cli.workers)?;
    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Build { files, order, seed } => {
            if let Some(order) = order {
                config.model.order = order;
            }
            if seed.is_some() {
                config.corpus.shuffle_seed = seed;
            }
            config.validate()?;
            build::run(config, &files)
        }

        Commands::Search { password, format } => query::search(&Engine::new(config), &password, &format),

        Commands::Insert { passwords, no_save } => {
            query::insert(&Engine::new(config), &passwords, !no_save)
        }

        Commands::Predict { password, strategy } => {
            query::predict(&Engine::new(config), &password, strategy.as_deref())
        }

        Commands::Top { limit, format } => query::top(&Engine::new(config), limit, &format),

        Commands::Generate { gram, length, seed } => {
            query::generate(&Engine::new(config), &gram, length, seed)
        }

        Commands::Fit { strategy, degree } => fit::run(&Engine::new(config), &strategy, degree),

        Commands::Session { mode, format, save } => {
            session::run(&Engine::new(config), &mode, &format, save)
        }

        Commands::Status { format } => status::run(&Engine::new(config), &format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_workers() {
        assert_eq!(parse_workers("4"), Ok(4));
        assert!(parse_workers("0").is_err());
        assert!(parse_workers("65").is_err());
        assert!(parse_workers("many").is_err());
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pwrank",
            "search",
            "hunter2",
            "--data-dir",
            "/tmp/x",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/x")));
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Search { .. }));
    }

    #[test]
    fn test_build_requires_files() {
        assert!(Cli::try_parse_from(["pwrank", "build"]).is_err());
    }
}
