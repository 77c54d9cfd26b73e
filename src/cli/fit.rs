//! Fit command - refit a tries regression from the current corpus

use anyhow::Result;
use console::style;
use serde::Serialize;
use std::collections::BTreeMap;

use pwrank::predict::{Polynomial, PredictStrategy};
use pwrank::Engine;

#[derive(Serialize)]
struct RegressionTable<'a> {
    regression: BTreeMap<&'a str, &'a Polynomial>,
}

pub fn run(engine: &Engine, strategy: &str, degree: Option<usize>) -> Result<()> {
    let strategy: PredictStrategy = strategy.parse().map_err(anyhow::Error::msg)?;
    let degree = degree.unwrap_or_else(|| engine.predictor().polynomial(strategy).degree());

    let polynomial = engine.fit(strategy, degree)?;

    eprintln!(
        "{} Fitted degree-{} {} regression",
        style("✓").green(),
        degree,
        strategy
    );
    let table = RegressionTable {
        regression: BTreeMap::from([(strategy.name(), &polynomial)]),
    };
    print!("{}", toml::to_string(&table)?);
    Ok(())
}
