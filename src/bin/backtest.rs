use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use sabiscore::calibration::{Outcome, Prob3, classify_outcome, evaluate_probs, fit_temperature};
use sabiscore::config::EngineConfig;
use sabiscore::features::MatchFeatureBundle;
use sabiscore::prediction::predict_from_features;
use sabiscore::scorer::ScorerResult;

#[derive(Debug, serde::Deserialize)]
struct BacktestCase {
    bundle: MatchFeatureBundle,
    #[serde(default)]
    scorer: Option<ScorerResult>,
    home_goals: u8,
    away_goals: u8,
}

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tests/fixtures/backtest_cases.json"));

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cases: Vec<BacktestCase> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    if cases.is_empty() {
        println!("no cases in {}", path.display());
        return Ok(());
    }

    // Offline only: the engine's pure half on stored bundles, no network.
    let config = EngineConfig::default();
    let outcomes: Vec<Outcome> = cases
        .iter()
        .map(|c| classify_outcome(c.home_goals as i32, c.away_goals as i32))
        .collect();

    let engine_preds: Vec<Prob3> = cases
        .iter()
        .map(|c| predict_from_features(&c.bundle, c.scorer.as_ref(), &config))
        .map(|r| r.probabilities.to_prob3())
        .collect();
    let rule_preds: Vec<Prob3> = cases
        .iter()
        .map(|c| predict_from_features(&c.bundle, None, &config))
        .map(|r| r.probabilities.to_prob3())
        .collect();

    print_metrics("engine", &engine_preds, &outcomes);
    print_metrics("rule-based", &rule_preds, &outcomes);

    let (scored_preds, scored_outcomes): (Vec<Prob3>, Vec<Outcome>) = cases
        .iter()
        .zip(&outcomes)
        .filter_map(|(c, o)| c.scorer.as_ref().map(|s| (s.probabilities.normalized(), *o)))
        .unzip();
    if scored_preds.is_empty() {
        println!("no scorer results, skipping temperature fit");
        return Ok(());
    }
    print_metrics("raw scorer", &scored_preds, &scored_outcomes);
    let (temperature, fitted) = fit_temperature(&scored_preds, &scored_outcomes);
    println!(
        "best temperature {:.1}: brier {:.4}  log loss {:.4}  accuracy {:.1}%",
        temperature,
        fitted.brier,
        fitted.log_loss,
        fitted.accuracy * 100.0
    );
    Ok(())
}

fn print_metrics(label: &str, preds: &[Prob3], outcomes: &[Outcome]) {
    let m = evaluate_probs(preds, outcomes);
    println!(
        "{label:<12} n={:<4} brier {:.4}  log loss {:.4}  accuracy {:.1}%",
        m.samples,
        m.brier,
        m.log_loss,
        m.accuracy * 100.0
    );
}
