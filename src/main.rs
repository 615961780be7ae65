use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use sabiscore::config::{AppConfig, PredictionMode, UpstreamConfig};
use sabiscore::data_client::DataClient;
use sabiscore::feature_extractor::FeatureExtractor;
use sabiscore::http_cache::{ResponseCache, snapshot_path};
use sabiscore::http_client::{ReqwestTransport, http_client};
use sabiscore::prediction::PredictionEngine;
use sabiscore::scorer::{HttpScorer, Scorer};
use sabiscore::upstream_store::UpstreamStore;

#[derive(Parser)]
#[command(name = "sabiscore", about = "Pre-match football predictions from upstream statistics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Predict one fixture.
    Predict {
        fixture_id: u64,
        /// Fail instead of falling back when no scorer result is available.
        #[arg(long)]
        strict: bool,
        /// Print the full record as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the feature bundle for one fixture as JSON.
    Features { fixture_id: u64 },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sabiscore=info".into()),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Command::Predict { strict: true, .. } = cli.command {
        config.engine.mode = PredictionMode::Strict;
    }

    let client = http_client(config.retry.request_timeout)?;
    let extractor = build_extractor(&config, &client);
    let scorer: Option<Arc<dyn Scorer>> = config.scorer_url.as_deref().map(|url| {
        Arc::new(HttpScorer::new(client.clone(), url, config.engine.scorer_timeout))
            as Arc<dyn Scorer>
    });
    info!(mode = %config.engine.mode, scorer = scorer.is_some(), "sabiscore starting");

    let engine = PredictionEngine::new(extractor, scorer, config.engine.clone());
    let outcome = run(&engine, cli.command).await;

    for upstream in engine.extractor().clients() {
        info!(
            source = upstream.source(),
            breaker = ?upstream.breaker_state(),
            cached = upstream.store().cached_entries(),
            "upstream state"
        );
        if config.cache_snapshot {
            if let Some(path) = snapshot_path(upstream.source()) {
                if let Err(err) = upstream.store().save_snapshot(&path) {
                    warn!(source = upstream.source(), error = %err, "failed to save cache snapshot");
                }
            }
        }
    }
    outcome
}

async fn run(engine: &PredictionEngine, command: Command) -> Result<()> {
    match command {
        Command::Predict {
            fixture_id, json, ..
        } => {
            let record = engine
                .generate_prediction(fixture_id)
                .await
                .with_context(|| format!("prediction for fixture {fixture_id}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
                return Ok(());
            }
            println!("{} vs {}", record.home_team, record.away_team);
            println!(
                "  home {}%  draw {}%  away {}%  ({:?} confidence, mode {})",
                record.probabilities.home,
                record.probabilities.draw,
                record.probabilities.away,
                record.confidence,
                record.mode
            );
            println!(
                "  xG {:.2} - {:.2}  over 2.5 {}%  btts {}%",
                record.expected_goals.home,
                record.expected_goals.away,
                record.additional_markets.over_2_5,
                record.additional_markets.btts_yes
            );
            for factor in &record.top_factors {
                println!("  {:+.2}  {}: {}", factor.impact, factor.name, factor.description);
            }
            for bet in &record.suggested_bets {
                println!(
                    "  bet: {} @ fair {:.2} ({}%)  {}",
                    bet.selection, bet.fair_odds, bet.probability, bet.rationale
                );
            }
            println!("  {}", record.explanation);
        }
        Command::Features { fixture_id } => {
            let extractor = engine.extractor();
            let ctx = extractor.resolve_fixture(fixture_id).await;
            let bundle = extractor.extract(&ctx).await;
            println!("{}", serde_json::to_string_pretty(&bundle)?);
        }
    }
    Ok(())
}

fn build_extractor(config: &AppConfig, client: &reqwest::Client) -> FeatureExtractor {
    let upstream_client = |upstream: &UpstreamConfig| {
        let cache = if config.cache_snapshot {
            snapshot_path(&upstream.source)
                .map(|p| ResponseCache::load_snapshot(&p))
                .unwrap_or_default()
        } else {
            ResponseCache::new()
        };
        Arc::new(DataClient::new(
            &upstream.source,
            Arc::new(ReqwestTransport::new(client.clone(), upstream.clone())),
            UpstreamStore::with_cache(config.breaker, cache),
            config.retry,
            config.ttls,
        ))
    };

    let mut extractor =
        FeatureExtractor::new(upstream_client(&config.stats), config.prediction_budget);
    if let Some(odds) = config.odds_feed.as_ref() {
        extractor = extractor.with_odds_feed(upstream_client(odds));
    }
    if let Some(weather) = config.weather_feed.as_ref() {
        extractor = extractor.with_weather_feed(upstream_client(weather));
    }
    extractor
}
