//! Prediction engine: scorer-first with a rule-based stand-in, always normalized.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::betting::{AdditionalMarkets, BetSuggestion, suggest_bets};
use crate::calibration::{Outcome, Prob3, apply_temperature};
use crate::config::{EngineConfig, PredictionMode};
use crate::error::{PredictionError, ScorerError};
use crate::factors::{OrderedFactor, top_factors};
use crate::feature_extractor::FeatureExtractor;
use crate::features::{DataQuality, MatchFeatureBundle};
use crate::normalize::{Probabilities, normalize_prob3};
use crate::poisson;
use crate::scorer::{Scorer, ScorerRequest, ScorerResult};
use crate::upstream::ExpectedGoalsPair;

const MARKET_NUDGE_SCALE: f64 = 0.5;
const MARKET_NUDGE_CAP_PP: f64 = 5.0;

const FORM_WEIGHT: f64 = 0.40;
const XG_WEIGHT: f64 = 0.30;
const H2H_WEIGHT: f64 = 0.15;
const VENUE_WEIGHT: f64 = 0.15;

const HIGH_COMPLETENESS: f64 = 0.75;
const LOW_COMPLETENESS: f64 = 0.40;
const STRONG_SIGNAL: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionPath {
    Scorer { model_version: String },
    RuleBased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub fixture_id: u64,
    pub home_team: String,
    pub away_team: String,
    pub mode: PredictionMode,
    pub path: PredictionPath,
    pub probabilities: Probabilities,
    pub predicted_outcome: Outcome,
    pub confidence: Confidence,
    pub expected_goals: ExpectedGoalsPair,
    pub top_factors: Vec<OrderedFactor>,
    pub suggested_bets: Vec<BetSuggestion>,
    pub additional_markets: AdditionalMarkets,
    pub explanation: String,
    pub data_quality: DataQuality,
    pub generated_at: DateTime<Utc>,
}

pub struct PredictionEngine {
    extractor: FeatureExtractor,
    scorer: Option<Arc<dyn Scorer>>,
    config: EngineConfig,
}

impl PredictionEngine {
    pub fn new(
        extractor: FeatureExtractor,
        scorer: Option<Arc<dyn Scorer>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            extractor,
            scorer,
            config,
        }
    }

    pub fn mode(&self) -> PredictionMode {
        self.config.mode
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Only the strict-mode scorer absence reaches the caller as an error.
    pub async fn generate_prediction(
        &self,
        fixture_id: u64,
    ) -> Result<PredictionRecord, PredictionError> {
        if self.config.mode == PredictionMode::Strict && self.scorer.is_none() {
            return Err(PredictionError::ScorerUnavailable {
                mode: self.config.mode,
                reason: "no scorer configured".to_string(),
            });
        }

        let ctx = self.extractor.resolve_fixture(fixture_id).await;
        let bundle = self.extractor.extract(&ctx).await;

        let scored = match self.score(&bundle).await {
            Ok(result) => Some(result),
            Err(reason) if self.config.mode == PredictionMode::Strict => {
                warn!(fixture_id, %reason, "scorer unavailable in strict mode");
                return Err(PredictionError::ScorerUnavailable {
                    mode: self.config.mode,
                    reason,
                });
            }
            Err(reason) => {
                warn!(fixture_id, %reason, "scorer unavailable, using rule-based estimate");
                None
            }
        };

        let record = predict_from_features(&bundle, scored.as_ref(), &self.config);
        info!(
            fixture_id,
            home = %record.probabilities.home,
            draw = %record.probabilities.draw,
            away = %record.probabilities.away,
            confidence = ?record.confidence,
            path = ?record.path,
            "prediction generated"
        );
        Ok(record)
    }

    async fn score(&self, bundle: &MatchFeatureBundle) -> Result<ScorerResult, String> {
        let Some(scorer) = self.scorer.as_ref() else {
            return Err("no scorer configured".to_string());
        };
        let request = ScorerRequest::from_bundle(bundle);
        match tokio::time::timeout(self.config.scorer_timeout, scorer.score(&request)).await {
            Ok(Ok(result)) => result.validate().map_err(|e| e.to_string()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err(ScorerError::Timeout.to_string()),
        }
    }
}

/// Pure half of the engine: bundle plus optional scorer result to a record.
pub fn predict_from_features(
    bundle: &MatchFeatureBundle,
    scorer: Option<&ScorerResult>,
    config: &EngineConfig,
) -> PredictionRecord {
    let weather_multiplier = bundle
        .weather
        .as_ref()
        .map(|w| w.goals_multiplier)
        .unwrap_or(1.0);

    let (raw, base_lambdas, path) = match scorer {
        Some(result) => {
            let lambdas = result
                .expected_goals
                .map(|xg| (xg.home, xg.away))
                .unwrap_or((bundle.expected_goals.home, bundle.expected_goals.away));
            (
                scorer_estimate(bundle, result, lambdas, config.scorer_temperature),
                lambdas,
                PredictionPath::Scorer {
                    model_version: result.model_version.clone(),
                },
            )
        }
        None => (
            rule_based_estimate(bundle),
            (bundle.expected_goals.home, bundle.expected_goals.away),
            PredictionPath::RuleBased,
        ),
    };

    let probabilities = normalize_prob3(raw);
    let lambdas = (
        poisson::clamp_lambda(base_lambdas.0 * weather_multiplier),
        poisson::clamp_lambda(base_lambdas.1 * weather_multiplier),
    );
    let additional_markets = AdditionalMarkets::from_lambdas(lambdas.0, lambdas.1);
    let top_factors = top_factors(bundle);
    let confidence = assign_confidence(bundle.data_quality.completeness, &top_factors);
    let suggested_bets = suggest_bets(&probabilities, &additional_markets, lambdas, bundle);
    let predicted_outcome = probabilities.leader();
    let explanation = explain(bundle, &probabilities, predicted_outcome, &path, &top_factors);

    PredictionRecord {
        fixture_id: bundle.fixture.fixture_id,
        home_team: bundle.fixture.home_team.clone(),
        away_team: bundle.fixture.away_team.clone(),
        mode: config.mode,
        path,
        probabilities,
        predicted_outcome,
        confidence,
        expected_goals: ExpectedGoalsPair {
            home: round2(lambdas.0),
            away: round2(lambdas.1),
        },
        top_factors,
        suggested_bets,
        additional_markets,
        explanation,
        data_quality: bundle.data_quality.clone(),
        generated_at: Utc::now(),
    }
}

/// Temperature-scaled scorer shares with the weather and market nudges applied.
pub fn scorer_estimate(
    bundle: &MatchFeatureBundle,
    result: &ScorerResult,
    lambdas: (f64, f64),
    temperature: f64,
) -> Prob3 {
    let mut p = apply_temperature(result.probabilities.normalized(), temperature);

    if let Some(w) = &bundle.weather {
        let before = poisson::outcome_probs(lambdas.0, lambdas.1);
        let after = poisson::outcome_probs(
            lambdas.0 * w.goals_multiplier,
            lambdas.1 * w.goals_multiplier,
        );
        p.home += after.home - before.home;
        p.draw += after.draw - before.draw;
        p.away += after.away - before.away;
    }

    if let Some(m) = &bundle.market {
        p.home += market_nudge(m.implied_drift.home);
        p.draw += market_nudge(m.implied_drift.draw);
        p.away += market_nudge(m.implied_drift.away);
    }

    p
}

/// Implied-probability drift to a probability shift, capped at five percentage points.
pub fn market_nudge(implied_drift: f64) -> f64 {
    if !implied_drift.is_finite() {
        return 0.0;
    }
    let pp = (implied_drift * MARKET_NUDGE_SCALE * 100.0).clamp(-MARKET_NUDGE_CAP_PP, MARKET_NUDGE_CAP_PP);
    pp / 100.0
}

/// Fixed 40/30/15/15 blend of form, expected goals, head-to-head and venue.
pub fn rule_based_estimate(bundle: &MatchFeatureBundle) -> Prob3 {
    let form = ((bundle.form.home.weighted_ppg - bundle.form.away.weighted_ppg) / 3.0)
        .clamp(-1.0, 1.0);
    let xg = ((bundle.expected_goals.home - bundle.expected_goals.away) / 2.0).clamp(-1.0, 1.0);
    let h2h = bundle.head_to_head.advantage.clamp(-1.0, 1.0);
    let venue = (bundle.venue.advantage + bundle.injuries.differential).clamp(-1.0, 1.0);

    let score = FORM_WEIGHT * form + XG_WEIGHT * xg + H2H_WEIGHT * h2h + VENUE_WEIGHT * venue;
    let draw = (0.28 - 0.12 * score.abs()).clamp(0.15, 0.30);
    let home = (1.0 - draw) * (1.0 + (2.0 * score).tanh()) / 2.0;
    Prob3 {
        home,
        draw,
        away: (1.0 - draw - home).max(0.0),
    }
}

pub fn assign_confidence(completeness: f64, factors: &[OrderedFactor]) -> Confidence {
    let top = factors.first().map(|f| f.impact.abs()).unwrap_or(0.0);
    if completeness < LOW_COMPLETENESS {
        Confidence::Low
    } else if completeness >= HIGH_COMPLETENESS && top >= STRONG_SIGNAL {
        Confidence::High
    } else {
        Confidence::Medium
    }
}

fn explain(
    bundle: &MatchFeatureBundle,
    probs: &Probabilities,
    outcome: Outcome,
    path: &PredictionPath,
    factors: &[OrderedFactor],
) -> String {
    let ctx = &bundle.fixture;
    let source = match path {
        PredictionPath::Scorer { model_version } => format!("model {model_version}"),
        PredictionPath::RuleBased => "rule-based estimate".to_string(),
    };
    let headline = format!(
        "{} vs {}: {} most likely at {}% ({}).",
        ctx.home_team,
        ctx.away_team,
        outcome.label(),
        probs.get(outcome),
        source
    );
    if factors.is_empty() {
        return format!("{headline} No single factor stands out.");
    }
    let reasons = factors
        .iter()
        .map(|f| f.description.as_str())
        .collect::<Vec<_>>()
        .join("; ");
    format!("{headline} Key factors: {reasons}.")
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
