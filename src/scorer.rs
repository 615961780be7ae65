//! External model scorer. Treated as a black box that returns a 1X2 estimate.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calibration::Prob3;
use crate::error::{ScorerError, TransportError};
use crate::features::MatchFeatureBundle;
use crate::http_client::map_reqwest_error;
use crate::upstream::ExpectedGoalsPair;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorerRequest<'a> {
    pub fixture_id: u64,
    pub home_team_id: u64,
    pub away_team_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub league_id: Option<u32>,
    pub features: &'a MatchFeatureBundle,
}

impl<'a> ScorerRequest<'a> {
    pub fn from_bundle(bundle: &'a MatchFeatureBundle) -> Self {
        Self {
            fixture_id: bundle.fixture.fixture_id,
            home_team_id: bundle.fixture.home_team_id,
            away_team_id: bundle.fixture.away_team_id,
            league_id: bundle.fixture.league_id,
            features: bundle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScorerResult {
    /// Any positive scale; fractions and percentages both work.
    pub probabilities: Prob3,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub expected_goals: Option<ExpectedGoalsPair>,
    #[serde(default = "unknown_version")]
    pub model_version: String,
}

fn unknown_version() -> String {
    "unknown".to_string()
}

impl ScorerResult {
    pub fn validate(self) -> Result<Self, ScorerError> {
        let p = self.probabilities;
        let parts = [p.home, p.draw, p.away];
        if parts.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ScorerError::Malformed(
                "probabilities must be finite and non-negative".to_string(),
            ));
        }
        if parts.iter().sum::<f64>() <= 0.0 {
            return Err(ScorerError::Malformed("probabilities sum to zero".to_string()));
        }
        if let Some(xg) = self.expected_goals {
            if !xg.home.is_finite() || !xg.away.is_finite() || xg.home < 0.0 || xg.away < 0.0 {
                return Err(ScorerError::Malformed("expected goals out of range".to_string()));
            }
        }
        Ok(self)
    }
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, request: &ScorerRequest<'_>) -> Result<ScorerResult, ScorerError>;
}

#[derive(Debug, Clone)]
pub struct HttpScorer {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpScorer {
    pub fn new(client: Client, url: &str, timeout: Duration) -> Self {
        Self {
            client,
            url: url.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score(&self, request: &ScorerRequest<'_>) -> Result<ScorerResult, ScorerError> {
        let call = async {
            let resp = self
                .client
                .post(&self.url)
                .json(request)
                .send()
                .await
                .map_err(map_reqwest_error)?;
            let status = resp.status().as_u16();
            let body = resp.text().await.map_err(map_reqwest_error)?;
            Ok::<_, TransportError>((status, body))
        };
        let (status, body) = match tokio::time::timeout(self.timeout, call).await {
            Err(_) | Ok(Err(TransportError::Timeout)) => return Err(ScorerError::Timeout),
            Ok(Err(err)) => return Err(ScorerError::Request(err.to_string())),
            Ok(Ok(pair)) => pair,
        };
        if !(200..300).contains(&status) {
            return Err(ScorerError::Status(status));
        }
        debug!(fixture_id = request.fixture_id, bytes = body.len(), "scorer answered");
        parse_result(&body)
    }
}

pub fn parse_result(body: &str) -> Result<ScorerResult, ScorerError> {
    serde_json::from_str::<ScorerResult>(body)
        .map_err(|e| ScorerError::Malformed(e.to_string()))?
        .validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_payload() {
        let r = parse_result(
            r#"{"probabilities":{"home":0.5,"draw":0.3,"away":0.2},"confidence":0.7,
                "expectedGoals":{"home":1.6,"away":0.9},"modelVersion":"gbm-3"}"#,
        )
        .unwrap();
        assert_eq!(r.model_version, "gbm-3");
        assert_eq!(r.expected_goals.map(|x| x.home), Some(1.6));
    }

    #[test]
    fn rejects_bad_probabilities() {
        assert!(matches!(
            parse_result(r#"{"probabilities":{"home":-0.5,"draw":0.3,"away":0.2}}"#),
            Err(ScorerError::Malformed(_))
        ));
        assert!(matches!(
            parse_result(r#"{"probabilities":{"home":0,"draw":0,"away":0}}"#),
            Err(ScorerError::Malformed(_))
        ));
        assert!(matches!(parse_result("not json"), Err(ScorerError::Malformed(_))));
    }
}
