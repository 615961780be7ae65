use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::upstream::DataKind;

pub const STATS_SOURCE: &str = "api-football";
pub const ODDS_FEED_SOURCE: &str = "scraper:oddsportal";
pub const WEATHER_FEED_SOURCE: &str = "scraper:openweather";

const DEFAULT_STATS_BASE: &str = "https://v3.football.api-sports.io";
const DEFAULT_API_KEY_HEADER: &str = "x-apisports-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PredictionMode {
    /// Rule-based estimate stands in for a missing scorer result.
    #[default]
    BestEffort,
    /// A missing scorer result is reported to the caller as unavailability.
    Strict,
}

impl fmt::Display for PredictionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionMode::BestEffort => f.write_str("best-effort"),
            PredictionMode::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for PredictionMode {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "best-effort" | "best_effort" | "besteffort" | "dev" | "development" | "test" => {
                Ok(PredictionMode::BestEffort)
            }
            "strict" | "prod" | "production" => Ok(PredictionMode::Strict),
            other => Err(anyhow::anyhow!(
                "unsupported SABISCORE_MODE={other}, expected best-effort or strict"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub source: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_key_header: String,
}

impl UpstreamConfig {
    pub fn new(source: &str, base_url: &str) -> Self {
        Self {
            source: source.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(10);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerPolicy {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub fixture: Duration,
    pub team_fixtures: Duration,
    pub head_to_head: Duration,
    pub injuries: Duration,
    pub odds: Duration,
    pub weather: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            fixture: Duration::from_secs(60 * 60),
            team_fixtures: Duration::from_secs(6 * 60 * 60),
            head_to_head: Duration::from_secs(24 * 60 * 60),
            injuries: Duration::from_secs(60 * 60),
            odds: Duration::from_secs(10 * 60),
            weather: Duration::from_secs(30 * 60),
        }
    }
}

impl CacheTtls {
    pub fn for_kind(&self, kind: DataKind) -> Duration {
        match kind {
            DataKind::Fixture => self.fixture,
            DataKind::TeamFixtures => self.team_fixtures,
            DataKind::HeadToHead => self.head_to_head,
            DataKind::Injuries => self.injuries,
            DataKind::Odds => self.odds,
            DataKind::Weather => self.weather,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mode: PredictionMode,
    pub scorer_timeout: Duration,
    pub scorer_temperature: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: PredictionMode::BestEffort,
            scorer_timeout: Duration::from_secs(5),
            scorer_temperature: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub stats: UpstreamConfig,
    pub odds_feed: Option<UpstreamConfig>,
    pub weather_feed: Option<UpstreamConfig>,
    pub scorer_url: Option<String>,
    pub engine: EngineConfig,
    pub retry: RetryPolicy,
    pub breaker: BreakerPolicy,
    pub ttls: CacheTtls,
    pub prediction_budget: Duration,
    pub cache_snapshot: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mode = match env::var("SABISCORE_MODE") {
            Ok(raw) if !raw.trim().is_empty() => raw.parse::<PredictionMode>()?,
            _ => PredictionMode::BestEffort,
        };

        let mut stats = UpstreamConfig::new(
            STATS_SOURCE,
            &env_string("STATS_API_BASE").unwrap_or_else(|| DEFAULT_STATS_BASE.to_string()),
        );
        stats.api_key = env_string("STATS_API_KEY");

        let odds_feed = env_string("ODDS_FEED_BASE").map(|base| {
            let mut cfg = UpstreamConfig::new(ODDS_FEED_SOURCE, &base);
            cfg.api_key = env_string("ODDS_FEED_KEY");
            cfg
        });
        let weather_feed = env_string("WEATHER_FEED_BASE").map(|base| {
            let mut cfg = UpstreamConfig::new(WEATHER_FEED_SOURCE, &base);
            cfg.api_key = env_string("WEATHER_FEED_KEY");
            cfg.api_key_header = "x-api-key".to_string();
            cfg
        });

        let scorer_temperature = match env_string("SCORER_TEMPERATURE") {
            Some(raw) => raw
                .parse::<f64>()
                .context("SCORER_TEMPERATURE must be a number")?
                .clamp(0.25, 4.0),
            None => 1.0,
        };

        let retry = RetryPolicy {
            max_attempts: env_u64("RETRY_MAX_ATTEMPTS", 4).clamp(1, 8) as u32,
            base_delay: Duration::from_millis(env_u64("RETRY_BASE_DELAY_MS", 250).min(10_000)),
            request_timeout: Duration::from_secs(env_u64("UPSTREAM_TIMEOUT_SECS", 10).clamp(1, 120)),
        };
        let breaker = BreakerPolicy {
            failure_threshold: env_u64("BREAKER_FAILURE_THRESHOLD", 5).clamp(1, 100) as u32,
            cooldown: Duration::from_secs(env_u64("BREAKER_COOLDOWN_SECS", 60).clamp(1, 3600)),
        };

        let d = CacheTtls::default();
        let ttls = CacheTtls {
            fixture: env_ttl("CACHE_TTL_FIXTURE_SECS", d.fixture),
            team_fixtures: env_ttl("CACHE_TTL_TEAM_FIXTURES_SECS", d.team_fixtures),
            head_to_head: env_ttl("CACHE_TTL_HEAD_TO_HEAD_SECS", d.head_to_head),
            injuries: env_ttl("CACHE_TTL_INJURIES_SECS", d.injuries),
            odds: env_ttl("CACHE_TTL_ODDS_SECS", d.odds),
            weather: env_ttl("CACHE_TTL_WEATHER_SECS", d.weather),
        };

        Ok(Self {
            stats,
            odds_feed,
            weather_feed,
            scorer_url: env_string("SCORER_URL"),
            engine: EngineConfig {
                mode,
                scorer_timeout: retry.request_timeout,
                scorer_temperature,
            },
            retry,
            breaker,
            ttls,
            prediction_budget: Duration::from_secs(
                env_u64("PREDICTION_BUDGET_SECS", 20).clamp(1, 300),
            ),
            cache_snapshot: env_bool("CACHE_SNAPSHOT", true),
        })
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_ttl(name: &str, default: Duration) -> Duration {
    Duration::from_secs(env_u64(name, default.as_secs()).clamp(1, 7 * 24 * 60 * 60))
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => {
            let lowered = raw.trim().to_ascii_lowercase();
            !(lowered == "0" || lowered == "false" || lowered == "no" || lowered == "off")
        }
        Err(_) => default,
    }
}
