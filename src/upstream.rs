//! Upstream wire shapes, response classification and synthetic stand-ins.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::UpstreamFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Fixture,
    TeamFixtures,
    HeadToHead,
    Injuries,
    Odds,
    Weather,
}

impl DataKind {
    pub fn path(self) -> &'static str {
        match self {
            DataKind::Fixture | DataKind::TeamFixtures => "/fixtures",
            DataKind::HeadToHead => "/fixtures/headtohead",
            DataKind::Injuries => "/injuries",
            DataKind::Odds => "/odds",
            DataKind::Weather => "/weather",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataKind::Fixture => "fixture",
            DataKind::TeamFixtures => "team_fixtures",
            DataKind::HeadToHead => "head_to_head",
            DataKind::Injuries => "injuries",
            DataKind::Odds => "odds",
            DataKind::Weather => "weather",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn param(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

/// Request signature: kind, path and parameters sorted by lower-cased name.
pub fn cache_key(kind: DataKind, params: &[(String, String)]) -> String {
    let mut pairs: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    pairs.sort();
    let query = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}:{}?{}", kind.as_str(), kind.path(), query)
}

// ── fixtures ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub fixture: FixtureInfo,
    #[serde(default)]
    pub league: Option<LeagueInfo>,
    pub teams: Teams,
    #[serde(default)]
    pub goals: Goals,
    #[serde(default)]
    pub expected_goals: Option<ExpectedGoalsPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureInfo {
    pub id: u64,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub venue: Option<VenueInfo>,
    #[serde(default)]
    pub status: Option<FixtureStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueInfo {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureStatus {
    pub short: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueInfo {
    pub id: u32,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teams {
    pub home: TeamRef,
    pub away: TeamRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Goals {
    #[serde(default)]
    pub home: Option<u8>,
    #[serde(default)]
    pub away: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedGoalsPair {
    pub home: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchResult {
    Win,
    Draw,
    Loss,
}

impl MatchResult {
    pub fn points(self) -> u8 {
        match self {
            MatchResult::Win => 3,
            MatchResult::Draw => 1,
            MatchResult::Loss => 0,
        }
    }

    pub fn letter(self) -> char {
        match self {
            MatchResult::Win => 'W',
            MatchResult::Draw => 'D',
            MatchResult::Loss => 'L',
        }
    }
}

const FINISHED_STATUSES: [&str; 3] = ["FT", "AET", "PEN"];

impl FixtureRecord {
    pub fn is_finished(&self) -> bool {
        let scored = self.goals.home.is_some() && self.goals.away.is_some();
        match self.fixture.status.as_ref() {
            Some(status) => {
                scored && FINISHED_STATUSES.contains(&status.short.trim().to_uppercase().as_str())
            }
            None => scored,
        }
    }

    pub fn involves(&self, team_id: u64) -> bool {
        self.teams.home.id == team_id || self.teams.away.id == team_id
    }

    pub fn is_home(&self, team_id: u64) -> bool {
        self.teams.home.id == team_id
    }

    /// Goals scored and conceded by `team_id`, if the match is finished and involves it.
    pub fn goals_for_against(&self, team_id: u64) -> Option<(f64, f64)> {
        if !self.is_finished() || !self.involves(team_id) {
            return None;
        }
        let h = self.goals.home? as f64;
        let a = self.goals.away? as f64;
        Some(if self.is_home(team_id) { (h, a) } else { (a, h) })
    }

    /// Upstream xG for and against `team_id`, falling back to goals.
    pub fn chances_for_against(&self, team_id: u64) -> Option<(f64, f64)> {
        let goals = self.goals_for_against(team_id)?;
        let Some(xg) = self.expected_goals else {
            return Some(goals);
        };
        if !xg.home.is_finite() || !xg.away.is_finite() || xg.home < 0.0 || xg.away < 0.0 {
            return Some(goals);
        }
        Some(if self.is_home(team_id) {
            (xg.home, xg.away)
        } else {
            (xg.away, xg.home)
        })
    }

    pub fn result_for(&self, team_id: u64) -> Option<MatchResult> {
        let (scored, conceded) = self.goals_for_against(team_id)?;
        Some(if scored > conceded {
            MatchResult::Win
        } else if scored < conceded {
            MatchResult::Loss
        } else {
            MatchResult::Draw
        })
    }

    pub fn kickoff(&self) -> &str {
        self.fixture.date.as_deref().unwrap_or_default()
    }
}

/// Finished matches of `team_id`, most recent first. ISO timestamps sort lexically.
pub fn finished_most_recent_first(fixtures: &[FixtureRecord], team_id: u64) -> Vec<&FixtureRecord> {
    let mut out: Vec<&FixtureRecord> = fixtures
        .iter()
        .filter(|f| f.involves(team_id) && f.is_finished())
        .collect();
    out.sort_by(|a, b| {
        b.kickoff()
            .cmp(a.kickoff())
            .then(b.fixture.id.cmp(&a.fixture.id))
    });
    out.dedup_by_key(|f| f.fixture.id);
    out
}

// ── odds ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsRecord {
    #[serde(default)]
    pub fixture_id: Option<u64>,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub commence_time: Option<String>,
    #[serde(default)]
    pub bookmakers: Vec<OddsBookmaker>,
    #[serde(default)]
    pub opening: Option<Prices1x2>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsBookmaker {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub markets: Vec<OddsMarket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsMarket {
    pub key: String,
    #[serde(default)]
    pub outcomes: Vec<OddsOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsOutcome {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub point: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prices1x2 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

// ── injuries ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryRecord {
    pub player: InjuredPlayer,
    pub team: TeamRef,
    #[serde(default)]
    pub severity: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuredPlayer {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

// ── weather ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    #[serde(default)]
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub wind_kph: Option<f64>,
    #[serde(default)]
    pub precipitation_mm: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub condition: Option<String>,
}

// ── payloads ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Fixtures(Vec<FixtureRecord>),
    Odds(Vec<OddsRecord>),
    Injuries(Vec<InjuryRecord>),
    Weather(Vec<WeatherRecord>),
}

impl Payload {
    /// Typed view of raw rows. Rows that do not fit the shape are skipped.
    pub fn decode(kind: DataKind, rows: &[Value]) -> Payload {
        match kind {
            DataKind::Fixture | DataKind::TeamFixtures | DataKind::HeadToHead => {
                Payload::Fixtures(decode_rows(kind, rows))
            }
            DataKind::Odds => Payload::Odds(decode_rows(kind, rows)),
            DataKind::Injuries => Payload::Injuries(decode_rows(kind, rows)),
            DataKind::Weather => Payload::Weather(decode_rows(kind, rows)),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Fixtures(v) => v.is_empty(),
            Payload::Odds(v) => v.is_empty(),
            Payload::Injuries(v) => v.is_empty(),
            Payload::Weather(v) => v.is_empty(),
        }
    }

    pub fn fixtures(&self) -> &[FixtureRecord] {
        match self {
            Payload::Fixtures(v) => v,
            _ => &[],
        }
    }

    pub fn odds(&self) -> &[OddsRecord] {
        match self {
            Payload::Odds(v) => v,
            _ => &[],
        }
    }

    pub fn injuries(&self) -> &[InjuryRecord] {
        match self {
            Payload::Injuries(v) => v,
            _ => &[],
        }
    }

    pub fn weather(&self) -> &[WeatherRecord] {
        match self {
            Payload::Weather(v) => v,
            _ => &[],
        }
    }
}

fn decode_rows<T: for<'de> Deserialize<'de>>(kind: DataKind, rows: &[Value]) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match serde_json::from_value::<T>(row.clone()) {
            Ok(v) => Some(v),
            Err(err) => {
                debug!(%kind, error = %err, "skipping malformed upstream row");
                None
            }
        })
        .collect()
}

/// Placeholder rows with the same shape as a real response.
pub fn synthetic_rows(kind: DataKind, params: &[(String, String)]) -> Vec<Value> {
    match kind {
        DataKind::Fixture => {
            let id = lookup_param(params, "id")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            vec![json!({
                "fixture": { "id": id, "status": { "short": "NS" } },
                "teams": {
                    "home": { "id": 0, "name": "Home" },
                    "away": { "id": 0, "name": "Away" }
                },
                "goals": { "home": null, "away": null }
            })]
        }
        DataKind::TeamFixtures | DataKind::HeadToHead | DataKind::Injuries => Vec::new(),
        DataKind::Odds => vec![json!({
            "fixture_id": lookup_param(params, "fixture").and_then(|v| v.parse::<u64>().ok()),
            "bookmakers": [{
                "key": "synthetic",
                "markets": [{
                    "key": "h2h",
                    "outcomes": [
                        { "name": "Home", "price": 2.00 },
                        { "name": "Draw", "price": 3.20 },
                        { "name": "Away", "price": 3.50 }
                    ]
                }]
            }],
            "opening": { "home": 2.00, "draw": 3.20, "away": 3.50 }
        })],
        DataKind::Weather => vec![json!({
            "temperature_c": 15.0,
            "wind_kph": 10.0,
            "precipitation_mm": 0.0,
            "condition": "clear"
        })],
    }
}

fn lookup_param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

// ── classification ──────────────────────────────────────────────────────

/// Sort one upstream answer into rows or a classified failure.
pub fn classify_response(status: u16, body: &str) -> Result<Vec<Value>, UpstreamFailure> {
    if status == 429 {
        return Err(UpstreamFailure::RateLimited(format!(
            "http 429: {}",
            snippet(body)
        )));
    }

    let parsed = serde_json::from_str::<Value>(body.trim()).ok();
    let messages = parsed.as_ref().map(error_messages).unwrap_or_default();
    if let Some(failure) = classify_messages(&messages) {
        return Err(failure);
    }

    match status {
        200..=299 => {}
        401 | 403 => {
            return Err(UpstreamFailure::Unauthorized(format!(
                "http {status}: {}",
                snippet(body)
            )));
        }
        400..=499 => {
            return Err(UpstreamFailure::Unauthorized(format!(
                "http {status}: {}",
                snippet(body)
            )));
        }
        _ => {
            return Err(UpstreamFailure::Transient(format!(
                "http {status}: {}",
                snippet(body)
            )));
        }
    }

    let Some(value) = parsed else {
        return Err(UpstreamFailure::Transient(format!(
            "unparseable body: {}",
            snippet(body)
        )));
    };
    match value {
        Value::Array(rows) => Ok(rows),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut map) => match map.remove("response") {
            Some(Value::Array(rows)) => Ok(rows),
            Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Object(obj)) => Ok(vec![Value::Object(obj)]),
            Some(_) | None => Err(UpstreamFailure::Transient(
                "response field missing or not a list".to_string(),
            )),
        },
        _ => Err(UpstreamFailure::Transient(format!(
            "unexpected body: {}",
            snippet(body)
        ))),
    }
}

fn error_messages(v: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    match v.get("errors") {
        Some(Value::Object(map)) => {
            for (key, val) in map {
                let msg = match val {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push((key.to_ascii_lowercase(), msg));
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                match item {
                    Value::String(s) if !s.trim().is_empty() => out.push((String::new(), s.clone())),
                    Value::Object(map) => {
                        for (key, val) in map {
                            out.push((key.to_ascii_lowercase(), val.to_string()));
                        }
                    }
                    _ => {}
                }
            }
        }
        Some(Value::String(s)) if !s.trim().is_empty() => out.push((String::new(), s.clone())),
        _ => {}
    }
    if v.get("response").is_none() {
        if let Some(Value::String(msg)) = v.get("message") {
            out.push(("message".to_string(), msg.clone()));
        }
    }
    out
}

fn classify_messages(messages: &[(String, String)]) -> Option<UpstreamFailure> {
    if messages.is_empty() {
        return None;
    }
    let joined = messages
        .iter()
        .map(|(_, m)| m.as_str())
        .collect::<Vec<_>>()
        .join("; ");

    let has = |pred: &dyn Fn(&str, &str) -> bool| {
        messages
            .iter()
            .any(|(k, m)| pred(k.as_str(), m.to_ascii_lowercase().as_str()))
    };

    if has(&|k, m| {
        k == "requests" || k == "ratelimit" || m.contains("too many requests") || m.contains("limit")
    }) {
        return Some(UpstreamFailure::RateLimited(joined));
    }
    if has(&|k, m| k == "plan" || m.contains("plan") || m.contains("do not have access")) {
        return Some(UpstreamFailure::PlanLimited(joined));
    }
    if has(&|k, m| {
        k == "token" || m.contains("api key") || m.contains("application key") || m.contains("unauthorized")
    }) {
        return Some(UpstreamFailure::Unauthorized(joined));
    }
    Some(UpstreamFailure::Transient(joined))
}

fn snippet(body: &str) -> String {
    body.trim()
        .replace(['\n', '\r'], " ")
        .chars()
        .take(220)
        .collect()
}
