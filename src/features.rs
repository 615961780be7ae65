//! Per-match feature slices and the merged bundle handed to the prediction engine.

use serde::{Deserialize, Serialize};

use crate::calibration::Prob3;
use crate::upstream::{FixtureRecord, Prices1x2};

/// Points per game a side with no recorded matches is assumed to take.
pub const NEUTRAL_PPG: f64 = 1.35;
pub const LEAGUE_GOALS_PER_TEAM: f64 = 1.30;
pub const HOME_ADVANTAGE: f64 = 1.15;
pub const DEFAULT_VENUE_ADVANTAGE: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureContext {
    pub fixture_id: u64,
    pub home_team_id: u64,
    pub home_team: String,
    pub away_team_id: u64,
    pub away_team: String,
    #[serde(default)]
    pub league_id: Option<u32>,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub kickoff: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl FixtureContext {
    pub fn from_record(record: &FixtureRecord) -> Self {
        let venue = record.fixture.venue.as_ref();
        Self {
            fixture_id: record.fixture.id,
            home_team_id: record.teams.home.id,
            home_team: record.teams.home.name.clone(),
            away_team_id: record.teams.away.id,
            away_team: record.teams.away.name.clone(),
            league_id: record.league.as_ref().map(|l| l.id),
            season: record.league.as_ref().and_then(|l| l.season),
            kickoff: record.fixture.date.clone(),
            venue: venue.and_then(|v| v.name.clone()),
            city: venue.and_then(|v| v.city.clone()),
        }
    }

    /// Placeholder used when the fixture itself cannot be resolved.
    pub fn unknown(fixture_id: u64) -> Self {
        Self {
            fixture_id,
            home_team_id: 0,
            home_team: "Home".to_string(),
            away_team_id: 0,
            away_team: "Away".to_string(),
            league_id: None,
            season: None,
            kickoff: None,
            venue: None,
            city: None,
        }
    }

    pub fn teams_known(&self) -> bool {
        self.home_team_id != 0 && self.away_team_id != 0 && self.home_team_id != self.away_team_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamForm {
    /// Oldest first, most recent last.
    pub form_string: String,
    pub matches: usize,
    pub points: u32,
    pub weighted_ppg: f64,
    pub flat_ppg: f64,
    pub trend: Trend,
    pub goals_for: f64,
    pub goals_against: f64,
}

impl Default for TeamForm {
    fn default() -> Self {
        Self {
            form_string: String::new(),
            matches: 0,
            points: 0,
            weighted_ppg: NEUTRAL_PPG,
            flat_ppg: NEUTRAL_PPG,
            trend: Trend::Stable,
            goals_for: LEAGUE_GOALS_PER_TEAM,
            goals_against: LEAGUE_GOALS_PER_TEAM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FormPair {
    pub home: TeamForm,
    pub away: TeamForm,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectedGoals {
    pub home: f64,
    pub away: f64,
    pub differential: f64,
    pub home_attack: f64,
    pub home_defense: f64,
    pub away_attack: f64,
    pub away_defense: f64,
    pub league_average: f64,
    pub home_clean_sheet: f64,
    pub away_clean_sheet: f64,
    pub over_2_5: f64,
    pub both_teams_score: f64,
    pub sample_matches: usize,
    pub available: bool,
}

impl Default for ExpectedGoals {
    fn default() -> Self {
        crate::expected_goals::from_strengths(1.0, 1.0, 1.0, 1.0, LEAGUE_GOALS_PER_TEAM, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HeadToHead {
    pub meetings: usize,
    /// Wins by the side playing at home in this fixture, wherever the meeting was held.
    pub home_wins: usize,
    pub draws: usize,
    pub away_wins: usize,
    pub advantage: f64,
    pub avg_goals: f64,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueAdvantage {
    pub venue: Option<String>,
    pub home_ppg_at_home: Option<f64>,
    pub away_ppg_on_road: Option<f64>,
    pub advantage: f64,
    pub available: bool,
}

impl Default for VenueAdvantage {
    fn default() -> Self {
        Self {
            venue: None,
            home_ppg_at_home: None,
            away_ppg_on_road: None,
            advantage: DEFAULT_VENUE_ADVANTAGE,
            available: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailablePlayer {
    pub name: String,
    pub severity: u8,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TeamInjuries {
    pub players: Vec<UnavailablePlayer>,
    pub severity_total: u32,
    pub impact: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct InjuryImpact {
    pub home: TeamInjuries,
    pub away: TeamInjuries,
    /// Away impact minus home impact; positive favours the home side.
    pub differential: f64,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OddsDrift {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketMetrics {
    pub bookmakers: usize,
    pub prices: Prices1x2,
    pub overround: f64,
    /// Implied probabilities with the overround removed.
    pub implied: Prob3,
    #[serde(default)]
    pub opening: Option<Prices1x2>,
    /// Current minus opening decimal odds.
    pub drift: OddsDrift,
    pub drift_velocity: f64,
    /// Current minus opening implied probability.
    pub implied_drift: OddsDrift,
    #[serde(default)]
    pub over_2_5_price: Option<f64>,
    #[serde(default)]
    pub under_2_5_price: Option<f64>,
    #[serde(default)]
    pub btts_yes_price: Option<f64>,
    #[serde(default)]
    pub btts_no_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherMetrics {
    pub temperature_c: Option<f64>,
    pub wind_kph: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub condition: Option<String>,
    pub goals_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DataQuality {
    pub completeness: f64,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFeatureBundle {
    pub fixture: FixtureContext,
    #[serde(default)]
    pub form: FormPair,
    #[serde(default)]
    pub expected_goals: ExpectedGoals,
    #[serde(default)]
    pub head_to_head: HeadToHead,
    #[serde(default)]
    pub venue: VenueAdvantage,
    #[serde(default)]
    pub injuries: InjuryImpact,
    #[serde(default)]
    pub market: Option<MarketMetrics>,
    #[serde(default)]
    pub weather: Option<WeatherMetrics>,
    #[serde(default)]
    pub data_quality: DataQuality,
}

impl MatchFeatureBundle {
    /// Every slice at its documented default.
    pub fn neutral(fixture: FixtureContext) -> Self {
        Self {
            fixture,
            form: FormPair::default(),
            expected_goals: ExpectedGoals::default(),
            head_to_head: HeadToHead::default(),
            venue: VenueAdvantage::default(),
            injuries: InjuryImpact::default(),
            market: None,
            weather: None,
            data_quality: DataQuality::default(),
        }
    }

    /// Which of the seven calculators produced real data, in evaluation order.
    pub fn availability(&self) -> [bool; 7] {
        [
            self.form.available,
            self.expected_goals.available,
            self.head_to_head.available,
            self.venue.available,
            self.injuries.available,
            self.market.is_some(),
            self.weather.is_some(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_bundle_has_no_available_slices() {
        let bundle = MatchFeatureBundle::neutral(FixtureContext::unknown(5));
        assert!(bundle.availability().iter().all(|a| !a));
        assert!((bundle.expected_goals.home - 1.495).abs() < 1e-9);
        assert!((bundle.expected_goals.away - 1.30).abs() < 1e-9);
        assert!(!bundle.fixture.teams_known());
    }
}
