use serde::{Deserialize, Serialize};

use crate::features::MatchFeatureBundle;

pub const MAX_FACTORS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorCategory {
    Form,
    ExpectedGoals,
    Venue,
    HeadToHead,
    Injuries,
    Market,
    Weather,
}

impl FactorCategory {
    /// Minimum |impact| for the factor to be shown.
    pub fn threshold(self) -> f64 {
        match self {
            FactorCategory::Form => 0.10,
            FactorCategory::ExpectedGoals => 0.10,
            FactorCategory::Venue => 0.05,
            FactorCategory::HeadToHead => 0.20,
            FactorCategory::Injuries => 0.15,
            FactorCategory::Market => 0.08,
            FactorCategory::Weather => 0.03,
        }
    }
}

/// Signed impact: positive leans home, negative leans away. Weather is signed
/// by its effect on total goals instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedFactor {
    pub name: String,
    pub impact: f64,
    pub description: String,
    pub category: FactorCategory,
}

impl OrderedFactor {
    fn new(category: FactorCategory, name: &str, impact: f64, description: String) -> Self {
        Self {
            name: name.to_string(),
            impact,
            description,
            category,
        }
    }
}

/// Every signal that produced real data, in calculator evaluation order.
pub fn candidate_factors(bundle: &MatchFeatureBundle) -> Vec<OrderedFactor> {
    let ctx = &bundle.fixture;
    let mut out = Vec::new();

    let form = &bundle.form;
    if form.available {
        let impact = ((form.home.weighted_ppg - form.away.weighted_ppg) / 3.0).clamp(-1.0, 1.0);
        out.push(OrderedFactor::new(
            FactorCategory::Form,
            "Recent form",
            impact,
            format!(
                "{} {} ({:.2} ppg) vs {} {} ({:.2} ppg)",
                ctx.home_team,
                or_dash(&form.home.form_string),
                form.home.weighted_ppg,
                ctx.away_team,
                or_dash(&form.away.form_string),
                form.away.weighted_ppg
            ),
        ));
    }

    let xg = &bundle.expected_goals;
    if xg.available {
        out.push(OrderedFactor::new(
            FactorCategory::ExpectedGoals,
            "Expected goals",
            (xg.differential / 2.0).clamp(-1.0, 1.0),
            format!("Projected {:.2} - {:.2} expected goals", xg.home, xg.away),
        ));
    }

    let venue = &bundle.venue;
    if venue.available {
        out.push(OrderedFactor::new(
            FactorCategory::Venue,
            "Venue advantage",
            venue.advantage,
            format!(
                "{} take {:.2} ppg at home, {} {:.2} ppg away",
                ctx.home_team,
                venue.home_ppg_at_home.unwrap_or_default(),
                ctx.away_team,
                venue.away_ppg_on_road.unwrap_or_default()
            ),
        ));
    }

    let h2h = &bundle.head_to_head;
    if h2h.available {
        out.push(OrderedFactor::new(
            FactorCategory::HeadToHead,
            "Head-to-head",
            h2h.advantage,
            format!(
                "{}W {}D {}L for {} in the last {} meetings",
                h2h.home_wins, h2h.draws, h2h.away_wins, ctx.home_team, h2h.meetings
            ),
        ));
    }

    let inj = &bundle.injuries;
    if inj.available {
        out.push(OrderedFactor::new(
            FactorCategory::Injuries,
            "Injuries",
            inj.differential,
            format!(
                "{} missing {}, {} missing {}",
                ctx.home_team,
                inj.home.players.len(),
                ctx.away_team,
                inj.away.players.len()
            ),
        ));
    }

    if let Some(m) = &bundle.market {
        let lean = m.implied_drift.home - m.implied_drift.away;
        let impact = if lean < 0.0 {
            -m.drift_velocity
        } else {
            m.drift_velocity
        };
        let toward = if lean < 0.0 { &ctx.away_team } else { &ctx.home_team };
        out.push(OrderedFactor::new(
            FactorCategory::Market,
            "Market movement",
            impact,
            format!(
                "Odds moved {:.2} on average since opening, toward {}",
                m.drift_velocity, toward
            ),
        ));
    }

    if let Some(w) = &bundle.weather {
        out.push(OrderedFactor::new(
            FactorCategory::Weather,
            "Weather",
            w.goals_multiplier - 1.0,
            format!(
                "{} conditions scale expected goals by {:.2}",
                w.condition.as_deref().unwrap_or("Reported"),
                w.goals_multiplier
            ),
        ));
    }

    out
}

/// Keep material factors, strongest first, at most [`MAX_FACTORS`]. Ties keep input order.
pub fn rank_factors(candidates: Vec<OrderedFactor>) -> Vec<OrderedFactor> {
    let mut kept: Vec<OrderedFactor> = candidates
        .into_iter()
        .filter(|f| f.impact.is_finite() && f.impact.abs() > f.category.threshold())
        .collect();
    kept.sort_by(|a, b| b.impact.abs().total_cmp(&a.impact.abs()));
    kept.truncate(MAX_FACTORS);
    kept
}

pub fn top_factors(bundle: &MatchFeatureBundle) -> Vec<OrderedFactor> {
    rank_factors(candidate_factors(bundle))
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}
