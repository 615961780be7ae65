use tracing::debug;

use crate::calibration::Prob3;
use crate::data_client::DataClient;
use crate::features::{FixtureContext, MarketMetrics, OddsDrift};
use crate::upstream::{DataKind, OddsOutcome, OddsRecord, Prices1x2, param};

const MATCH_RESULT_KEYS: [&str; 3] = ["h2h", "1x2", "match_winner"];
const TOTALS_KEYS: [&str; 3] = ["totals", "over_under", "goals_over_under"];
const BTTS_KEYS: [&str; 2] = ["btts", "both_teams_score"];

/// `None` when no real 1X2 line could be read.
pub async fn calculate(client: &DataClient, ctx: &FixtureContext) -> Option<MarketMetrics> {
    let fetched = client
        .fetch(DataKind::Odds, &[param("fixture", ctx.fixture_id)])
        .await;
    if !fetched.is_real() {
        return None;
    }
    compute(fetched.payload.odds(), &ctx.home_team, &ctx.away_team)
}

pub fn compute(records: &[OddsRecord], home_team: &str, away_team: &str) -> Option<MarketMetrics> {
    let mut lines: Vec<Prices1x2> = Vec::new();
    let mut overs = Vec::new();
    let mut unders = Vec::new();
    let mut btts_yes = Vec::new();
    let mut btts_no = Vec::new();
    let mut opening: Option<Prices1x2> = None;

    for record in records {
        let home_name = record.home_team.as_deref().unwrap_or(home_team);
        let away_name = record.away_team.as_deref().unwrap_or(away_team);
        if opening.is_none() {
            opening = record.opening.filter(|p| valid_line(*p));
        }
        for bookmaker in &record.bookmakers {
            for market in &bookmaker.markets {
                let key = market.key.trim().to_ascii_lowercase();
                if MATCH_RESULT_KEYS.contains(&key.as_str()) {
                    if let Some(line) = extract_hda_prices(&market.outcomes, home_name, away_name) {
                        lines.push(line);
                    }
                } else if TOTALS_KEYS.contains(&key.as_str()) {
                    for o in &market.outcomes {
                        if !is_two_and_a_half(o) || o.price <= 1.0 {
                            continue;
                        }
                        let name = o.name.trim().to_ascii_lowercase();
                        if name.starts_with("over") {
                            overs.push(o.price);
                        } else if name.starts_with("under") {
                            unders.push(o.price);
                        }
                    }
                } else if BTTS_KEYS.contains(&key.as_str()) {
                    for o in market.outcomes.iter().filter(|o| o.price > 1.0) {
                        match o.name.trim().to_ascii_lowercase().as_str() {
                            "yes" => btts_yes.push(o.price),
                            "no" => btts_no.push(o.price),
                            _ => {}
                        }
                    }
                }
            }
        }
    }

    if lines.is_empty() {
        debug!("no complete 1x2 line in odds payload");
        return None;
    }

    let n = lines.len() as f64;
    let prices = Prices1x2 {
        home: lines.iter().map(|l| l.home).sum::<f64>() / n,
        draw: lines.iter().map(|l| l.draw).sum::<f64>() / n,
        away: lines.iter().map(|l| l.away).sum::<f64>() / n,
    };
    let (implied, overround) = no_vig_from_decimal(prices)?;

    let opening_line = opening.unwrap_or(prices);
    let drift = OddsDrift {
        home: prices.home - opening_line.home,
        draw: prices.draw - opening_line.draw,
        away: prices.away - opening_line.away,
    };
    let drift_velocity = (drift.home.abs() + drift.draw.abs() + drift.away.abs()) / 3.0;
    let implied_drift = match no_vig_from_decimal(opening_line) {
        Some((open, _)) => OddsDrift {
            home: implied.home - open.home,
            draw: implied.draw - open.draw,
            away: implied.away - open.away,
        },
        None => OddsDrift {
            home: 0.0,
            draw: 0.0,
            away: 0.0,
        },
    };

    Some(MarketMetrics {
        bookmakers: lines.len(),
        prices,
        overround,
        implied,
        opening,
        drift,
        drift_velocity,
        implied_drift,
        over_2_5_price: mean(&overs),
        under_2_5_price: mean(&unders),
        btts_yes_price: mean(&btts_yes),
        btts_no_price: mean(&btts_no),
    })
}

fn extract_hda_prices(outcomes: &[OddsOutcome], home_team: &str, away_team: &str) -> Option<Prices1x2> {
    let mut home: Option<f64> = None;
    let mut draw: Option<f64> = None;
    let mut away: Option<f64> = None;

    for outcome in outcomes {
        let name = outcome.name.trim();
        if is_draw_label(name) {
            draw = Some(outcome.price);
        } else if is_side_label(name, "home", "1", home_team) {
            home = Some(outcome.price);
        } else if is_side_label(name, "away", "2", away_team) {
            away = Some(outcome.price);
        }
    }

    let line = Prices1x2 {
        home: home?,
        draw: draw?,
        away: away?,
    };
    valid_line(line).then_some(line)
}

/// Implied probabilities with the bookmaker margin removed, plus that margin.
fn no_vig_from_decimal(p: Prices1x2) -> Option<(Prob3, f64)> {
    if !valid_line(p) {
        return None;
    }
    let ih = 1.0 / p.home;
    let id = 1.0 / p.draw;
    let ia = 1.0 / p.away;
    let sum = ih + id + ia;
    Some((
        Prob3 {
            home: ih / sum,
            draw: id / sum,
            away: ia / sum,
        },
        sum - 1.0,
    ))
}

fn valid_line(p: Prices1x2) -> bool {
    [p.home, p.draw, p.away]
        .iter()
        .all(|v| v.is_finite() && *v > 1.0)
}

fn is_draw_label(name: &str) -> bool {
    let n = name.to_ascii_lowercase();
    n == "draw" || n == "tie" || n == "x"
}

fn is_side_label(name: &str, side: &str, code: &str, team: &str) -> bool {
    name.eq_ignore_ascii_case(side)
        || name == code
        || (!team.trim().is_empty() && name.eq_ignore_ascii_case(team.trim()))
}

fn is_two_and_a_half(o: &OddsOutcome) -> bool {
    match o.point {
        Some(p) => (p - 2.5).abs() < 1e-9,
        None => o.name.contains("2.5"),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> OddsRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn averages_bookmakers_and_removes_margin() {
        let r = record(json!({
            "home_team": "Arsenal",
            "away_team": "Chelsea",
            "bookmakers": [
                {"key": "a", "markets": [{"key": "h2h", "outcomes": [
                    {"name": "Arsenal", "price": 2.0},
                    {"name": "Draw", "price": 3.4},
                    {"name": "Chelsea", "price": 3.8}
                ]}]},
                {"key": "b", "markets": [{"key": "h2h", "outcomes": [
                    {"name": "Home", "price": 2.2},
                    {"name": "X", "price": 3.2},
                    {"name": "Away", "price": 3.6}
                ]}]}
            ]
        }));
        let m = compute(&[r], "Arsenal", "Chelsea").unwrap();
        assert_eq!(m.bookmakers, 2);
        assert!((m.prices.home - 2.1).abs() < 1e-9);
        assert!(m.overround > 0.0);
        let sum = m.implied.home + m.implied.draw + m.implied.away;
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(m.drift_velocity, 0.0);
    }

    #[test]
    fn drift_is_current_minus_opening() {
        let r = record(json!({
            "bookmakers": [{"key": "a", "markets": [
                {"key": "h2h", "outcomes": [
                    {"name": "Home", "price": 1.8},
                    {"name": "Draw", "price": 3.6},
                    {"name": "Away", "price": 4.5}
                ]},
                {"key": "totals", "outcomes": [
                    {"name": "Over", "price": 1.9, "point": 2.5},
                    {"name": "Under", "price": 1.95, "point": 2.5},
                    {"name": "Over", "price": 1.3, "point": 1.5}
                ]}
            ]}],
            "opening": {"home": 2.1, "draw": 3.4, "away": 3.9}
        }));
        let m = compute(&[r], "", "").unwrap();
        assert!((m.drift.home + 0.3).abs() < 1e-9);
        assert!((m.drift.away - 0.6).abs() < 1e-9);
        assert!((m.drift_velocity - (0.3 + 0.2 + 0.6) / 3.0).abs() < 1e-9);
        assert!(m.implied_drift.home > 0.0);
        assert_eq!(m.over_2_5_price, Some(1.9));
        assert_eq!(m.under_2_5_price, Some(1.95));
    }

    #[test]
    fn incomplete_line_is_no_market() {
        let r = record(json!({
            "bookmakers": [{"key": "a", "markets": [{"key": "h2h", "outcomes": [
                {"name": "Home", "price": 1.8},
                {"name": "Away", "price": 4.5}
            ]}]}]
        }));
        assert!(compute(&[r], "", "").is_none());
    }
}
