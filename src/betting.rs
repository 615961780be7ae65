use serde::{Deserialize, Serialize};

use crate::calibration::Outcome;
use crate::features::MatchFeatureBundle;
use crate::normalize::{Percent, Probabilities, normalize_pair};
use crate::poisson;

/// Leading side of a yes/no market must reach this before it is suggested.
pub const MARKET_CONFIDENCE: Percent = Percent::from_tenths(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalMarkets {
    pub over_2_5: Percent,
    pub under_2_5: Percent,
    pub btts_yes: Percent,
    pub btts_no: Percent,
    pub home_clean_sheet: Percent,
    pub away_clean_sheet: Percent,
}

impl AdditionalMarkets {
    /// Poisson-derived side markets for the given scoring rates.
    pub fn from_lambdas(lambda_home: f64, lambda_away: f64) -> Self {
        let (over_2_5, under_2_5) = normalize_pair(poisson::over_2_5(lambda_home, lambda_away));
        let (btts_yes, btts_no) =
            normalize_pair(poisson::both_teams_score(lambda_home, lambda_away));
        Self {
            over_2_5,
            under_2_5,
            btts_yes,
            btts_no,
            home_clean_sheet: Percent::from_probability(poisson::clean_sheet(lambda_away)),
            away_clean_sheet: Percent::from_probability(poisson::clean_sheet(lambda_home)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetMarket {
    MatchResult,
    OverUnder25,
    BothTeamsScore,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetSuggestion {
    pub market: BetMarket,
    pub selection: String,
    pub probability: Percent,
    /// 100 / probability, two decimals.
    pub fair_odds: f64,
    #[serde(default)]
    pub bookmaker_odds: Option<f64>,
    /// Expected return per unit staked at the bookmaker price.
    #[serde(default)]
    pub edge: Option<f64>,
    pub rationale: String,
}

pub fn suggest_bets(
    probs: &Probabilities,
    markets: &AdditionalMarkets,
    lambdas: (f64, f64),
    bundle: &MatchFeatureBundle,
) -> Vec<BetSuggestion> {
    let ctx = &bundle.fixture;
    let market = bundle.market.as_ref();
    let mut out = Vec::new();

    let leader = probs.leader();
    let p = probs.get(leader);
    let (selection, price) = match leader {
        Outcome::Home => (ctx.home_team.clone(), market.map(|m| m.prices.home)),
        Outcome::Draw => ("Draw".to_string(), market.map(|m| m.prices.draw)),
        Outcome::Away => (ctx.away_team.clone(), market.map(|m| m.prices.away)),
    };
    let form = &bundle.form;
    let rationale = match leader {
        Outcome::Draw => format!(
            "Evenly matched: {p}% draw with projected goals {:.2} - {:.2}",
            lambdas.0, lambdas.1
        ),
        Outcome::Home | Outcome::Away => {
            let (team_form, side) = if leader == Outcome::Home {
                (&form.home, "at home")
            } else {
                (&form.away, "on the road")
            };
            let recent = if team_form.form_string.is_empty() {
                String::new()
            } else {
                format!(", recent form {}", team_form.form_string)
            };
            format!(
                "{selection} favoured {side} at {p}%{recent}, projected goals {:.2} - {:.2}",
                lambdas.0, lambdas.1
            )
        }
    };
    out.push(suggestion(BetMarket::MatchResult, selection, p, price, rationale));

    let total = lambdas.0 + lambdas.1;
    if markets.over_2_5 >= MARKET_CONFIDENCE {
        out.push(suggestion(
            BetMarket::OverUnder25,
            "Over 2.5".to_string(),
            markets.over_2_5,
            market.and_then(|m| m.over_2_5_price),
            format!("Combined expected goals {total:.2} point to an open game"),
        ));
    } else if markets.under_2_5 >= MARKET_CONFIDENCE {
        out.push(suggestion(
            BetMarket::OverUnder25,
            "Under 2.5".to_string(),
            markets.under_2_5,
            market.and_then(|m| m.under_2_5_price),
            format!("Combined expected goals of only {total:.2}"),
        ));
    }

    if markets.btts_yes >= MARKET_CONFIDENCE {
        out.push(suggestion(
            BetMarket::BothTeamsScore,
            "Yes".to_string(),
            markets.btts_yes,
            market.and_then(|m| m.btts_yes_price),
            format!(
                "Both sides expected to score ({:.2} and {:.2})",
                lambdas.0, lambdas.1
            ),
        ));
    } else if markets.btts_no >= MARKET_CONFIDENCE {
        let (team, cs) = if markets.home_clean_sheet >= markets.away_clean_sheet {
            (&ctx.home_team, markets.home_clean_sheet)
        } else {
            (&ctx.away_team, markets.away_clean_sheet)
        };
        out.push(suggestion(
            BetMarket::BothTeamsScore,
            "No".to_string(),
            markets.btts_no,
            market.and_then(|m| m.btts_no_price),
            format!("{team} keep a clean sheet {cs}% of the time in this projection"),
        ));
    }

    out
}

fn suggestion(
    market: BetMarket,
    selection: String,
    probability: Percent,
    bookmaker_odds: Option<f64>,
    rationale: String,
) -> BetSuggestion {
    let fraction = probability.fraction();
    let fair_odds = if fraction > 0.0 {
        round_to(1.0 / fraction, 2)
    } else {
        0.0
    };
    let bookmaker_odds = bookmaker_odds.filter(|o| o.is_finite() && *o > 1.0);
    BetSuggestion {
        market,
        selection,
        probability,
        fair_odds,
        bookmaker_odds,
        edge: bookmaker_odds.map(|o| round_to(fraction * o - 1.0, 3)),
        rationale,
    }
}

fn round_to(v: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (v * f).round() / f
}
