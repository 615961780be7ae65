use tracing::debug;

use crate::data_client::DataClient;
use crate::features::{FixtureContext, VenueAdvantage};
use crate::form::team_history;
use crate::upstream::{FixtureRecord, finished_most_recent_first};

pub async fn calculate(client: &DataClient, ctx: &FixtureContext) -> VenueAdvantage {
    if !ctx.teams_known() {
        return VenueAdvantage {
            venue: ctx.venue.clone(),
            ..VenueAdvantage::default()
        };
    }
    let (home, away) = tokio::join!(
        team_history(client, ctx.home_team_id),
        team_history(client, ctx.away_team_id)
    );
    let mut out = compute(
        home.as_deref().unwrap_or_default(),
        away.as_deref().unwrap_or_default(),
        ctx.home_team_id,
        ctx.away_team_id,
    );
    out.venue = ctx.venue.clone();
    out
}

/// Home side's points per game at home against the away side's on the road, scaled to [-1, 1].
pub fn compute(
    home_fixtures: &[FixtureRecord],
    away_fixtures: &[FixtureRecord],
    home_id: u64,
    away_id: u64,
) -> VenueAdvantage {
    let home_ppg = ppg(home_fixtures, home_id, true);
    let away_ppg = ppg(away_fixtures, away_id, false);
    let (Some(h), Some(a)) = (home_ppg, away_ppg) else {
        debug!(home_id, away_id, "not enough venue splits, using standard home advantage");
        return VenueAdvantage {
            home_ppg_at_home: home_ppg,
            away_ppg_on_road: away_ppg,
            ..VenueAdvantage::default()
        };
    };
    VenueAdvantage {
        venue: None,
        home_ppg_at_home: Some(h),
        away_ppg_on_road: Some(a),
        advantage: ((h - a) / 3.0).clamp(-1.0, 1.0),
        available: true,
    }
}

fn ppg(fixtures: &[FixtureRecord], team_id: u64, at_home: bool) -> Option<f64> {
    let points: Vec<u8> = finished_most_recent_first(fixtures, team_id)
        .into_iter()
        .filter(|m| m.is_home(team_id) == at_home)
        .filter_map(|m| m.result_for(team_id))
        .map(|r| r.points())
        .collect();
    if points.is_empty() {
        return None;
    }
    Some(points.iter().map(|p| *p as f64).sum::<f64>() / points.len() as f64)
}
