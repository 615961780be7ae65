use tracing::debug;

use crate::data_client::DataClient;
use crate::features::{FixtureContext, HeadToHead};
use crate::upstream::{DataKind, FixtureRecord, MatchResult, finished_most_recent_first, param};

const MEETINGS_WINDOW: usize = 10;

pub async fn calculate(client: &DataClient, ctx: &FixtureContext) -> HeadToHead {
    if !ctx.teams_known() {
        return HeadToHead::default();
    }
    let params = [
        param("h2h", format!("{}-{}", ctx.home_team_id, ctx.away_team_id)),
        param("last", MEETINGS_WINDOW),
    ];
    let fetched = client.fetch(DataKind::HeadToHead, &params).await;
    if !fetched.is_real() {
        return HeadToHead::default();
    }
    compute(fetched.payload.fixtures(), ctx.home_team_id, ctx.away_team_id)
}

/// Meetings are credited to the current home side regardless of where they were played.
pub fn compute(fixtures: &[FixtureRecord], home_id: u64, away_id: u64) -> HeadToHead {
    let meetings: Vec<&FixtureRecord> = finished_most_recent_first(fixtures, home_id)
        .into_iter()
        .filter(|m| m.involves(away_id))
        .take(MEETINGS_WINDOW)
        .collect();
    if meetings.is_empty() {
        debug!(home_id, away_id, "no previous meetings");
        return HeadToHead::default();
    }

    let mut out = HeadToHead {
        meetings: meetings.len(),
        available: true,
        ..HeadToHead::default()
    };
    let mut goals = 0.0;
    for m in &meetings {
        match m.result_for(home_id) {
            Some(MatchResult::Win) => out.home_wins += 1,
            Some(MatchResult::Draw) => out.draws += 1,
            Some(MatchResult::Loss) => out.away_wins += 1,
            None => {}
        }
        if let Some((f, a)) = m.goals_for_against(home_id) {
            goals += f + a;
        }
    }
    let n = out.meetings as f64;
    out.advantage = (out.home_wins as f64 - out.away_wins as f64) / n;
    out.avg_goals = goals / n;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meeting(id: u64, home: u64, away: u64, hg: u8, ag: u8) -> FixtureRecord {
        serde_json::from_value(json!({
            "fixture": {"id": id, "date": format!("2023-0{id}-01"), "status": {"short": "FT"}},
            "teams": {"home": {"id": home}, "away": {"id": away}},
            "goals": {"home": hg, "away": ag}
        }))
        .unwrap()
    }

    #[test]
    fn wins_follow_the_team_not_the_venue() {
        let fixtures = vec![
            meeting(1, 10, 20, 2, 0),
            // team 10 wins away from home
            meeting(2, 20, 10, 0, 1),
            meeting(3, 20, 10, 3, 1),
            meeting(4, 10, 20, 1, 1),
        ];
        let h2h = compute(&fixtures, 10, 20);
        assert_eq!(h2h.meetings, 4);
        assert_eq!(h2h.home_wins, 2);
        assert_eq!(h2h.away_wins, 1);
        assert_eq!(h2h.draws, 1);
        assert!((h2h.advantage - 0.25).abs() < 1e-9);
        assert!((h2h.avg_goals - 2.25).abs() < 1e-9);
    }

    #[test]
    fn other_opponents_are_ignored() {
        let fixtures = vec![meeting(1, 10, 30, 2, 0)];
        let h2h = compute(&fixtures, 10, 20);
        assert!(!h2h.available);
        assert_eq!(h2h.advantage, 0.0);
    }
}
