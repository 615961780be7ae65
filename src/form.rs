use tracing::debug;

use crate::data_client::DataClient;
use crate::features::{FixtureContext, FormPair, TeamForm, Trend};
use crate::upstream::{DataKind, FixtureRecord, finished_most_recent_first, param};

pub const FORM_WINDOW: usize = 5;
pub const HISTORY_WINDOW: usize = 10;
const RECENCY_WEIGHTS: [f64; FORM_WINDOW] = [5.0, 4.0, 3.0, 2.0, 1.0];
const TREND_MARGIN: f64 = 0.25;

/// Last finished matches of one team. `None` when only synthetic data was available.
pub async fn team_history(client: &DataClient, team_id: u64) -> Option<Vec<FixtureRecord>> {
    let params = [param("team", team_id), param("last", HISTORY_WINDOW)];
    let fetched = client.fetch(DataKind::TeamFixtures, &params).await;
    if !fetched.is_real() {
        return None;
    }
    Some(fetched.payload.fixtures().to_vec())
}

pub async fn calculate(client: &DataClient, ctx: &FixtureContext) -> FormPair {
    if !ctx.teams_known() {
        return FormPair::default();
    }
    let (home, away) = tokio::join!(
        team_history(client, ctx.home_team_id),
        team_history(client, ctx.away_team_id)
    );
    let home = home.as_deref().and_then(|f| team_form(f, ctx.home_team_id));
    let away = away.as_deref().and_then(|f| team_form(f, ctx.away_team_id));
    pair(home, away)
}

pub fn pair(home: Option<TeamForm>, away: Option<TeamForm>) -> FormPair {
    let available = home.is_some() || away.is_some();
    if !available {
        debug!("no finished matches for either side, using neutral form");
    }
    FormPair {
        home: home.unwrap_or_default(),
        away: away.unwrap_or_default(),
        available,
    }
}

/// Recency-weighted form over the last five finished matches.
pub fn team_form(fixtures: &[FixtureRecord], team_id: u64) -> Option<TeamForm> {
    let recent: Vec<&FixtureRecord> = finished_most_recent_first(fixtures, team_id)
        .into_iter()
        .take(FORM_WINDOW)
        .collect();
    if recent.is_empty() {
        return None;
    }

    let mut weighted = 0.0_f64;
    let mut weight_sum = 0.0_f64;
    let mut points = 0u32;
    let mut goals_for = 0.0_f64;
    let mut goals_against = 0.0_f64;
    let mut letters = Vec::with_capacity(recent.len());

    for (m, w) in recent.iter().zip(RECENCY_WEIGHTS) {
        let Some(result) = m.result_for(team_id) else {
            continue;
        };
        let pts = result.points() as f64;
        weighted += w * pts;
        weight_sum += w;
        points += result.points() as u32;
        if let Some((f, a)) = m.goals_for_against(team_id) {
            goals_for += f;
            goals_against += a;
        }
        letters.push(result.letter());
    }

    let n = letters.len();
    if n == 0 {
        return None;
    }
    let weighted_ppg = weighted / weight_sum;
    let flat_ppg = points as f64 / n as f64;
    let trend = if weighted_ppg - flat_ppg > TREND_MARGIN {
        Trend::Improving
    } else if flat_ppg - weighted_ppg > TREND_MARGIN {
        Trend::Declining
    } else {
        Trend::Stable
    };

    Some(TeamForm {
        form_string: letters.iter().rev().collect(),
        matches: n,
        points,
        weighted_ppg,
        flat_ppg,
        trend,
        goals_for: goals_for / n as f64,
        goals_against: goals_against / n as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finished(id: u64, date: &str, home: u64, away: u64, hg: u8, ag: u8) -> FixtureRecord {
        serde_json::from_value(json!({
            "fixture": {"id": id, "date": date, "status": {"short": "FT"}},
            "teams": {"home": {"id": home, "name": "H"}, "away": {"id": away, "name": "A"}},
            "goals": {"home": hg, "away": ag}
        }))
        .unwrap()
    }

    #[test]
    fn recent_wins_read_as_improving() {
        // Oldest to newest: L L D W W for team 1.
        let fixtures = vec![
            finished(1, "2024-01-01", 1, 2, 0, 1),
            finished(2, "2024-01-08", 3, 1, 2, 0),
            finished(3, "2024-01-15", 1, 4, 1, 1),
            finished(4, "2024-01-22", 5, 1, 0, 3),
            finished(5, "2024-01-29", 1, 6, 2, 1),
        ];
        let form = team_form(&fixtures, 1).unwrap();
        assert_eq!(form.form_string, "LLDWW");
        assert_eq!(form.points, 7);
        // (5*3 + 4*3 + 3*1) / 15 = 2.0 vs flat 1.4
        assert!((form.weighted_ppg - 2.0).abs() < 1e-9);
        assert_eq!(form.trend, Trend::Improving);
    }

    #[test]
    fn only_last_five_count() {
        let mut fixtures = Vec::new();
        for i in 0..8u64 {
            let day = format!("2024-02-{:02}", i + 1);
            let (hg, ag) = if i < 3 { (0, 2) } else { (1, 1) };
            fixtures.push(finished(i + 1, &day, 1, 9, hg, ag));
        }
        let form = team_form(&fixtures, 1).unwrap();
        assert_eq!(form.matches, 5);
        assert_eq!(form.form_string, "DDDDD");
        assert_eq!(form.trend, Trend::Stable);
    }

    #[test]
    fn no_history_is_neutral() {
        assert!(team_form(&[], 1).is_none());
        let p = pair(None, None);
        assert!(!p.available);
        assert_eq!(p.home, TeamForm::default());
    }
}
