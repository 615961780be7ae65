use tracing::debug;

use crate::data_client::DataClient;
use crate::features::{ExpectedGoals, FixtureContext, HOME_ADVANTAGE, LEAGUE_GOALS_PER_TEAM};
use crate::form::{HISTORY_WINDOW, team_history};
use crate::poisson;
use crate::upstream::{FixtureRecord, finished_most_recent_first};

// Samples below these sizes are pulled toward neutral strength / the league baseline.
const TEAM_MIN_N: f64 = 10.0;
const LEAGUE_MIN_N: f64 = 20.0;

#[derive(Debug, Clone, Copy, Default)]
struct Sample {
    n: usize,
    scored: f64,
    conceded: f64,
}

pub async fn calculate(client: &DataClient, ctx: &FixtureContext) -> ExpectedGoals {
    if !ctx.teams_known() {
        return ExpectedGoals::default();
    }
    let (home, away) = tokio::join!(
        team_history(client, ctx.home_team_id),
        team_history(client, ctx.away_team_id)
    );
    compute(
        home.as_deref().unwrap_or_default(),
        away.as_deref().unwrap_or_default(),
        ctx.home_team_id,
        ctx.away_team_id,
    )
}

pub fn compute(
    home_fixtures: &[FixtureRecord],
    away_fixtures: &[FixtureRecord],
    home_id: u64,
    away_id: u64,
) -> ExpectedGoals {
    let h = sample(home_fixtures, home_id);
    let a = sample(away_fixtures, away_id);
    if h.n == 0 && a.n == 0 {
        debug!(home_id, away_id, "no match history, using league-average expected goals");
        return ExpectedGoals::default();
    }

    let total_n = (h.n + a.n) as f64;
    let raw_avg = (h.scored + h.conceded + a.scored + a.conceded) / (2.0 * total_n);
    let w = (total_n / LEAGUE_MIN_N).clamp(0.0, 1.0);
    let league_avg = ((1.0 - w) * LEAGUE_GOALS_PER_TEAM + w * raw_avg).max(0.2);

    let (home_attack, home_defense) = strengths(h, league_avg);
    let (away_attack, away_defense) = strengths(a, league_avg);
    from_strengths(
        home_attack,
        home_defense,
        away_attack,
        away_defense,
        league_avg,
        h.n + a.n,
    )
}

/// Build the slice from attack/defense ratios. `sample_matches == 0` marks the default.
pub fn from_strengths(
    home_attack: f64,
    home_defense: f64,
    away_attack: f64,
    away_defense: f64,
    league_average: f64,
    sample_matches: usize,
) -> ExpectedGoals {
    let home = poisson::clamp_lambda(home_attack * away_defense * league_average * HOME_ADVANTAGE);
    let away = poisson::clamp_lambda(away_attack * home_defense * league_average);
    ExpectedGoals {
        home,
        away,
        differential: home - away,
        home_attack,
        home_defense,
        away_attack,
        away_defense,
        league_average,
        home_clean_sheet: poisson::clean_sheet(away),
        away_clean_sheet: poisson::clean_sheet(home),
        over_2_5: poisson::over_2_5(home, away),
        both_teams_score: poisson::both_teams_score(home, away),
        sample_matches,
        available: sample_matches > 0,
    }
}

fn sample(fixtures: &[FixtureRecord], team_id: u64) -> Sample {
    let mut s = Sample::default();
    for m in finished_most_recent_first(fixtures, team_id)
        .into_iter()
        .take(HISTORY_WINDOW)
    {
        if let Some((f, a)) = m.chances_for_against(team_id) {
            s.n += 1;
            s.scored += f;
            s.conceded += a;
        }
    }
    s
}

fn strengths(s: Sample, league_avg: f64) -> (f64, f64) {
    if s.n == 0 {
        return (1.0, 1.0);
    }
    let n = s.n as f64;
    let w = (n / TEAM_MIN_N).clamp(0.0, 1.0);
    let attack = (s.scored / n) / league_avg;
    let defense = (s.conceded / n) / league_avg;
    (
        (1.0 + w * (attack - 1.0)).clamp(0.3, 3.0),
        (1.0 + w * (defense - 1.0)).clamp(0.3, 3.0),
    )
}
