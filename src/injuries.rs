use crate::data_client::DataClient;
use crate::features::{FixtureContext, InjuryImpact, TeamInjuries, UnavailablePlayer};
use crate::upstream::{DataKind, InjuryRecord, param};

const IMPACT_PER_SEVERITY: f64 = 0.02;
const MAX_TEAM_IMPACT: f64 = 0.6;

const SEVERE: [&str; 4] = ["acl", "fracture", "surgery", "rupture"];
const MODERATE: [&str; 4] = ["strain", "tear", "hamstring", "ankle"];

pub async fn calculate(client: &DataClient, ctx: &FixtureContext) -> InjuryImpact {
    if !ctx.teams_known() {
        return InjuryImpact::default();
    }
    let fetched = client
        .fetch(DataKind::Injuries, &[param("fixture", ctx.fixture_id)])
        .await;
    // An empty list from the upstream is a real "nobody missing".
    if !fetched.is_real() {
        return InjuryImpact::default();
    }
    compute(fetched.payload.injuries(), ctx.home_team_id, ctx.away_team_id)
}

pub fn compute(records: &[InjuryRecord], home_id: u64, away_id: u64) -> InjuryImpact {
    let home = team_injuries(records, home_id);
    let away = team_injuries(records, away_id);
    InjuryImpact {
        differential: away.impact - home.impact,
        home,
        away,
        available: true,
    }
}

fn team_injuries(records: &[InjuryRecord], team_id: u64) -> TeamInjuries {
    let mut players: Vec<UnavailablePlayer> = Vec::new();
    for r in records.iter().filter(|r| r.team.id == team_id) {
        if players.iter().any(|p| p.name == r.player.name) {
            continue;
        }
        players.push(UnavailablePlayer {
            name: r.player.name.clone(),
            severity: severity(r),
            reason: r.player.reason.clone(),
        });
    }
    let severity_total: u32 = players.iter().map(|p| p.severity as u32).sum();
    TeamInjuries {
        impact: (severity_total as f64 * IMPACT_PER_SEVERITY).min(MAX_TEAM_IMPACT),
        severity_total,
        players,
    }
}

/// 1 (minor) to 4 (long-term). Explicit upstream severity wins over the keyword guess.
pub fn severity(record: &InjuryRecord) -> u8 {
    if let Some(s) = record.severity {
        return s.clamp(1, 4);
    }
    let text = format!(
        "{} {}",
        record.player.reason.as_deref().unwrap_or_default(),
        record.player.kind.as_deref().unwrap_or_default()
    )
    .to_ascii_lowercase();

    let base: u8 = if SEVERE.iter().any(|k| text.contains(k)) {
        4
    } else if MODERATE.iter().any(|k| text.contains(k)) {
        3
    } else {
        2
    };
    if text.contains("doubtful") || text.contains("questionable") {
        (base / 2).max(1)
    } else {
        base
    }
}
