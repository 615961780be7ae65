use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use sabiscore::config::EngineConfig;
use sabiscore::factors::top_factors;
use sabiscore::features::{FixtureContext, InjuryImpact, MatchFeatureBundle};
use sabiscore::normalize::normalize_three;
use sabiscore::prediction::predict_from_features;
use sabiscore::upstream::{DataKind, Payload, classify_response};

const TEAM_FIXTURES_JSON: &str = include_str!("../tests/fixtures/team_fixtures_40.json");
const ODDS_JSON: &str = include_str!("../tests/fixtures/odds.json");

fn sample_bundle() -> MatchFeatureBundle {
    let mut ctx = FixtureContext::unknown(1001);
    ctx.home_team_id = 40;
    ctx.home_team = "Lions FC".to_string();
    ctx.away_team_id = 50;
    ctx.away_team = "Tigers United".to_string();
    let mut bundle = MatchFeatureBundle::neutral(ctx);
    bundle.form.available = true;
    bundle.form.home.weighted_ppg = 2.4;
    bundle.form.away.weighted_ppg = 1.0;
    bundle.head_to_head.available = true;
    bundle.head_to_head.advantage = 0.33;
    bundle.injuries = InjuryImpact {
        differential: 0.18,
        available: true,
        ..InjuryImpact::default()
    };
    bundle
}

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize_three", |b| {
        b.iter(|| {
            let p = normalize_three(black_box(0.50), black_box(0.35), black_box(0.30));
            black_box(p.total_tenths());
        })
    });
}

fn bench_rule_based_prediction(c: &mut Criterion) {
    let bundle = sample_bundle();
    let config = EngineConfig::default();
    c.bench_function("predict_rule_based", |b| {
        b.iter(|| {
            let record = predict_from_features(black_box(&bundle), None, &config);
            black_box(record.probabilities.home);
        })
    });
    c.bench_function("top_factors", |b| {
        b.iter(|| black_box(top_factors(black_box(&bundle)).len()))
    });
}

fn bench_decode(c: &mut Criterion) {
    c.bench_function("decode_team_fixtures", |b| {
        b.iter(|| {
            let rows = classify_response(200, black_box(TEAM_FIXTURES_JSON)).unwrap();
            let payload = Payload::decode(DataKind::TeamFixtures, &rows);
            black_box(payload.fixtures().len());
        })
    });
    c.bench_function("decode_odds", |b| {
        b.iter(|| {
            let rows = classify_response(200, black_box(ODDS_JSON)).unwrap();
            let payload = Payload::decode(DataKind::Odds, &rows);
            black_box(payload.odds().len());
        })
    });
}

criterion_group!(benches, bench_normalize, bench_rule_based_prediction, bench_decode);
criterion_main!(benches);
