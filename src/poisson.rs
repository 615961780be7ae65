use crate::calibration::Prob3;

const MAX_GOALS: u32 = 10;

pub fn poisson_pmf(goals: u32, lambda: f64) -> f64 {
    let numer = lambda.powi(goals as i32) * (-lambda).exp();
    let denom = (1..=goals).fold(1.0_f64, |acc, k| acc * k as f64).max(1.0);
    numer / denom
}

pub fn clamp_lambda(lambda: f64) -> f64 {
    if lambda.is_finite() {
        lambda.clamp(0.05, 5.0)
    } else {
        0.05
    }
}

/// Home/draw/away shares for independent Poisson goal counts, renormalized over the grid.
pub fn outcome_probs(lambda_home: f64, lambda_away: f64) -> Prob3 {
    let lh = clamp_lambda(lambda_home);
    let la = clamp_lambda(lambda_away);
    let mut p_home = 0.0_f64;
    let mut p_draw = 0.0_f64;
    let mut p_away = 0.0_f64;

    for h in 0..=MAX_GOALS {
        let ph = poisson_pmf(h, lh);
        for a in 0..=MAX_GOALS {
            let p = ph * poisson_pmf(a, la);
            if h > a {
                p_home += p;
            } else if h == a {
                p_draw += p;
            } else {
                p_away += p;
            }
        }
    }

    let sum = (p_home + p_draw + p_away).max(1e-12);
    Prob3 {
        home: p_home / sum,
        draw: p_draw / sum,
        away: p_away / sum,
    }
}

/// P(total goals >= 3). The sum of two Poisson variables is Poisson(λh + λa).
pub fn over_2_5(lambda_home: f64, lambda_away: f64) -> f64 {
    let total = clamp_lambda(lambda_home) + clamp_lambda(lambda_away);
    let under: f64 = (0..=2).map(|k| poisson_pmf(k, total)).sum();
    (1.0 - under).clamp(0.0, 1.0)
}

pub fn both_teams_score(lambda_home: f64, lambda_away: f64) -> f64 {
    let h = 1.0 - (-clamp_lambda(lambda_home)).exp();
    let a = 1.0 - (-clamp_lambda(lambda_away)).exp();
    (h * a).clamp(0.0, 1.0)
}

/// Chance the side facing `lambda_opponent` keeps a clean sheet.
pub fn clean_sheet(lambda_opponent: f64) -> f64 {
    (-clamp_lambda(lambda_opponent)).exp()
}
