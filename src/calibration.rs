use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Home => "home win",
            Outcome::Draw => "draw",
            Outcome::Away => "away win",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

impl Metrics {
    fn empty() -> Self {
        Self {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        }
    }
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    /// Scale to sum 1. Negative or non-finite entries count as zero.
    pub fn normalized(self) -> Self {
        let h = finite_non_negative(self.home);
        let d = finite_non_negative(self.draw);
        let a = finite_non_negative(self.away);
        let sum = h + d + a;
        if sum <= 0.0 {
            return Self::uniform();
        }
        Self {
            home: h / sum,
            draw: d / sum,
            away: a / sum,
        }
    }
}

fn finite_non_negative(v: f64) -> f64 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

pub fn classify_outcome(home_goals: i32, away_goals: i32) -> Outcome {
    if home_goals > away_goals {
        Outcome::Home
    } else if home_goals < away_goals {
        Outcome::Away
    } else {
        Outcome::Draw
    }
}

pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> Metrics {
    if predictions.is_empty() || outcomes.is_empty() || predictions.len() != outcomes.len() {
        return Metrics::empty();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        brier_sum += Outcome::ALL
            .iter()
            .map(|o| {
                let hit = if o == outcome { 1.0 } else { 0.0 };
                (p.get(*o) - hit).powi(2)
            })
            .sum::<f64>();
        log_loss_sum -= p.get(*outcome).clamp(1e-12, 1.0).ln();
        if argmax(*p) == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

/// Softmax of `ln(p) / temperature`. Values above 1 flatten, below 1 sharpen.
pub fn apply_temperature(prob: Prob3, temperature: f64) -> Prob3 {
    let t = if temperature.is_finite() {
        temperature.clamp(0.25, 4.0)
    } else {
        1.0
    };
    let p = prob.normalized();
    let lh = p.home.clamp(1e-9, 1.0).ln() / t;
    let ld = p.draw.clamp(1e-9, 1.0).ln() / t;
    let la = p.away.clamp(1e-9, 1.0).ln() / t;

    let mx = lh.max(ld.max(la));
    let eh = (lh - mx).exp();
    let ed = (ld - mx).exp();
    let ea = (la - mx).exp();
    let den = (eh + ed + ea).max(1e-12);

    Prob3 {
        home: (eh / den).clamp(0.0, 1.0),
        draw: (ed / den).clamp(0.0, 1.0),
        away: (ea / den).clamp(0.0, 1.0),
    }
}

/// Grid search over 0.5..=2.5 in steps of 0.2, keeping the lowest log loss.
pub fn fit_temperature(predictions: &[Prob3], outcomes: &[Outcome]) -> (f64, Metrics) {
    if predictions.is_empty() || outcomes.is_empty() || predictions.len() != outcomes.len() {
        return (1.0, Metrics::empty());
    }

    let mut best_t = 1.0;
    let mut best_metrics = evaluate_probs(predictions, outcomes);

    for step in 0..=10 {
        let t = 0.5 + step as f64 * 0.2;
        let scaled: Vec<Prob3> = predictions
            .iter()
            .map(|p| apply_temperature(*p, t))
            .collect();
        let metrics = evaluate_probs(&scaled, outcomes);
        if metrics.log_loss < best_metrics.log_loss {
            best_metrics = metrics;
            best_t = t;
        }
    }

    (best_t, best_metrics)
}

/// Most likely outcome; ties go to the earlier of home, draw, away.
pub fn argmax(p: Prob3) -> Outcome {
    Outcome::ALL
        .into_iter()
        .fold(Outcome::Home, |best, o| if p.get(o) > p.get(best) { o } else { best })
}

#[cfg(test)]
mod tests {
    use super::{Outcome, Prob3, apply_temperature, evaluate_probs, fit_temperature};

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let preds = vec![
            Prob3 {
                home: 1.0,
                draw: 0.0,
                away: 0.0,
            },
            Prob3 {
                home: 0.0,
                draw: 1.0,
                away: 0.0,
            },
            Prob3 {
                home: 0.0,
                draw: 0.0,
                away: 1.0,
            },
        ];
        let outcomes = vec![Outcome::Home, Outcome::Draw, Outcome::Away];
        let m = evaluate_probs(&preds, &outcomes);
        assert_eq!(m.samples, 3);
        assert!(m.brier < 1e-12);
    }

    #[test]
    fn temperature_keeps_distribution_normalized() {
        let p = Prob3 {
            home: 0.55,
            draw: 0.25,
            away: 0.20,
        };
        let hot = apply_temperature(p, 2.0);
        let sum = hot.home + hot.draw + hot.away;
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(hot.home < p.home);

        let same = apply_temperature(p, 1.0);
        assert!((same.home - p.home).abs() < 1e-9);
    }

    #[test]
    fn overconfident_predictions_fit_a_hotter_temperature() {
        let p = Prob3 {
            home: 0.9,
            draw: 0.05,
            away: 0.05,
        };
        let preds = vec![p; 10];
        let mut outcomes = vec![Outcome::Home; 5];
        outcomes.extend([Outcome::Draw, Outcome::Away, Outcome::Draw, Outcome::Away, Outcome::Draw]);
        let (t, metrics) = fit_temperature(&preds, &outcomes);
        assert!(t > 1.0);
        assert_eq!(metrics.samples, 10);
    }
}
