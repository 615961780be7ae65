//! Percentages in exact tenths.
//!
//! A three-way split is built so its tenths add up to exactly 1000, which is
//! what lets the record promise `home + draw + away == 100.0` with no tolerance.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::calibration::{Outcome, Prob3};

const TOTAL_TENTHS: i32 = 1000;

/// A percentage with one decimal, stored as tenths (0..=1000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Percent(u16);

impl Percent {
    pub const ZERO: Percent = Percent(0);
    pub const HUNDRED: Percent = Percent(TOTAL_TENTHS as u16);

    pub const fn from_tenths(tenths: u16) -> Self {
        if tenths > TOTAL_TENTHS as u16 {
            Percent(TOTAL_TENTHS as u16)
        } else {
            Percent(tenths)
        }
    }

    /// Clamped into [0, 100] and rounded to one decimal. Non-finite input is 0.
    pub fn from_percent(value: f64) -> Self {
        if !value.is_finite() {
            return Percent::ZERO;
        }
        let tenths = (value.clamp(0.0, 100.0) * 10.0).round();
        Percent(tenths as u16)
    }

    pub fn from_probability(p: f64) -> Self {
        Self::from_percent(p * 100.0)
    }

    pub fn tenths(self) -> u16 {
        self.0
    }

    pub fn value(self) -> f64 {
        self.0 as f64 / 10.0
    }

    pub fn fraction(self) -> f64 {
        self.0 as f64 / TOTAL_TENTHS as f64
    }

    pub fn complement(self) -> Self {
        Percent(TOTAL_TENTHS as u16 - self.0)
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

impl Serialize for Percent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value())
    }
}

impl<'de> Deserialize<'de> for Percent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Ok(Percent::from_percent(raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probabilities {
    pub home: Percent,
    pub draw: Percent,
    pub away: Percent,
}

impl Probabilities {
    pub fn even() -> Self {
        Self {
            home: Percent(334),
            draw: Percent(333),
            away: Percent(333),
        }
    }

    pub fn total_tenths(&self) -> u32 {
        self.home.0 as u32 + self.draw.0 as u32 + self.away.0 as u32
    }

    pub fn get(&self, outcome: Outcome) -> Percent {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    /// Most likely outcome. Ties go home, then draw.
    pub fn leader(&self) -> Outcome {
        if self.home >= self.draw && self.home >= self.away {
            Outcome::Home
        } else if self.draw >= self.away {
            Outcome::Draw
        } else {
            Outcome::Away
        }
    }

    pub fn to_prob3(self) -> Prob3 {
        Prob3 {
            home: self.home.fraction(),
            draw: self.draw.fraction(),
            away: self.away.fraction(),
        }
    }
}

/// Scale three raw scores of any magnitude to tenths summing to exactly 1000.
///
/// Negative and non-finite values count as 0; an all-zero input is the even
/// 33.4/33.3/33.3 split. After rounding, the leftover tenths go to the largest
/// raw component (first of home, draw, away on ties).
pub fn normalize_three(home: f64, draw: f64, away: f64) -> Probabilities {
    let raw = [clean(home), clean(draw), clean(away)];
    let sum: f64 = raw.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return Probabilities::even();
    }

    let mut tenths = raw.map(|v| (v / sum * TOTAL_TENTHS as f64).round() as i32);
    let diff = TOTAL_TENTHS - tenths.iter().sum::<i32>();
    let mut largest = 0;
    for i in 1..3 {
        if raw[i] > raw[largest] {
            largest = i;
        }
    }
    tenths[largest] += diff;

    let [h, d, a] = tenths.map(|t| Percent(t.clamp(0, TOTAL_TENTHS) as u16));
    Probabilities {
        home: h,
        draw: d,
        away: a,
    }
}

pub fn normalize_prob3(p: Prob3) -> Probabilities {
    normalize_three(p.home, p.draw, p.away)
}

/// Yes/no market: yes rounded to one decimal, no takes the remainder.
pub fn normalize_pair(yes_probability: f64) -> (Percent, Percent) {
    let yes = Percent::from_probability(yes_probability);
    (yes, yes.complement())
}

fn clean(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_input_is_even_split() {
        let p = normalize_three(0.0, 0.0, 0.0);
        assert_eq!(p, Probabilities::even());
        assert_eq!(p.total_tenths(), 1000);
        assert_eq!(normalize_three(-1.0, f64::NAN, 0.0), Probabilities::even());
    }

    #[test]
    fn rounding_surplus_lands_on_largest() {
        // 1/3 each rounds to 333 three times; the missing tenth goes home.
        let p = normalize_three(1.0, 1.0, 1.0);
        assert_eq!(p.home.tenths(), 334);
        assert_eq!(p.draw.tenths(), 333);
        assert_eq!(p.total_tenths(), 1000);

        let p = normalize_three(1.0, 2.0, 1.0);
        assert_eq!(p.draw.tenths(), 500);
        assert_eq!(p.total_tenths(), 1000);
    }

    #[test]
    fn negative_component_is_clamped() {
        let p = normalize_three(0.6, -0.2, 0.4);
        assert_eq!(p.draw, Percent::ZERO);
        assert_eq!(p.home.tenths(), 600);
        assert_eq!(p.away.tenths(), 400);
    }

    #[test]
    fn percent_display_and_serde() {
        let p = Percent::from_percent(48.46);
        assert_eq!(p.to_string(), "48.5");
        assert_eq!(serde_json::to_string(&p).unwrap(), "48.5");
        let back: Percent = serde_json::from_str("48.5").unwrap();
        assert_eq!(back, p);
        assert_eq!(Percent::from_percent(140.0), Percent::HUNDRED);
    }

    #[test]
    fn pair_is_complementary() {
        let (yes, no) = normalize_pair(0.5837);
        assert_eq!(yes.tenths(), 584);
        assert_eq!(no.tenths(), 416);
    }
}
