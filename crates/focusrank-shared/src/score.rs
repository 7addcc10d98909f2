//! Efficiency scoring.
//!
//! A usage period is reduced to a single 0–100 number: the productive share of
//! the period minus the unproductive share, plus an optional streak bonus,
//! clamped at both ends. Neutral (utility) minutes dilute both shares without
//! counting either way.
//!
//! Scores are never stored; callers recompute them from the daily aggregates
//! on every read.

use serde::{Deserialize, Serialize};

use crate::constants::{DIAMOND_THRESHOLD, GOLD_THRESHOLD, MAX_STREAK_BONUS, SILVER_THRESHOLD};
use crate::types::DailyAggregate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl Tier {
    pub fn from_score(score: u8) -> Self {
        if score >= DIAMOND_THRESHOLD {
            Tier::Diamond
        } else if score >= GOLD_THRESHOLD {
            Tier::Gold
        } else if score >= SILVER_THRESHOLD {
            Tier::Silver
        } else {
            Tier::Bronze
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EfficiencyScore {
    pub score: u8,
    pub tier: Tier,
}

impl EfficiencyScore {
    pub const ZERO: EfficiencyScore = EfficiencyScore {
        score: 0,
        tier: Tier::Bronze,
    };
}

/// Score a three-bucket usage total.
pub fn score(productive: u32, unproductive: u32, neutral: u32, streak_bonus: f64) -> EfficiencyScore {
    let total = f64::from(productive) + f64::from(unproductive) + f64::from(neutral);
    if total == 0.0 {
        return EfficiencyScore::ZERO;
    }

    let raw = f64::from(productive) / total * 100.0 - f64::from(unproductive) / total * 100.0
        + streak_bonus;

    // NaN only if the bonus itself is NaN; treat that as no bonus at all.
    let raw = if raw.is_nan() { 0.0 } else { raw };
    let score = raw.clamp(0.0, 100.0).round() as u8;

    EfficiencyScore {
        score,
        tier: Tier::from_score(score),
    }
}

/// Score a single day.
pub fn score_day(day: &DailyAggregate, streak_bonus: f64) -> EfficiencyScore {
    score(
        day.productive_mins,
        day.unproductive_mins,
        day.neutral_mins,
        streak_bonus,
    )
}

/// Score several days as one period (e.g. a week) by summing their buckets.
pub fn score_period(days: &[DailyAggregate], streak_bonus: f64) -> EfficiencyScore {
    let (productive, unproductive, neutral) = days.iter().fold((0u32, 0u32, 0u32), |acc, d| {
        (
            acc.0.saturating_add(d.productive_mins),
            acc.1.saturating_add(d.unproductive_mins),
            acc.2.saturating_add(d.neutral_mins),
        )
    });
    score(productive, unproductive, neutral, streak_bonus)
}

/// Bonus points earned by a streak, capped at [`MAX_STREAK_BONUS`].
pub fn streak_bonus(current_streak: u32, per_day: f64) -> f64 {
    if per_day <= 0.0 {
        return 0.0;
    }
    (f64::from(current_streak) * per_day).min(MAX_STREAK_BONUS)
}
