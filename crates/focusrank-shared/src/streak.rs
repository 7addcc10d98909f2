//! Improvement streaks over a window of daily aggregates.

use serde::{Deserialize, Serialize};

use crate::constants::STREAK_LOOKBACK;
use crate::types::DailyAggregate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub current_streak: u32,
    pub best_streak: u32,
}

/// Compute current and best streaks.
///
/// `history` must be ordered most recent first. Only the first
/// [`STREAK_LOOKBACK`] rows are considered. A pair of adjacent rows passes
/// when `unproductive[i] <= unproductive[i - 1]`; `current` counts passes from
/// the most recent pair until the first failure, `best` is the longest run of
/// passes anywhere in the window.
pub fn streak(history: &[DailyAggregate]) -> StreakState {
    let minutes: Vec<u32> = history
        .iter()
        .take(STREAK_LOOKBACK)
        .map(|d| d.unproductive_mins)
        .collect();
    streak_from_minutes(&minutes)
}

/// Same as [`streak`], over bare unproductive-minute values.
pub fn streak_from_minutes(unproductive: &[u32]) -> StreakState {
    let window = &unproductive[..unproductive.len().min(STREAK_LOOKBACK)];
    if window.len() < 2 {
        return StreakState::default();
    }

    let mut current = 0u32;
    let mut current_open = true;
    let mut run = 0u32;
    let mut best = 0u32;

    for pair in window.windows(2) {
        let holds = pair[1] <= pair[0];

        if current_open {
            if holds {
                current += 1;
            } else {
                current_open = false;
            }
        }

        if holds {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }

    StreakState {
        current_streak: current,
        best_streak: best,
    }
}
