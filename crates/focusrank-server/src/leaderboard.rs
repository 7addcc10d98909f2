//! Leaderboard hub: per-squad snapshot cache and publication.
//!
//! Every recompute re-ranks the whole squad from the stored daily aggregates
//! and replaces the cached snapshot. Two recomputes racing on the same squad
//! are not ordered against each other; whichever finishes last is the one
//! that stays cached.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{Duration, NaiveDate};
use tokio::sync::broadcast;
use tracing::debug;

use focusrank_shared::constants::{STREAK_LOOKBACK, WEEK_DAYS};
use focusrank_shared::leaderboard::{rank, LeaderboardSnapshot, MemberScore};
use focusrank_shared::protocol::{ScorePeriod, ScoreResponse};
use focusrank_shared::score::{score_day, score_period, streak_bonus, EfficiencyScore};
use focusrank_shared::streak::streak;
use focusrank_shared::types::{SquadId, UserId};
use focusrank_store::Database;

use crate::db::{with_db, SharedDb};
use crate::error::ServerError;
use crate::realtime::Fanout;

const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;

pub type SharedSnapshot = Arc<LeaderboardSnapshot>;

pub struct LeaderboardHub {
    db: SharedDb,
    snapshots: RwLock<HashMap<SquadId, SharedSnapshot>>,
    fanout: Fanout<SquadId, SharedSnapshot>,
    streak_bonus_per_day: f64,
}

impl LeaderboardHub {
    pub fn new(db: SharedDb, streak_bonus_per_day: f64) -> Self {
        Self {
            db,
            snapshots: RwLock::new(HashMap::new()),
            fanout: Fanout::new(SNAPSHOT_CHANNEL_CAPACITY),
            streak_bonus_per_day,
        }
    }

    /// The last snapshot computed for `squad_id`, if any.
    pub fn current(&self, squad_id: SquadId) -> Option<SharedSnapshot> {
        self.snapshots
            .read()
            .ok()
            .and_then(|snapshots| snapshots.get(&squad_id).cloned())
    }

    /// Re-rank the squad, cache the result and publish it to subscribers.
    pub fn recompute(&self, squad_id: SquadId) -> Result<SharedSnapshot, ServerError> {
        let per_day = self.streak_bonus_per_day;
        let members = with_db(&self.db, |db| {
            db.squad_members(squad_id)?
                .into_iter()
                .map(|m| {
                    let score = member_score(db, &m.user_id, per_day)?;
                    Ok(MemberScore {
                        user_id: m.user_id,
                        score,
                    })
                })
                .collect::<focusrank_store::Result<Vec<_>>>()
        })?;

        let previous = self.current(squad_id);
        let snapshot = Arc::new(rank(squad_id, members, previous.as_deref()));

        let mut snapshots = self
            .snapshots
            .write()
            .map_err(|_| ServerError::Internal("snapshot cache poisoned".into()))?;
        // Memberless squads (unknown ids, or everyone left) are not kept.
        if snapshot.entries.is_empty() {
            snapshots.remove(&squad_id);
        } else {
            snapshots.insert(squad_id, snapshot.clone());
        }
        drop(snapshots);

        let delivered = self.fanout.publish(&squad_id, snapshot.clone());
        debug!(
            squad = %squad_id,
            members = snapshot.entries.len(),
            delivered,
            "Leaderboard recomputed"
        );

        Ok(snapshot)
    }

    /// Cached snapshot, computing one first if the squad was never ranked.
    pub fn query(&self, squad_id: SquadId) -> Result<SharedSnapshot, ServerError> {
        match self.current(squad_id) {
            Some(snapshot) => Ok(snapshot),
            None => self.recompute(squad_id),
        }
    }

    pub fn subscribe(&self, squad_id: SquadId) -> broadcast::Receiver<SharedSnapshot> {
        self.fanout.subscribe(&squad_id)
    }

    /// Recompute every squad `user_id` belongs to. Returns the squad count.
    pub fn recompute_for_user(&self, user_id: &UserId) -> Result<usize, ServerError> {
        let squads = with_db(&self.db, |db| db.squads_for_user(user_id))?;
        for squad_id in &squads {
            self.recompute(*squad_id)?;
        }
        Ok(squads.len())
    }

    pub fn prune_idle_channels(&self) -> usize {
        self.fanout.prune()
    }
}

/// A member's leaderboard score: their latest day plus streak bonus, or zero
/// with no data.
pub fn member_score(db: &Database, user_id: &UserId, bonus_per_day: f64) -> focusrank_store::Result<u8> {
    let history = db.recent_daily_aggregates(user_id, STREAK_LOOKBACK as u32)?;
    let Some(latest) = history.first() else {
        return Ok(0);
    };
    let bonus = streak_bonus(streak(&history).current_streak, bonus_per_day);
    Ok(score_day(latest, bonus).score)
}

/// Score report for one user over `period`, ending on `today`.
pub fn user_score(
    db: &Database,
    user_id: &UserId,
    period: ScorePeriod,
    bonus_per_day: f64,
    today: NaiveDate,
) -> focusrank_store::Result<ScoreResponse> {
    let history = db.recent_daily_aggregates(user_id, STREAK_LOOKBACK as u32)?;
    let streak = streak(&history);
    let bonus = streak_bonus(streak.current_streak, bonus_per_day);

    let (efficiency, days) = match period {
        ScorePeriod::Day => match history.first() {
            Some(latest) => (score_day(latest, bonus), 1),
            None => (EfficiencyScore::ZERO, 0),
        },
        ScorePeriod::Week => {
            let from = today - Duration::days(WEEK_DAYS as i64 - 1);
            let week = db.daily_aggregates_between(user_id, from, today)?;
            if week.is_empty() {
                (EfficiencyScore::ZERO, 0)
            } else {
                (score_period(&week, bonus), week.len())
            }
        }
    };

    Ok(ScoreResponse {
        user_id: user_id.clone(),
        period,
        score: efficiency.score,
        tier: efficiency.tier,
        streak,
        streak_bonus: bonus,
        days,
    })
}
