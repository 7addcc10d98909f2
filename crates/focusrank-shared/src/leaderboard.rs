//! Cohort leaderboard ranking.
//!
//! Ranking is whole-cohort: every recompute sorts all members again and
//! produces a fresh snapshot that replaces the previous one. This is fine at
//! squad scale and is not meant for large global boards.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::score::Tier;
use crate::types::{SquadId, UserId};

/// One member's current score, as fed into [`rank`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberScore {
    pub user_id: UserId,
    pub score: u8,
}

impl MemberScore {
    pub fn new(user_id: impl Into<UserId>, score: u8) -> Self {
        Self {
            user_id: user_id.into(),
            score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub user_id: UserId,
    pub score: u8,
    pub tier: Tier,
    /// 1-based position.
    pub rank: u32,
    /// `previous_rank - rank`; positive means the member moved up.
    pub rank_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardSnapshot {
    pub cohort_id: SquadId,
    pub entries: Vec<RankedEntry>,
    pub computed_at: DateTime<Utc>,
}

impl LeaderboardSnapshot {
    pub fn empty(cohort_id: SquadId) -> Self {
        Self {
            cohort_id,
            entries: Vec::new(),
            computed_at: Utc::now(),
        }
    }

    pub fn rank_of(&self, user_id: &UserId) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| &e.user_id == user_id)
            .map(|e| e.rank)
    }
}

/// Rank a cohort.
///
/// Members are ordered by score descending, ties broken by user id ascending,
/// so unchanged inputs always give the same order regardless of input order.
pub fn rank(
    cohort_id: SquadId,
    mut members: Vec<MemberScore>,
    previous: Option<&LeaderboardSnapshot>,
) -> LeaderboardSnapshot {
    members.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    let previous_ranks: HashMap<&UserId, u32> = previous
        .map(|snap| snap.entries.iter().map(|e| (&e.user_id, e.rank)).collect())
        .unwrap_or_default();

    let entries = members
        .into_iter()
        .enumerate()
        .map(|(i, m)| {
            let rank = i as u32 + 1;
            let rank_delta = previous_ranks
                .get(&m.user_id)
                .map(|&prev| i64::from(prev) - i64::from(rank))
                .unwrap_or(0);
            RankedEntry {
                tier: Tier::from_score(m.score),
                user_id: m.user_id,
                score: m.score,
                rank,
                rank_delta,
            }
        })
        .collect();

    LeaderboardSnapshot {
        cohort_id,
        entries,
        computed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(snap: &LeaderboardSnapshot) -> Vec<&str> {
        snap.entries.iter().map(|e| e.user_id.as_str()).collect()
    }

    #[test]
    fn test_ties_broken_by_user_id() {
        let cohort = SquadId::new();
        let inputs = [
            vec![
                MemberScore::new("A", 80),
                MemberScore::new("B", 80),
                MemberScore::new("C", 60),
            ],
            vec![
                MemberScore::new("C", 60),
                MemberScore::new("B", 80),
                MemberScore::new("A", 80),
            ],
            vec![
                MemberScore::new("B", 80),
                MemberScore::new("C", 60),
                MemberScore::new("A", 80),
            ],
        ];

        for members in inputs {
            let snap = rank(cohort, members, None);
            assert_eq!(order(&snap), vec!["A", "B", "C"]);
            let ranks: Vec<u32> = snap.entries.iter().map(|e| e.rank).collect();
            assert_eq!(ranks, vec![1, 2, 3]);
        }
    }

    #[test]
    fn test_new_members_have_zero_delta() {
        let cohort = SquadId::new();
        let snap = rank(cohort, vec![MemberScore::new("A", 10)], None);
        assert_eq!(snap.entries[0].rank_delta, 0);

        let next = rank(
            cohort,
            vec![MemberScore::new("A", 10), MemberScore::new("Z", 99)],
            Some(&snap),
        );
        let z = &next.entries[0];
        assert_eq!(z.user_id.as_str(), "Z");
        assert_eq!(z.rank_delta, 0);
        // A dropped from 1 to 2
        assert_eq!(next.entries[1].rank_delta, -1);
    }

    #[test]
    fn test_rank_delta_positive_when_improved() {
        let cohort = SquadId::new();
        let first = rank(
            cohort,
            vec![
                MemberScore::new("A", 90),
                MemberScore::new("B", 70),
                MemberScore::new("C", 50),
            ],
            None,
        );
        let second = rank(
            cohort,
            vec![
                MemberScore::new("A", 60),
                MemberScore::new("B", 70),
                MemberScore::new("C", 95),
            ],
            Some(&first),
        );

        assert_eq!(order(&second), vec!["C", "B", "A"]);
        assert_eq!(second.rank_of(&UserId::from("C")), Some(1));
        assert_eq!(second.entries[0].rank_delta, 2);
        assert_eq!(second.entries[1].rank_delta, 0);
        assert_eq!(second.entries[2].rank_delta, -2);
    }

    #[test]
    fn test_recompute_is_stable() {
        let cohort = SquadId::new();
        let members = vec![
            MemberScore::new("x", 50),
            MemberScore::new("y", 50),
            MemberScore::new("w", 50),
        ];
        let a = rank(cohort, members.clone(), None);
        let b = rank(cohort, members, Some(&a));
        assert_eq!(order(&a), order(&b));
        assert!(b.entries.iter().all(|e| e.rank_delta == 0));
    }

    #[test]
    fn test_tier_is_attached() {
        let snap = rank(SquadId::new(), vec![MemberScore::new("A", 95)], None);
        assert_eq!(snap.entries[0].tier, Tier::Diamond);
        assert!(LeaderboardSnapshot::empty(snap.cohort_id).entries.is_empty());
    }
}
