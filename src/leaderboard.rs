//! Per-boss damage rankings.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::combat::boss::BossId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for LeaderboardLimits {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

impl LeaderboardLimits {
    pub fn clamp(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    #[serde(rename = "user")]
    pub user_id: u64,
    pub damage_dealt: u64,
    pub attacks: u32,
    pub first_contribution_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Standing {
    user_id: u64,
    damage: u64,
    attacks: u32,
    first_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug, Default)]
struct BossBoard {
    standings: HashMap<u64, Standing>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct LeaderboardTracker {
    boards: RwLock<HashMap<BossId, BossBoard>>,
}

impl LeaderboardTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one resolved attack to the user's running total on this boss.
    /// Zero-damage attacks still count, so every attempt has a row.
    pub fn record(&self, boss_id: BossId, user_id: u64, damage: u64, at: DateTime<Utc>) {
        let mut boards = self.boards.write().unwrap_or_else(PoisonError::into_inner);
        let board = boards.entry(boss_id).or_default();
        let seq = board.next_seq;
        let standing = board.standings.entry(user_id).or_insert_with(|| Standing {
            user_id,
            damage: 0,
            attacks: 0,
            first_at: at,
            seq,
        });
        standing.damage += damage;
        standing.attacks += 1;
        if standing.seq == seq {
            board.next_seq += 1;
        }
    }

    /// Ranked by damage descending, then earliest first contribution, then
    /// arrival order. Ranks are contiguous positions starting at 1.
    pub fn rankings(&self, boss_id: BossId, offset: usize, limit: usize) -> Vec<LeaderboardEntry> {
        let boards = self.boards.read().unwrap_or_else(PoisonError::into_inner);
        let Some(board) = boards.get(&boss_id) else {
            return Vec::new();
        };

        let mut ordered: Vec<&Standing> = board.standings.values().collect();
        ordered.sort_by(|a, b| {
            b.damage
                .cmp(&a.damage)
                .then(a.first_at.cmp(&b.first_at))
                .then(a.seq.cmp(&b.seq))
        });

        ordered
            .into_iter()
            .enumerate()
            .skip(offset)
            .take(limit)
            .map(|(index, standing)| LeaderboardEntry {
                rank: index as u32 + 1,
                user_id: standing.user_id,
                damage_dealt: standing.damage,
                attacks: standing.attacks,
                first_contribution_at: standing.first_at,
            })
            .collect()
    }

    pub fn total_damage(&self, boss_id: BossId) -> u64 {
        let boards = self.boards.read().unwrap_or_else(PoisonError::into_inner);
        boards
            .get(&boss_id)
            .map_or(0, |board| board.standings.values().map(|s| s.damage).sum())
    }
}
