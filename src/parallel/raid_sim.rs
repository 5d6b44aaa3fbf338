//! Parallel raid simulation: one raid, many participants attacking the same
//! boss at once on a rayon pool, followed by a damage conservation check.

use std::collections::BTreeSet;

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::combat::battle_log::Outcome;
use crate::combat::boss::{BossId, BossSpawn, BossTier, BossType, Phase};
use crate::combat::power::{Tactic, UnitRoster};
use crate::combat::resolver::Attacker;
use crate::config::EngineConfig;
use crate::engine::BossEngine;
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::leaderboard::LeaderboardEntry;
use crate::parallel::pool::WorkerPool;
use crate::raid::{Alliance, RaidId, RaidRequest, RaidStatus};

const SIM_ALLIANCE: u64 = 1;

#[derive(Debug, Clone)]
pub struct RaidSimConfig {
    pub participants: u32,
    pub attacks_per_participant: u32,
    pub roster: UnitRoster,
    pub tactic: Tactic,
    pub boss: BossSpawn,
    pub workers: usize,
    pub engine: EngineConfig,
}

impl Default for RaidSimConfig {
    fn default() -> Self {
        Self {
            participants: 10,
            attacks_per_participant: 20,
            roster: UnitRoster::new(200, 100, 100, 20),
            tactic: Tactic::Aggressive,
            boss: BossSpawn {
                boss_type: BossType::AncientTitan,
                tier: BossTier::Purple,
                base_hp: 1_000_000,
                defense: 100.0,
                abilities: BTreeSet::new(),
                expires_in_minutes: 60,
            },
            workers: 0,
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttackTally {
    pub resolved: u64,
    pub victories: u64,
    pub rejected_conflict: u64,
    pub rejected_transient: u64,
}

impl AttackTally {
    fn merge(self, other: Self) -> Self {
        Self {
            resolved: self.resolved + other.resolved,
            victories: self.victories + other.victories,
            rejected_conflict: self.rejected_conflict + other.rejected_conflict,
            rejected_transient: self.rejected_transient + other.rejected_transient,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RaidSimReport {
    pub boss_id: BossId,
    pub raid_id: RaidId,
    pub participants: u32,
    pub base_hp: u64,
    pub hp_remaining: u64,
    pub phase: Phase,
    pub defeated: bool,
    pub raid_status: RaidStatus,
    pub raid_total_damage: u64,
    pub contributions_sum: u64,
    pub leaderboard_damage: u64,
    pub attacks: AttackTally,
    /// HP lost, raid total, contribution sum, and leaderboard sum all agree.
    pub damage_conserved: bool,
    pub top: Vec<LeaderboardEntry>,
}

pub fn run_raid_simulation(config: &RaidSimConfig) -> EngineResult<RaidSimReport> {
    if config.participants == 0 {
        return Err(EngineError::validation("participants must be at least 1"));
    }

    let leader = 1;
    let members: Vec<u64> = (1..=u64::from(config.participants)).collect();
    let mut engine_config = config.engine.clone();
    engine_config.alliances.push(Alliance {
        id: SIM_ALLIANCE,
        leaders: vec![leader],
        members: members.clone(),
    });
    let engine = BossEngine::new(&engine_config)?;

    let now = Utc::now();
    let boss = engine.insert_boss(&config.boss, now)?;
    let raid = engine.create_raid(
        leader,
        &RaidRequest {
            boss_id: Some(boss.boss_id),
            alliance_id: Some(SIM_ALLIANCE),
            min_participants: Some(config.participants),
            max_participants: Some(config.participants),
        },
        now,
    )?;
    for &user in members.iter().filter(|&&user| user != leader) {
        engine.join_raid(raid.id, user, now)?;
    }
    engine.start_raid(raid.id, leader, now)?;

    let pool = WorkerPool::with_workers(config.workers);
    let tally = pool.install(|| {
        members
            .par_iter()
            .map(|&user_id| {
                let attacker = Attacker {
                    user_id,
                    roster: config.roster,
                    tactic: config.tactic,
                };
                let mut tally = AttackTally::default();
                for _ in 0..config.attacks_per_participant {
                    match engine.contribute(raid.id, &attacker, Utc::now()) {
                        Ok(outcome) => {
                            tally.resolved += 1;
                            if outcome.attack.result == Outcome::Victory {
                                tally.victories += 1;
                            }
                        }
                        Err(err) if err.kind() == ErrorKind::Transient => tally.rejected_transient += 1,
                        Err(_) => tally.rejected_conflict += 1,
                    }
                }
                tally
            })
            .reduce(AttackTally::default, AttackTally::merge)
    });

    let final_boss = engine.store().snapshot(boss.boss_id)?;
    let detail = engine.raid_detail(raid.id, Utc::now())?;
    let contributions_sum: u64 = detail.raid.contributions.values().map(|c| c.damage).sum();
    let leaderboard_damage = engine.ranked_damage(boss.boss_id);
    let hp_lost = final_boss.base_hp - final_boss.current_hp;
    let damage_conserved = hp_lost == detail.raid.total_damage
        && contributions_sum == detail.raid.total_damage
        && leaderboard_damage == detail.raid.total_damage;

    info!(
        raid_id = raid.id.0,
        resolved = tally.resolved,
        transient = tally.rejected_transient,
        hp_remaining = final_boss.current_hp,
        damage_conserved,
        "raid simulation finished"
    );

    Ok(RaidSimReport {
        boss_id: boss.boss_id,
        raid_id: raid.id,
        participants: config.participants,
        base_hp: final_boss.base_hp,
        hp_remaining: final_boss.current_hp,
        phase: final_boss.phase,
        defeated: final_boss.defeated,
        raid_status: detail.raid.status,
        raid_total_damage: detail.raid.total_damage,
        contributions_sum,
        leaderboard_damage,
        attacks: tally,
        damage_conserved,
        top: engine.leaderboard(boss.boss_id, 0, Some(5))?,
    })
}
