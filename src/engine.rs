//! Engine façade: owns the boss store, raids, rankings and attempt history,
//! and is the only place that sequences them for one request.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::combat::battle_log::Outcome;
use crate::combat::boss::{BossId, BossSpawn, BossSummary, BossTier, BossType};
use crate::combat::estimate::{BattleEstimate, EstimateService};
use crate::combat::power::{Tactic, UnitRoster};
use crate::combat::resolver::{AttackResult, Attacker, CombatResolver};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::leaderboard::{LeaderboardEntry, LeaderboardLimits, LeaderboardTracker};
use crate::raid::{
    AllianceDirectory, AllianceRaid, RaidContribution, RaidCoordinator, RaidDetail, RaidId,
    RaidRequest, RaidStatus, StaticAllianceDirectory,
};
use crate::store::{AttemptLog, BossStats, BossStore};

pub const DEFAULT_USER_ATTEMPTS: usize = 10;
pub const DEFAULT_BOSS_ATTEMPTS: usize = 20;
pub const MAX_ATTEMPTS_PAGE: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BossFilter {
    pub tier: Option<BossTier>,
    pub boss_type: Option<BossType>,
    /// Also list defeated and expired bosses.
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BossDetail {
    #[serde(flatten)]
    pub boss: BossSummary,
    pub stats: BossStats,
}

pub struct BossEngine {
    store: BossStore,
    attempts: AttemptLog,
    leaderboard: LeaderboardTracker,
    raids: RaidCoordinator,
    resolver: CombatResolver,
    estimator: EstimateService,
    limits: LeaderboardLimits,
    admins: HashSet<u64>,
}

impl BossEngine {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let directory = Arc::new(StaticAllianceDirectory::new(&config.alliances));
        Self::with_directory(config, directory)
    }

    /// Build an engine against an external membership source and spawn the
    /// configured bosses.
    pub fn with_directory(
        config: &EngineConfig,
        directory: Arc<dyn AllianceDirectory>,
    ) -> EngineResult<Self> {
        config.validate().map_err(EngineError::validation)?;
        let engine = Self {
            store: BossStore::new(config.locking),
            attempts: AttemptLog::new(),
            leaderboard: LeaderboardTracker::new(),
            raids: RaidCoordinator::new(directory, config.raids),
            resolver: CombatResolver::new(config.tactics, config.combat, config.abilities),
            estimator: EstimateService::new(config.tactics, config.combat),
            limits: config.leaderboard,
            admins: config.admins.iter().copied().collect(),
        };

        let now = Utc::now();
        for spawn in &config.bosses {
            engine.insert_boss(spawn, now)?;
        }
        Ok(engine)
    }

    pub fn store(&self) -> &BossStore {
        &self.store
    }

    /// Spawn without a permission check. Used for configured bosses and by
    /// embedding code that already acts as the spawner.
    pub fn insert_boss(&self, spawn: &BossSpawn, now: DateTime<Utc>) -> EngineResult<BossSummary> {
        let boss = self.store.spawn(spawn, now)?;
        info!(
            boss_id = boss.id.0,
            boss_type = ?boss.boss_type,
            tier = ?boss.tier,
            base_hp = boss.base_hp,
            "boss spawned"
        );
        Ok(boss.summary(now))
    }

    pub fn spawn_boss(&self, caller: u64, spawn: &BossSpawn, now: DateTime<Utc>) -> EngineResult<BossSummary> {
        if !self.admins.contains(&caller) {
            return Err(EngineError::Forbidden(format!("user {caller} may not spawn bosses")));
        }
        self.insert_boss(spawn, now)
    }

    pub fn list_bosses(&self, filter: BossFilter, now: DateTime<Utc>) -> Vec<BossSummary> {
        self.store
            .list()
            .into_iter()
            .filter(|boss| filter.include_inactive || boss.is_alive(now))
            .filter(|boss| filter.tier.map_or(true, |tier| boss.tier == tier))
            .filter(|boss| filter.boss_type.map_or(true, |kind| boss.boss_type == kind))
            .map(|boss| boss.summary(now))
            .collect()
    }

    pub fn boss_detail(&self, boss_id: BossId, now: DateTime<Utc>) -> EngineResult<BossDetail> {
        let boss = self.store.snapshot(boss_id)?;
        Ok(BossDetail {
            boss: boss.summary(now),
            stats: self.attempts.stats(boss_id),
        })
    }

    /// Preview against the published snapshot. Takes no boss lock.
    pub fn estimate(
        &self,
        boss_id: BossId,
        roster: &UnitRoster,
        tactic: Tactic,
        now: DateTime<Utc>,
    ) -> EngineResult<BattleEstimate> {
        let boss = self.store.snapshot(boss_id)?;
        self.estimator.estimate(&boss, roster, tactic, now)
    }

    pub fn attack(&self, boss_id: BossId, attacker: &Attacker, now: DateTime<Utc>) -> EngineResult<Arc<AttackResult>> {
        let attack = self.strike(boss_id, attacker, None, now)?;
        if attack.result == Outcome::Victory {
            self.raids.complete_for_boss(boss_id, now);
        }
        Ok(attack)
    }

    /// The locked section shared by solo and raid attacks. The ranking and
    /// history are written before the boss lock is released, so a reader that
    /// sees the new HP also sees the attack on the board.
    fn strike(
        &self,
        boss_id: BossId,
        attacker: &Attacker,
        raid_id: Option<RaidId>,
        now: DateTime<Utc>,
    ) -> EngineResult<Arc<AttackResult>> {
        self.store.mutate(boss_id, |boss| {
            let mut attack = self.resolver.resolve_attack(boss, attacker, now)?;
            attack.raid_id = raid_id;
            self.leaderboard
                .record(boss_id, attacker.user_id, attack.damage_dealt, attack.created_at);
            Ok(self.attempts.record(attack))
        })
    }

    pub fn leaderboard(
        &self,
        boss_id: BossId,
        offset: usize,
        limit: Option<usize>,
    ) -> EngineResult<Vec<LeaderboardEntry>> {
        if !self.store.contains(boss_id) {
            return Err(EngineError::boss_not_found(boss_id));
        }
        Ok(self.leaderboard.rankings(boss_id, offset, self.limits.clamp(limit)))
    }

    /// Sum of all ranked damage on a boss.
    pub fn ranked_damage(&self, boss_id: BossId) -> u64 {
        self.leaderboard.total_damage(boss_id)
    }

    pub fn user_attempts(&self, user_id: u64, limit: Option<usize>) -> Vec<Arc<AttackResult>> {
        let limit = limit.unwrap_or(DEFAULT_USER_ATTEMPTS).clamp(1, MAX_ATTEMPTS_PAGE);
        self.attempts.for_user(user_id, limit)
    }

    pub fn boss_attempts(&self, boss_id: BossId, limit: Option<usize>) -> EngineResult<Vec<Arc<AttackResult>>> {
        if !self.store.contains(boss_id) {
            return Err(EngineError::boss_not_found(boss_id));
        }
        let limit = limit.unwrap_or(DEFAULT_BOSS_ATTEMPTS).clamp(1, MAX_ATTEMPTS_PAGE);
        Ok(self.attempts.for_boss(boss_id, limit))
    }

    pub fn create_raid(&self, caller: u64, request: &RaidRequest, now: DateTime<Utc>) -> EngineResult<AllianceRaid> {
        self.raids.create(&self.store, caller, request, now)
    }

    pub fn join_raid(&self, raid_id: RaidId, caller: u64, now: DateTime<Utc>) -> EngineResult<AllianceRaid> {
        self.raids.join(&self.store, raid_id, caller, now)
    }

    pub fn start_raid(&self, raid_id: RaidId, caller: u64, now: DateTime<Utc>) -> EngineResult<AllianceRaid> {
        self.raids.start(&self.store, raid_id, caller, now)
    }

    pub fn contribute(
        &self,
        raid_id: RaidId,
        attacker: &Attacker,
        now: DateTime<Utc>,
    ) -> EngineResult<RaidContribution> {
        let contribution = self.raids.contribute(&self.store, raid_id, attacker, now, |boss_id, attacker| {
            self.strike(boss_id, attacker, Some(raid_id), now)
        })?;
        // Runs after the raid lock is released; the sweep locks raids itself.
        if contribution.attack.result == Outcome::Victory {
            self.raids.complete_for_boss(contribution.attack.boss_id, now);
        }
        Ok(contribution)
    }

    pub fn raid_detail(&self, raid_id: RaidId, now: DateTime<Utc>) -> EngineResult<RaidDetail> {
        self.raids.detail(&self.store, raid_id, now)
    }

    pub fn list_raids(&self, alliance_id: u64, status: Option<RaidStatus>, now: DateTime<Utc>) -> Vec<AllianceRaid> {
        self.raids.list(&self.store, alliance_id, status, now)
    }
}
