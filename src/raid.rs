//! Alliance raids: bounded groups of alliance members sharing one boss HP pool.
//!
//! Each raid sits behind its own mutex. A contribution holds the raid lock
//! while the boss lock is taken inside the strike, so the lock order is always
//! raid then boss. Nothing that holds a boss lock ever reaches for a raid.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::combat::battle_log::Outcome;
use crate::combat::boss::{Boss, BossId, BossSummary};
use crate::combat::resolver::{AttackResult, Attacker};
use crate::error::{EngineError, EngineResult};
use crate::store::BossStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RaidId(pub u64);

impl fmt::Display for RaidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaidStatus {
    Forming,
    Active,
    Completed,
    Failed,
}

impl RaidStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "forming" => Some(Self::Forming),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forming => "forming",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub const fn is_open(self) -> bool {
        matches!(self, Self::Forming | Self::Active)
    }
}

impl fmt::Display for RaidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Contribution {
    pub damage: u64,
    pub attacks: u32,
    pub first_at: DateTime<Utc>,
    pub last_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllianceRaid {
    pub id: RaidId,
    pub boss_id: BossId,
    pub alliance_id: u64,
    pub leader_id: u64,
    pub min_participants: u32,
    pub max_participants: u32,
    pub status: RaidStatus,
    /// Join order.
    pub participants: Vec<u64>,
    pub contributions: BTreeMap<u64, Contribution>,
    pub total_damage: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AllianceRaid {
    pub fn participant_count(&self) -> u32 {
        self.participants.len() as u32
    }

    pub fn has_participant(&self, user_id: u64) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn is_full(&self) -> bool {
        self.participant_count() >= self.max_participants
    }

    /// Settle the raid against the boss's current state: a defeated boss
    /// completes it, an expired one fails it.
    pub fn refresh(&mut self, boss: &Boss, now: DateTime<Utc>) {
        if !self.status.is_open() {
            return;
        }
        if boss.defeated {
            self.finish(RaidStatus::Completed, now);
        } else if boss.is_expired(now) {
            self.finish(RaidStatus::Failed, now);
        }
    }

    fn finish(&mut self, status: RaidStatus, now: DateTime<Utc>) {
        self.status = status;
        self.completed_at = Some(now);
        info!(raid_id = self.id.0, boss_id = self.boss_id.0, status = %status, total_damage = self.total_damage, "raid closed");
    }

    fn credit(&mut self, user_id: u64, damage: u64, at: DateTime<Utc>) {
        if !self.has_participant(user_id) {
            self.participants.push(user_id);
        }
        self.total_damage += damage;
        self.contributions
            .entry(user_id)
            .and_modify(|entry| {
                entry.damage += damage;
                entry.attacks += 1;
                entry.last_at = at;
            })
            .or_insert(Contribution {
                damage,
                attacks: 1,
                first_at: at,
                last_at: at,
            });
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Alliance {
    pub id: u64,
    pub leaders: Vec<u64>,
    pub members: Vec<u64>,
}

/// Membership lookups owned by the surrounding game.
pub trait AllianceDirectory: Send + Sync {
    fn is_leader(&self, alliance_id: u64, user_id: u64) -> bool;
    fn is_member(&self, alliance_id: u64, user_id: u64) -> bool;
}

#[derive(Debug, Default)]
pub struct StaticAllianceDirectory {
    leaders: HashMap<u64, HashSet<u64>>,
    members: HashMap<u64, HashSet<u64>>,
}

impl StaticAllianceDirectory {
    pub fn new(alliances: &[Alliance]) -> Self {
        let mut directory = Self::default();
        for alliance in alliances {
            let leaders = directory.leaders.entry(alliance.id).or_default();
            leaders.extend(alliance.leaders.iter().copied());
            let members = directory.members.entry(alliance.id).or_default();
            members.extend(alliance.members.iter().copied());
            members.extend(alliance.leaders.iter().copied());
        }
        directory
    }
}

impl AllianceDirectory for StaticAllianceDirectory {
    fn is_leader(&self, alliance_id: u64, user_id: u64) -> bool {
        self.leaders
            .get(&alliance_id)
            .is_some_and(|leaders| leaders.contains(&user_id))
    }

    fn is_member(&self, alliance_id: u64, user_id: u64) -> bool {
        self.members
            .get(&alliance_id)
            .is_some_and(|members| members.contains(&user_id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaidDefaults {
    pub min_participants: u32,
    pub max_participants: u32,
}

impl Default for RaidDefaults {
    fn default() -> Self {
        Self {
            min_participants: 3,
            max_participants: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RaidRequest {
    pub boss_id: Option<BossId>,
    pub alliance_id: Option<u64>,
    pub min_participants: Option<u32>,
    pub max_participants: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantStanding {
    pub user_id: u64,
    pub damage_dealt: u64,
    pub attacks: u32,
    pub contribution_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaidDetail {
    pub raid: AllianceRaid,
    pub boss: BossSummary,
    pub participants: Vec<ParticipantStanding>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RaidContribution {
    pub raid: AllianceRaid,
    pub attack: Arc<AttackResult>,
}

pub struct RaidCoordinator {
    raids: RwLock<HashMap<RaidId, Arc<Mutex<AllianceRaid>>>>,
    next_id: AtomicU64,
    directory: Arc<dyn AllianceDirectory>,
    defaults: RaidDefaults,
}

fn lock(raid: &Mutex<AllianceRaid>) -> MutexGuard<'_, AllianceRaid> {
    raid.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RaidCoordinator {
    pub fn new(directory: Arc<dyn AllianceDirectory>, defaults: RaidDefaults) -> Self {
        Self {
            raids: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            directory,
            defaults,
        }
    }

    /// Every check runs before the raid is registered. The creator joins as
    /// the first participant.
    pub fn create(
        &self,
        store: &BossStore,
        leader_id: u64,
        request: &RaidRequest,
        now: DateTime<Utc>,
    ) -> EngineResult<AllianceRaid> {
        let (Some(boss_id), Some(alliance_id)) = (request.boss_id, request.alliance_id) else {
            return Err(EngineError::validation("boss_id and alliance_id required"));
        };
        let min = request.min_participants.unwrap_or(self.defaults.min_participants);
        let max = request.max_participants.unwrap_or(self.defaults.max_participants);
        if min == 0 {
            return Err(EngineError::validation("min_participants must be at least 1"));
        }
        if min > max {
            return Err(EngineError::validation(format!(
                "min_participants ({min}) must not exceed max_participants ({max})"
            )));
        }
        if !self.directory.is_leader(alliance_id, leader_id) {
            return Err(EngineError::Forbidden(format!(
                "user {leader_id} does not lead alliance {alliance_id}"
            )));
        }

        let boss = store.snapshot(boss_id)?;
        boss.ensure_attackable(now)?;

        let mut raids = self.raids.write().unwrap_or_else(PoisonError::into_inner);
        for existing in raids.values() {
            let mut existing = lock(existing);
            if existing.boss_id != boss_id {
                continue;
            }
            existing.refresh(&boss, now);
            if existing.status.is_open() {
                return Err(EngineError::RaidAlreadyOpen {
                    boss: boss_id,
                    raid: existing.id,
                });
            }
        }

        let raid = AllianceRaid {
            id: RaidId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            boss_id,
            alliance_id,
            leader_id,
            min_participants: min,
            max_participants: max,
            status: RaidStatus::Forming,
            participants: vec![leader_id],
            contributions: BTreeMap::new(),
            total_damage: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
        };
        raids.insert(raid.id, Arc::new(Mutex::new(raid.clone())));
        info!(raid_id = raid.id.0, boss_id = boss_id.0, alliance_id, leader_id, "raid created");
        Ok(raid)
    }

    pub fn join(
        &self,
        store: &BossStore,
        raid_id: RaidId,
        user_id: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<AllianceRaid> {
        let handle = self.handle(raid_id)?;
        let mut raid = lock(&handle);
        self.settle(store, &mut raid, now)?;

        if raid.status != RaidStatus::Forming {
            return Err(EngineError::RaidNotActive {
                raid: raid_id,
                status: raid.status,
            });
        }
        if !self.directory.is_member(raid.alliance_id, user_id) {
            return Err(EngineError::Forbidden(format!(
                "user {user_id} is not a member of alliance {}",
                raid.alliance_id
            )));
        }
        if raid.has_participant(user_id) {
            return Err(EngineError::AlreadyJoined {
                raid: raid_id,
                user: user_id,
            });
        }
        if raid.is_full() {
            return Err(EngineError::ParticipantLimit {
                raid: raid_id,
                max: raid.max_participants,
            });
        }

        raid.participants.push(user_id);
        info!(raid_id = raid_id.0, user_id, participants = raid.participants.len(), "raid joined");
        Ok(raid.clone())
    }

    pub fn start(
        &self,
        store: &BossStore,
        raid_id: RaidId,
        user_id: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<AllianceRaid> {
        let handle = self.handle(raid_id)?;
        let mut raid = lock(&handle);
        self.settle(store, &mut raid, now)?;

        if raid.status != RaidStatus::Forming {
            return Err(EngineError::RaidNotActive {
                raid: raid_id,
                status: raid.status,
            });
        }
        if raid.leader_id != user_id && !self.directory.is_leader(raid.alliance_id, user_id) {
            return Err(EngineError::Forbidden(format!(
                "only an alliance leader can start raid {raid_id}"
            )));
        }
        if raid.participant_count() < raid.min_participants {
            return Err(EngineError::validation(format!(
                "need at least {} participants, have {}",
                raid.min_participants,
                raid.participant_count()
            )));
        }

        raid.status = RaidStatus::Active;
        raid.started_at = Some(now);
        info!(raid_id = raid_id.0, participants = raid.participants.len(), "raid started");
        Ok(raid.clone())
    }

    /// Resolve one raid attack. `strike` performs the locked boss mutation;
    /// it runs while this raid is locked, so contributions to one raid are
    /// applied one at a time and the per-user totals can never drift from the
    /// damage actually committed to the boss.
    pub fn contribute(
        &self,
        store: &BossStore,
        raid_id: RaidId,
        attacker: &Attacker,
        now: DateTime<Utc>,
        strike: impl FnOnce(BossId, &Attacker) -> EngineResult<Arc<AttackResult>>,
    ) -> EngineResult<RaidContribution> {
        let handle = self.handle(raid_id)?;
        let mut raid = lock(&handle);
        self.settle(store, &mut raid, now)?;

        if raid.status != RaidStatus::Active {
            return Err(EngineError::RaidNotActive {
                raid: raid_id,
                status: raid.status,
            });
        }
        let user_id = attacker.user_id;
        if !self.directory.is_member(raid.alliance_id, user_id) {
            return Err(EngineError::Forbidden(format!(
                "user {user_id} is not a member of alliance {}",
                raid.alliance_id
            )));
        }
        if !raid.has_participant(user_id) && raid.is_full() {
            return Err(EngineError::ParticipantLimit {
                raid: raid_id,
                max: raid.max_participants,
            });
        }

        let attack = match strike(raid.boss_id, attacker) {
            Ok(attack) => attack,
            Err(err @ (EngineError::BossDefeated(_) | EngineError::BossExpired(_))) => {
                // Lost a race with another attacker; the raid is over either way.
                let status = if matches!(err, EngineError::BossDefeated(_)) {
                    RaidStatus::Completed
                } else {
                    RaidStatus::Failed
                };
                raid.finish(status, now);
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        raid.credit(user_id, attack.damage_dealt, attack.created_at);
        if attack.result == Outcome::Victory {
            raid.finish(RaidStatus::Completed, now);
        }

        Ok(RaidContribution {
            raid: raid.clone(),
            attack,
        })
    }

    /// Close every open raid on a boss that was just defeated.
    pub fn complete_for_boss(&self, boss_id: BossId, now: DateTime<Utc>) -> usize {
        let raids = self.raids.read().unwrap_or_else(PoisonError::into_inner);
        let mut closed = 0;
        for handle in raids.values() {
            let mut raid = lock(handle);
            if raid.boss_id == boss_id && raid.status.is_open() {
                raid.finish(RaidStatus::Completed, now);
                closed += 1;
            }
        }
        closed
    }

    pub fn detail(&self, store: &BossStore, raid_id: RaidId, now: DateTime<Utc>) -> EngineResult<RaidDetail> {
        let handle = self.handle(raid_id)?;
        let mut raid = lock(&handle);
        let boss = store.snapshot(raid.boss_id)?;
        raid.refresh(&boss, now);

        let mut participants: Vec<ParticipantStanding> = raid
            .participants
            .iter()
            .map(|&user_id| {
                let (damage_dealt, attacks) = raid
                    .contributions
                    .get(&user_id)
                    .map_or((0, 0), |c| (c.damage, c.attacks));
                let contribution_percent = if raid.total_damage == 0 {
                    0.0
                } else {
                    (damage_dealt as f64 / raid.total_damage as f64 * 10_000.0).round() / 100.0
                };
                ParticipantStanding {
                    user_id,
                    damage_dealt,
                    attacks,
                    contribution_percent,
                }
            })
            .collect();
        // Stable sort keeps join order among equal contributors.
        participants.sort_by(|a, b| b.damage_dealt.cmp(&a.damage_dealt));

        Ok(RaidDetail {
            raid: raid.clone(),
            boss: boss.summary(now),
            participants,
        })
    }

    /// Raids of one alliance, newest first, optionally filtered by status.
    pub fn list(
        &self,
        store: &BossStore,
        alliance_id: u64,
        status: Option<RaidStatus>,
        now: DateTime<Utc>,
    ) -> Vec<AllianceRaid> {
        let raids = self.raids.read().unwrap_or_else(PoisonError::into_inner);
        let mut listed: Vec<AllianceRaid> = raids
            .values()
            .filter_map(|handle| {
                let mut raid = lock(handle);
                if raid.alliance_id != alliance_id {
                    return None;
                }
                if let Ok(boss) = store.snapshot(raid.boss_id) {
                    raid.refresh(&boss, now);
                }
                status
                    .map_or(true, |wanted| raid.status == wanted)
                    .then(|| raid.clone())
            })
            .collect();
        listed.sort_by(|a, b| b.id.cmp(&a.id));
        listed
    }

    fn handle(&self, raid_id: RaidId) -> EngineResult<Arc<Mutex<AllianceRaid>>> {
        self.raids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&raid_id)
            .cloned()
            .ok_or_else(|| EngineError::raid_not_found(raid_id))
    }

    fn settle(&self, store: &BossStore, raid: &mut AllianceRaid, now: DateTime<Utc>) -> EngineResult<()> {
        let boss = store.snapshot(raid.boss_id)?;
        raid.refresh(&boss, now);
        Ok(())
    }
}
