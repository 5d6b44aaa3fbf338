//! In-process boss repository with per-boss locking, plus the attempt history.
//!
//! Each boss lives in its own slot: a mutex around the live aggregate and a
//! published `Arc<Boss>` snapshot for readers. Mutations run on a clone of the
//! live boss and are written back only when the closure succeeds, so a failed
//! attack never leaves a partial HP change behind. Attacks on different bosses
//! never share a lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::combat::battle_log::Outcome;
use crate::combat::boss::{Boss, BossId, BossSpawn};
use crate::combat::resolver::AttackResult;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            base_backoff_ms: 1,
            max_backoff_ms: 64,
        }
    }
}

struct BossSlot {
    live: Mutex<Boss>,
    published: RwLock<Arc<Boss>>,
}

pub struct BossStore {
    slots: RwLock<HashMap<BossId, Arc<BossSlot>>>,
    next_id: AtomicU64,
    policy: LockPolicy,
}

impl BossStore {
    pub fn new(policy: LockPolicy) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            policy,
        }
    }

    pub fn spawn(&self, spawn: &BossSpawn, now: DateTime<Utc>) -> EngineResult<Arc<Boss>> {
        let id = BossId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let boss = Boss::spawn(id, spawn, now)?;
        let published = Arc::new(boss.clone());
        let slot = Arc::new(BossSlot {
            live: Mutex::new(boss),
            published: RwLock::new(Arc::clone(&published)),
        });
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, slot);
        Ok(published)
    }

    /// Last committed state. Never waits on an in-flight attack.
    pub fn snapshot(&self, id: BossId) -> EngineResult<Arc<Boss>> {
        let slot = self.slot(id)?;
        let published = slot.published.read().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(&published))
    }

    pub fn list(&self) -> Vec<Arc<Boss>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut bosses: Vec<Arc<Boss>> = slots
            .values()
            .map(|slot| Arc::clone(&slot.published.read().unwrap_or_else(PoisonError::into_inner)))
            .collect();
        bosses.sort_by_key(|boss| boss.id);
        bosses
    }

    pub fn contains(&self, id: BossId) -> bool {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    /// Run `f` against the boss under its lock. The change is committed and
    /// published only if `f` returns `Ok`.
    pub fn mutate<R>(
        &self,
        id: BossId,
        f: impl FnOnce(&mut Boss) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let slot = self.slot(id)?;
        let mut live = self.lock_slot(&slot, id)?;
        let mut working = live.clone();
        let out = f(&mut working)?;
        *live = working;
        *slot.published.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(live.clone());
        Ok(out)
    }

    fn slot(&self, id: BossId) -> EngineResult<Arc<BossSlot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::boss_not_found(id))
    }

    fn lock_slot<'a>(&self, slot: &'a BossSlot, id: BossId) -> EngineResult<MutexGuard<'a, Boss>> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut backoff = Duration::from_millis(self.policy.base_backoff_ms.max(1));
        let ceiling = Duration::from_millis(self.policy.max_backoff_ms.max(1));

        for attempt in 1..=max_attempts {
            match slot.live.try_lock() {
                Ok(guard) => return Ok(guard),
                // Commits happen on a clone, so a panicked holder never left a half-written boss.
                Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) if attempt < max_attempts => {
                    debug!(boss_id = id.0, attempt, backoff_ms = backoff.as_millis() as u64, "boss lock busy");
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(ceiling);
                }
                Err(TryLockError::WouldBlock) => {}
            }
        }

        warn!(boss_id = id.0, attempts = max_attempts, "boss lock contention exhausted retries");
        Err(EngineError::Contention {
            boss: id,
            attempts: max_attempts,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BossStats {
    pub total_attempts: u64,
    pub victories: u64,
    pub avg_damage: f64,
    pub max_damage: u64,
    pub avg_phases: f64,
}

/// Append-only history of resolved attacks.
#[derive(Default)]
pub struct AttemptLog {
    attempts: RwLock<Vec<Arc<AttackResult>>>,
}

impl AttemptLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, attempt: AttackResult) -> Arc<AttackResult> {
        let attempt = Arc::new(attempt);
        self.attempts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&attempt));
        attempt
    }

    /// Newest first.
    pub fn for_user(&self, user_id: u64, limit: usize) -> Vec<Arc<AttackResult>> {
        self.newest_matching(limit, |attempt| attempt.user_id == user_id)
    }

    /// Newest first.
    pub fn for_boss(&self, boss_id: BossId, limit: usize) -> Vec<Arc<AttackResult>> {
        self.newest_matching(limit, |attempt| attempt.boss_id == boss_id)
    }

    pub fn stats(&self, boss_id: BossId) -> BossStats {
        let attempts = self.attempts.read().unwrap_or_else(PoisonError::into_inner);
        let mut stats = BossStats::default();
        let mut damage_sum = 0u64;
        let mut phase_sum = 0u64;
        for attempt in attempts.iter().filter(|a| a.boss_id == boss_id) {
            stats.total_attempts += 1;
            if attempt.result == Outcome::Victory {
                stats.victories += 1;
            }
            damage_sum += attempt.damage_dealt;
            phase_sum += u64::from(u8::from(attempt.phases_reached));
            stats.max_damage = stats.max_damage.max(attempt.damage_dealt);
        }
        if stats.total_attempts == 0 {
            stats.avg_phases = 1.0;
        } else {
            stats.avg_damage = damage_sum as f64 / stats.total_attempts as f64;
            stats.avg_phases = phase_sum as f64 / stats.total_attempts as f64;
        }
        stats
    }

    fn newest_matching(
        &self,
        limit: usize,
        keep: impl Fn(&AttackResult) -> bool,
    ) -> Vec<Arc<AttackResult>> {
        let attempts = self.attempts.read().unwrap_or_else(PoisonError::into_inner);
        attempts
            .iter()
            .rev()
            .filter(|attempt| keep(attempt))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::combat::boss::{BossTier, BossType};

    fn spawn_request(base_hp: u64) -> BossSpawn {
        BossSpawn {
            boss_type: BossType::EliteGuardian,
            tier: BossTier::Green,
            base_hp,
            defense: 100.0,
            abilities: BTreeSet::new(),
            expires_in_minutes: 60,
        }
    }

    #[test]
    fn failed_mutation_is_discarded() {
        let store = BossStore::new(LockPolicy::default());
        let boss = store.spawn(&spawn_request(100), Utc::now()).unwrap();
        let result: EngineResult<()> = store.mutate(boss.id, |live| {
            live.apply_damage(40)?;
            Err(EngineError::validation("late failure"))
        });
        assert!(result.is_err());
        let after = store.snapshot(boss.id).unwrap();
        assert_eq!(after.current_hp, 100);
        assert_eq!(after.version, 0);
    }

    #[test]
    fn committed_mutation_is_published() {
        let store = BossStore::new(LockPolicy::default());
        let boss = store.spawn(&spawn_request(100), Utc::now()).unwrap();
        store.mutate(boss.id, |live| live.apply_damage(30)).unwrap();
        let after = store.snapshot(boss.id).unwrap();
        assert_eq!(after.current_hp, 70);
        assert_eq!(after.version, 1);
        assert_eq!(boss.current_hp, 100, "earlier snapshots are immutable");
    }

    #[test]
    fn unknown_boss_is_not_found() {
        let store = BossStore::new(LockPolicy::default());
        assert_eq!(
            store.snapshot(BossId(77)).err(),
            Some(EngineError::boss_not_found(BossId(77)))
        );
    }

    #[test]
    fn contention_surfaces_after_bounded_retries() {
        let store = BossStore::new(LockPolicy {
            max_attempts: 3,
            base_backoff_ms: 1,
            max_backoff_ms: 2,
        });
        let boss = store.spawn(&spawn_request(100), Utc::now()).unwrap();
        let outcome = store.mutate(boss.id, |_| {
            Ok(store.mutate(boss.id, |live| live.apply_damage(1)))
        });
        assert_eq!(
            outcome.unwrap().err(),
            Some(EngineError::Contention {
                boss: boss.id,
                attempts: 3
            })
        );
    }

    #[test]
    fn parallel_damage_is_never_lost() {
        let store = BossStore::new(LockPolicy::default());
        let boss = store.spawn(&spawn_request(10_000), Utc::now()).unwrap();
        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        store.mutate(boss.id, |live| live.apply_damage(10)).unwrap();
                    }
                });
            }
        });
        let after = store.snapshot(boss.id).unwrap();
        assert_eq!(after.current_hp, 10_000 - 8 * 50 * 10);
        assert_eq!(after.version, 400);
    }
}
