//! Boss aggregate and its phase/HP state machine.
//!
//! Phase is never stored independently of HP: it is re-derived from
//! `current_hp / base_hp` on every mutation, so it can only move forward while
//! HP only moves down.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::combat::abilities::AbilityKind;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BossId(pub u64);

impl fmt::Display for BossId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BossType {
    EliteGuardian,
    AncientTitan,
    VoidReaver,
    CosmicEmperor,
}

impl BossType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "elite_guardian" => Some(Self::EliteGuardian),
            "ancient_titan" => Some(Self::AncientTitan),
            "void_reaver" => Some(Self::VoidReaver),
            "cosmic_emperor" => Some(Self::CosmicEmperor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BossTier {
    #[default]
    Grey,
    Green,
    Blue,
    Purple,
    Red,
    Golden,
}

impl BossTier {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "grey" => Some(Self::Grey),
            "green" => Some(Self::Green),
            "blue" => Some(Self::Blue),
            "purple" => Some(Self::Purple),
            "red" => Some(Self::Red),
            "golden" => Some(Self::Golden),
            _ => None,
        }
    }

    pub const fn rank(self) -> u8 {
        match self {
            Self::Grey => 1,
            Self::Green => 2,
            Self::Blue => 3,
            Self::Purple => 4,
            Self::Red => 5,
            Self::Golden => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Phase {
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
}

impl From<Phase> for u8 {
    fn from(phase: Phase) -> Self {
        phase as u8
    }
}

impl TryFrom<u8> for Phase {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            other => Err(format!("phase must be 1-4, got {other}")),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

impl Phase {
    /// Band lookup with exact integer math. The lower edge belongs to the next
    /// phase: exactly 75% remaining is phase 2, exactly 25% is phase 4.
    pub fn from_hp(current_hp: u64, base_hp: u64) -> Self {
        let current = current_hp as u128;
        let base = base_hp.max(1) as u128;
        if current * 4 > base * 3 {
            Self::One
        } else if current * 2 > base {
            Self::Two
        } else if current * 4 > base {
            Self::Three
        } else {
            Self::Four
        }
    }

    pub fn next(self) -> Option<Self> {
        match self {
            Self::One => Some(Self::Two),
            Self::Two => Some(Self::Three),
            Self::Three => Some(Self::Four),
            Self::Four => None,
        }
    }

    pub const fn behavior(self) -> &'static str {
        match self {
            Self::One => "standard",
            Self::Two => "defensive",
            Self::Three => "aggressive",
            Self::Four => "berserk",
        }
    }

    pub const fn entry_message(self) -> &'static str {
        match self {
            Self::One => "The boss stands ready",
            Self::Two => "The boss raises its shields!",
            Self::Three => "The boss flies into a rage!",
            Self::Four => "Final phase! The boss is desperate!",
        }
    }

    /// Multiplier on the boss's counterattack while in this phase.
    pub const fn offense_modifier(self) -> f64 {
        match self {
            Self::One => 1.0,
            Self::Two => 0.9,
            Self::Three => 1.3,
            Self::Four => 1.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
}

/// Defense buff left on the boss by ShieldRegeneration until the next transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShieldBuff {
    pub multiplier: f64,
    pub granted_in: Phase,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BossSpawn {
    pub boss_type: BossType,
    #[serde(default)]
    pub tier: BossTier,
    pub base_hp: u64,
    #[serde(default = "default_defense")]
    pub defense: f64,
    #[serde(default)]
    pub abilities: BTreeSet<AbilityKind>,
    #[serde(default = "default_lifetime_minutes")]
    pub expires_in_minutes: i64,
}

fn default_defense() -> f64 {
    100.0
}

fn default_lifetime_minutes() -> i64 {
    24 * 60
}

#[derive(Debug, Clone, PartialEq)]
pub struct DamageOutcome {
    pub hp_before: u64,
    pub hp_after: u64,
    pub applied: u64,
    pub transitions: Vec<PhaseTransition>,
    pub defeated_now: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Boss {
    pub id: BossId,
    pub boss_type: BossType,
    pub tier: BossTier,
    pub base_hp: u64,
    pub current_hp: u64,
    pub defense: f64,
    pub abilities: BTreeSet<AbilityKind>,
    pub phase: Phase,
    pub defeated: bool,
    pub defeated_by: Option<u64>,
    pub defeated_at: Option<DateTime<Utc>>,
    pub shield: Option<ShieldBuff>,
    pub created_at: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
    /// Incremented on every committed damage application.
    pub version: u64,
    pub attacks_received: u64,
}

impl Boss {
    pub fn spawn(id: BossId, spawn: &BossSpawn, now: DateTime<Utc>) -> EngineResult<Self> {
        if spawn.base_hp == 0 {
            return Err(EngineError::validation("base_hp must be positive"));
        }
        if !(spawn.defense.is_finite() && spawn.defense > 0.0) {
            return Err(EngineError::validation("defense must be a positive number"));
        }
        if spawn.expires_in_minutes <= 0 {
            return Err(EngineError::validation("expires_in_minutes must be positive"));
        }

        Ok(Self {
            id,
            boss_type: spawn.boss_type,
            tier: spawn.tier,
            base_hp: spawn.base_hp,
            current_hp: spawn.base_hp,
            defense: spawn.defense,
            abilities: spawn.abilities.clone(),
            phase: Phase::One,
            defeated: false,
            defeated_by: None,
            defeated_at: None,
            shield: None,
            created_at: now,
            expiry_time: now + Duration::minutes(spawn.expires_in_minutes),
            version: 0,
            attacks_received: 0,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_time
    }

    pub fn is_alive(&self, now: DateTime<Utc>) -> bool {
        !self.defeated && !self.is_expired(now)
    }

    pub fn shield_multiplier(&self) -> f64 {
        self.shield.map_or(1.0, |buff| buff.multiplier)
    }

    pub fn effective_defense(&self) -> f64 {
        self.defense * self.shield_multiplier()
    }

    pub fn hp_percent(&self) -> u8 {
        ((self.current_hp as f64 / self.base_hp.max(1) as f64) * 100.0).round() as u8
    }

    /// Reject attacks on a boss that can no longer take damage.
    pub fn ensure_attackable(&self, now: DateTime<Utc>) -> EngineResult<()> {
        if self.defeated {
            return Err(EngineError::BossDefeated(self.id));
        }
        if self.is_expired(now) {
            return Err(EngineError::BossExpired(self.id));
        }
        Ok(())
    }

    /// Subtract `amount` from HP (clamped at zero), re-derive the phase, and
    /// report one transition per boundary crossed. Terminal once defeated.
    pub fn apply_damage(&mut self, amount: u64) -> EngineResult<DamageOutcome> {
        if self.defeated {
            return Err(EngineError::BossDefeated(self.id));
        }

        let hp_before = self.current_hp;
        let old_phase = self.phase;
        self.current_hp = self.current_hp.saturating_sub(amount);
        let new_phase = Phase::from_hp(self.current_hp, self.base_hp).max(old_phase);

        let mut transitions = Vec::new();
        let mut cursor = old_phase;
        while cursor < new_phase {
            let Some(next) = cursor.next() else { break };
            transitions.push(PhaseTransition {
                from: cursor,
                to: next,
            });
            cursor = next;
        }

        self.phase = new_phase;
        self.version += 1;
        self.attacks_received += 1;

        let defeated_now = self.current_hp == 0;
        if defeated_now {
            self.defeated = true;
        }

        Ok(DamageOutcome {
            hp_before,
            hp_after: self.current_hp,
            applied: hp_before - self.current_hp,
            transitions,
            defeated_now,
        })
    }

    pub fn summary(&self, now: DateTime<Utc>) -> BossSummary {
        BossSummary {
            boss_id: self.id,
            boss_type: self.boss_type,
            tier: self.tier,
            hp: HpSummary {
                current: self.current_hp,
                max: self.base_hp,
                percent: self.hp_percent(),
            },
            phase: self.phase,
            behavior: self.phase.behavior(),
            defense: self.defense,
            shield_multiplier: self.shield_multiplier(),
            abilities: self.abilities.iter().copied().collect(),
            defeated: self.defeated,
            expired: self.is_expired(now),
            expiry_time: self.expiry_time,
            version: self.version,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HpSummary {
    pub current: u64,
    pub max: u64,
    pub percent: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct BossSummary {
    pub boss_id: BossId,
    pub boss_type: BossType,
    pub tier: BossTier,
    pub hp: HpSummary,
    pub phase: Phase,
    pub behavior: &'static str,
    pub defense: f64,
    pub shield_multiplier: f64,
    pub abilities: Vec<AbilityKind>,
    pub defeated: bool,
    pub expired: bool,
    pub expiry_time: DateTime<Utc>,
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boss(base_hp: u64) -> Boss {
        let spawn = BossSpawn {
            boss_type: BossType::EliteGuardian,
            tier: BossTier::Blue,
            base_hp,
            defense: 100.0,
            abilities: BTreeSet::new(),
            expires_in_minutes: 60,
        };
        Boss::spawn(BossId(1), &spawn, Utc::now()).unwrap()
    }

    #[test]
    fn phase_boundaries_belong_to_the_next_phase() {
        assert_eq!(Phase::from_hp(100, 100), Phase::One);
        assert_eq!(Phase::from_hp(76, 100), Phase::One);
        assert_eq!(Phase::from_hp(75, 100), Phase::Two);
        assert_eq!(Phase::from_hp(51, 100), Phase::Two);
        assert_eq!(Phase::from_hp(50, 100), Phase::Three);
        assert_eq!(Phase::from_hp(26, 100), Phase::Three);
        assert_eq!(Phase::from_hp(25, 100), Phase::Four);
        assert_eq!(Phase::from_hp(0, 100), Phase::Four);
    }

    #[test]
    fn damage_clamps_at_zero_and_defeats() {
        let mut boss = boss(1_000);
        let outcome = boss.apply_damage(5_000).unwrap();
        assert_eq!(outcome.applied, 1_000);
        assert_eq!(boss.current_hp, 0);
        assert!(boss.defeated);
        assert!(outcome.defeated_now);
        assert_eq!(boss.phase, Phase::Four);
    }

    #[test]
    fn defeated_boss_is_frozen() {
        let mut boss = boss(10);
        boss.apply_damage(10).unwrap();
        let version = boss.version;
        assert_eq!(boss.apply_damage(1), Err(EngineError::BossDefeated(BossId(1))));
        assert_eq!(boss.current_hp, 0);
        assert_eq!(boss.phase, Phase::Four);
        assert_eq!(boss.version, version);
    }

    #[test]
    fn one_transition_per_boundary_crossed() {
        let mut boss = boss(100_000);
        let outcome = boss.apply_damage(60_000).unwrap();
        assert_eq!(
            outcome.transitions,
            vec![
                PhaseTransition { from: Phase::One, to: Phase::Two },
                PhaseTransition { from: Phase::Two, to: Phase::Three },
            ]
        );
        assert_eq!(boss.phase, Phase::Three);
    }

    #[test]
    fn thirty_percent_hit_enters_phase_two() {
        let mut boss = boss(100_000);
        let outcome = boss.apply_damage(30_000).unwrap();
        assert_eq!(boss.current_hp, 70_000);
        assert_eq!(outcome.transitions.len(), 1);
        assert_eq!(boss.phase, Phase::Two);
    }

    #[test]
    fn zero_damage_still_bumps_version() {
        let mut boss = boss(100);
        let outcome = boss.apply_damage(0).unwrap();
        assert!(outcome.transitions.is_empty());
        assert_eq!(boss.version, 1);
        assert_eq!(boss.current_hp, 100);
    }

    #[test]
    fn spawn_rejects_zero_hp() {
        let spawn = BossSpawn {
            boss_type: BossType::VoidReaver,
            tier: BossTier::Grey,
            base_hp: 0,
            defense: 100.0,
            abilities: BTreeSet::new(),
            expires_in_minutes: 60,
        };
        assert!(matches!(
            Boss::spawn(BossId(2), &spawn, Utc::now()),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn phase_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Phase::Three).unwrap(), "3");
    }
}
