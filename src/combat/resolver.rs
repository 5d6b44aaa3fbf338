//! Single-attack resolution against a locked boss.
//!
//! The resolver only ever sees a `&mut Boss` owned by the caller's critical
//! section. Every check that can fail runs before `apply_damage`, so an error
//! return leaves nothing to roll back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::combat::abilities::{AbilityEngine, AbilityPolicy, AttackContext, Trigger};
use crate::combat::battle_log::{BattleLogEntry, Outcome};
use crate::combat::boss::{Boss, BossId, Phase};
use crate::combat::loot::{roll_rewards, Rewards};
use crate::combat::power::{
    calculate_power_without, PowerScore, Tactic, TacticModifiers, UnitRoster,
};
use crate::combat::rng::Rng;
use crate::error::{EngineError, EngineResult};
use crate::raid::RaidId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatTuning {
    pub damage_scale: f64,
    /// Minimum damage of an attack with positive attack power.
    pub damage_floor: u64,
    /// Upper bound on the share of each unit category lost to the counterattack.
    pub casualty_rate: f64,
    /// Boss offense grows by this fraction of its defense per phase.
    pub offense_per_phase: f64,
}

impl Default for CombatTuning {
    fn default() -> Self {
        Self {
            damage_scale: 1.0,
            damage_floor: 1,
            casualty_rate: 0.1,
            offense_per_phase: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attacker {
    pub user_id: u64,
    pub roster: UnitRoster,
    pub tactic: Tactic,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttackResult {
    pub attempt_id: Uuid,
    pub boss_id: BossId,
    pub user_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raid_id: Option<RaidId>,
    pub tactic: Tactic,
    pub result: Outcome,
    pub damage_dealt: u64,
    pub phases_reached: Phase,
    pub boss_hp_remaining: u64,
    pub power: PowerScore,
    pub units_sent: UnitRoster,
    pub units_lost: UnitRoster,
    pub units_survived: UnitRoster,
    pub rewards: Rewards,
    pub battle_log: Vec<BattleLogEntry>,
    pub created_at: DateTime<Utc>,
}

/// Damage for one attack before the HP clamp: monotonic in both attack power
/// and the power ratio, saturating as the ratio grows.
pub fn damage_for(attack_power: f64, effective_defense: f64, tuning: &CombatTuning) -> u64 {
    if attack_power.is_nan() || attack_power <= 0.0 {
        return 0;
    }
    let efficiency = if effective_defense > 0.0 {
        let ratio = attack_power / effective_defense;
        ratio / (ratio + 1.0)
    } else {
        1.0
    };
    let raw = (attack_power * tuning.damage_scale.max(0.0) * efficiency).floor() as u64;
    raw.max(tuning.damage_floor)
}

pub fn power_ratio(attack_power: f64, effective_defense: f64) -> f64 {
    if effective_defense > 0.0 {
        attack_power / effective_defense
    } else {
        f64::INFINITY
    }
}

/// The boss's counterattack rating while in `phase`.
pub fn boss_offense(boss: &Boss, phase: Phase, tuning: &CombatTuning) -> f64 {
    let phase_index = u8::from(phase) as f64;
    boss.defense * (1.0 + phase_index * tuning.offense_per_phase) * phase.offense_modifier()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CombatResolver {
    pub tactics: TacticModifiers,
    pub tuning: CombatTuning,
    pub abilities: AbilityEngine,
}

impl CombatResolver {
    pub fn new(tactics: TacticModifiers, tuning: CombatTuning, abilities: AbilityPolicy) -> Self {
        Self {
            tactics,
            tuning,
            abilities: AbilityEngine::new(abilities),
        }
    }

    pub fn resolve_attack(
        &self,
        boss: &mut Boss,
        attacker: &Attacker,
        now: DateTime<Utc>,
    ) -> EngineResult<AttackResult> {
        if attacker.roster.is_empty() {
            return Err(EngineError::InvalidRoster);
        }
        boss.ensure_attackable(now)?;

        let mut rng = Rng::for_attack(boss.id.0, boss.version, attacker.user_id);
        let mut ctx = AttackContext::new(attacker.roster);
        let mut battle_log = Vec::new();
        let start_phase = boss.phase;

        let roll = Trigger::AttackRoll {
            phase: start_phase,
            attack_number: boss.attacks_received + 1,
        };
        battle_log.extend(self.abilities.fire(boss, roll, &mut ctx, &mut rng));

        // AoE losses and disabled units are settled here, ahead of the HP commit.
        let power = if ctx.effective.is_empty() {
            PowerScore {
                attack_power: 0.0,
                defense_power: 0.0,
            }
        } else {
            calculate_power_without(&ctx.effective, attacker.tactic, &self.tactics, ctx.disabled)?
        };
        let effective_defense = boss.effective_defense();
        let ratio = power_ratio(power.attack_power, effective_defense);
        let damage = damage_for(power.attack_power, effective_defense, &self.tuning).min(boss.current_hp);

        let committed = boss.apply_damage(damage)?;
        for transition in &committed.transitions {
            battle_log.push(BattleLogEntry::entered(transition.to));
            battle_log.extend(self.abilities.fire(
                boss,
                Trigger::PhaseTransition(*transition),
                &mut ctx,
                &mut rng,
            ));
        }

        let casualties = self.casualties(boss, start_phase, &ctx, power.defense_power);
        let units_lost = ctx.aoe_losses.saturating_add(&casualties);
        let units_survived = attacker.roster.saturating_sub(&units_lost);

        battle_log.push(BattleLogEntry::DamageExchanged {
            attack_power: power.attack_power,
            effective_defense,
            power_ratio: ratio,
            damage_dealt: committed.applied,
            boss_hp: committed.hp_after,
            units_lost: units_lost.total(),
        });

        let result = if committed.defeated_now {
            boss.defeated_by = Some(attacker.user_id);
            boss.defeated_at = Some(now);
            Outcome::Victory
        } else {
            Outcome::Defeat
        };
        battle_log.push(BattleLogEntry::Outcome { result });

        let rewards = roll_rewards(boss.tier, boss.boss_type, boss.phase, result, &mut rng);

        debug!(
            boss_id = boss.id.0,
            user_id = attacker.user_id,
            damage = committed.applied,
            hp = committed.hp_after,
            phase = %boss.phase,
            version = boss.version,
            "attack resolved"
        );

        Ok(AttackResult {
            attempt_id: Uuid::new_v4(),
            boss_id: boss.id,
            user_id: attacker.user_id,
            raid_id: None,
            tactic: attacker.tactic,
            result,
            damage_dealt: committed.applied,
            phases_reached: boss.phase,
            boss_hp_remaining: committed.hp_after,
            power,
            units_sent: attacker.roster,
            units_lost,
            units_survived,
            rewards,
            battle_log,
            created_at: now,
        })
    }

    /// Reported losses only; troop bookkeeping belongs to the caller.
    fn casualties(&self, boss: &Boss, phase: Phase, ctx: &AttackContext, defense_power: f64) -> UnitRoster {
        let offense = boss_offense(boss, phase, &self.tuning);
        let defense_ratio = if offense > 0.0 {
            defense_power / offense
        } else {
            f64::INFINITY
        };
        let fraction = (self.tuning.casualty_rate / (1.0 + defense_ratio)).clamp(0.0, 1.0);

        let mut losses = UnitRoster::default();
        for (category, count) in ctx.effective.iter() {
            if count > 0 && fraction > 0.0 {
                losses.set(category, ((count as f64 * fraction).ceil() as u64).min(count));
            }
        }
        losses
    }
}
