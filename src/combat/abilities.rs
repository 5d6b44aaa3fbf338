//! Boss ability catalog. A closed set of variants: adding an ability means
//! adding a variant, and every `match` below has to handle it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::combat::battle_log::{AbilityEffect, BattleLogEntry};
use crate::combat::boss::{Boss, Phase, PhaseTransition, ShieldBuff};
use crate::combat::power::{UnitCategory, UnitRoster};
use crate::combat::rng::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityKind {
    ShieldRegeneration,
    AoeBlast,
    UnitDisable,
}

impl AbilityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShieldRegeneration => "shield_regeneration",
            Self::AoeBlast => "aoe_blast",
            Self::UnitDisable => "unit_disable",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "shield_regeneration" => Some(Self::ShieldRegeneration),
            "aoe_blast" => Some(Self::AoeBlast),
            "unit_disable" => Some(Self::UnitDisable),
            _ => None,
        }
    }
}

impl fmt::Display for AbilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AoePolicy {
    /// Per-attack probability, ignored when `every_n_attacks` is set.
    pub chance: f64,
    /// Fire deterministically on every Nth attack the boss receives.
    pub every_n_attacks: Option<u64>,
    pub loss_fraction: f64,
    pub min_phase: Phase,
}

impl Default for AoePolicy {
    fn default() -> Self {
        Self {
            chance: 0.3,
            every_n_attacks: None,
            loss_fraction: 0.1,
            min_phase: Phase::Three,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisablePolicy {
    pub chance: f64,
    pub min_phase: Phase,
}

impl Default for DisablePolicy {
    fn default() -> Self {
        Self {
            chance: 0.3,
            min_phase: Phase::Four,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityPolicy {
    pub shield_multiplier: f64,
    pub aoe_blast: AoePolicy,
    pub unit_disable: DisablePolicy,
}

impl Default for AbilityPolicy {
    fn default() -> Self {
        Self {
            shield_multiplier: 1.5,
            aoe_blast: AoePolicy::default(),
            unit_disable: DisablePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Trigger {
    PhaseTransition(PhaseTransition),
    /// Rolled once per attack, before HP is committed. `attack_number` is the
    /// 1-based count of attacks this boss has received including this one.
    AttackRoll { phase: Phase, attack_number: u64 },
}

/// Per-attack scratch state. Discarded when the resolution ends.
#[derive(Debug, Clone, PartialEq)]
pub struct AttackContext {
    pub sent: UnitRoster,
    pub effective: UnitRoster,
    pub aoe_losses: UnitRoster,
    pub disabled: Option<UnitCategory>,
}

impl AttackContext {
    pub fn new(roster: UnitRoster) -> Self {
        Self {
            sent: roster,
            effective: roster,
            aoe_losses: UnitRoster::default(),
            disabled: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AbilityEngine {
    pub policy: AbilityPolicy,
}

impl AbilityEngine {
    pub fn new(policy: AbilityPolicy) -> Self {
        Self { policy }
    }

    /// Fire every ability the boss owns against `trigger`, in catalog order.
    pub fn fire(
        &self,
        boss: &mut Boss,
        trigger: Trigger,
        ctx: &mut AttackContext,
        rng: &mut Rng,
    ) -> Vec<BattleLogEntry> {
        let owned: Vec<AbilityKind> = boss.abilities.iter().copied().collect();
        let mut log = Vec::new();
        for ability in owned {
            if let Some(entry) = self.apply(ability, boss, trigger, ctx, rng) {
                log.push(entry);
            }
        }
        log
    }

    pub fn apply(
        &self,
        ability: AbilityKind,
        boss: &mut Boss,
        trigger: Trigger,
        ctx: &mut AttackContext,
        rng: &mut Rng,
    ) -> Option<BattleLogEntry> {
        match (ability, trigger) {
            (AbilityKind::ShieldRegeneration, Trigger::PhaseTransition(transition)) => {
                self.shield_regeneration(boss, transition)
            }
            (AbilityKind::AoeBlast, Trigger::AttackRoll { phase, attack_number }) => {
                self.aoe_blast(phase, attack_number, ctx, rng)
            }
            (AbilityKind::UnitDisable, Trigger::AttackRoll { phase, .. }) => {
                self.unit_disable(phase, ctx, rng)
            }
            (AbilityKind::ShieldRegeneration, Trigger::AttackRoll { .. })
            | (AbilityKind::AoeBlast, Trigger::PhaseTransition(_))
            | (AbilityKind::UnitDisable, Trigger::PhaseTransition(_)) => None,
        }
    }

    fn shield_regeneration(&self, boss: &mut Boss, transition: PhaseTransition) -> Option<BattleLogEntry> {
        if transition.to < Phase::Two {
            return None;
        }
        let multiplier = self.policy.shield_multiplier;
        boss.shield = Some(ShieldBuff {
            multiplier,
            granted_in: transition.to,
        });
        Some(BattleLogEntry::AbilityFired {
            ability: AbilityKind::ShieldRegeneration,
            phase: transition.to,
            effect: AbilityEffect::DefenseBuff { multiplier },
            message: format!("The boss regenerates its shields (defense x{multiplier})"),
        })
    }

    fn aoe_blast(
        &self,
        phase: Phase,
        attack_number: u64,
        ctx: &mut AttackContext,
        rng: &mut Rng,
    ) -> Option<BattleLogEntry> {
        let policy = self.policy.aoe_blast;
        if phase < policy.min_phase {
            return None;
        }
        let fires = match policy.every_n_attacks {
            Some(0) => false,
            Some(n) => attack_number % n == 0,
            None => rng.chance(policy.chance),
        };
        if !fires {
            return None;
        }

        let fraction = policy.loss_fraction.clamp(0.0, 1.0);
        let mut losses = UnitRoster::default();
        for (category, count) in ctx.effective.iter() {
            if count > 0 {
                let lost = ((count as f64 * fraction).ceil() as u64).min(count);
                losses.set(category, lost);
            }
        }
        let total = losses.total();
        ctx.effective = ctx.effective.saturating_sub(&losses);
        ctx.aoe_losses = ctx.aoe_losses.saturating_add(&losses);

        Some(BattleLogEntry::AbilityFired {
            ability: AbilityKind::AoeBlast,
            phase,
            effect: AbilityEffect::UnitLosses { losses, total },
            message: format!("AoE blast! {total} units lost"),
        })
    }

    fn unit_disable(&self, phase: Phase, ctx: &mut AttackContext, rng: &mut Rng) -> Option<BattleLogEntry> {
        let policy = self.policy.unit_disable;
        if phase < policy.min_phase || !rng.chance(policy.chance) {
            return None;
        }
        let targets = ctx.effective.present();
        if targets.is_empty() {
            return None;
        }
        let category = targets[rng.index(targets.len())];
        let count = ctx.effective.get(category);
        ctx.disabled = Some(category);

        Some(BattleLogEntry::AbilityFired {
            ability: AbilityKind::UnitDisable,
            phase,
            effect: AbilityEffect::UnitDisabled { category, count },
            message: format!("{count} {category} disabled for this attack"),
        })
    }
}
