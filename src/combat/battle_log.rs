use serde::Serialize;

use crate::combat::abilities::AbilityKind;
use crate::combat::boss::Phase;
use crate::combat::power::{UnitCategory, UnitRoster};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Victory,
    Defeat,
}

impl Outcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Victory => "victory",
            Self::Defeat => "defeat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbilityEffect {
    DefenseBuff { multiplier: f64 },
    UnitLosses { losses: UnitRoster, total: u64 },
    UnitDisabled { category: UnitCategory, count: u64 },
}

/// One ordered line of a resolved attack.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BattleLogEntry {
    PhaseEntered {
        phase: Phase,
        behavior: &'static str,
        message: &'static str,
    },
    AbilityFired {
        ability: AbilityKind,
        phase: Phase,
        effect: AbilityEffect,
        message: String,
    },
    DamageExchanged {
        attack_power: f64,
        effective_defense: f64,
        power_ratio: f64,
        damage_dealt: u64,
        boss_hp: u64,
        units_lost: u64,
    },
    Outcome {
        result: Outcome,
    },
}

impl BattleLogEntry {
    pub fn entered(phase: Phase) -> Self {
        Self::PhaseEntered {
            phase,
            behavior: phase.behavior(),
            message: phase.entry_message(),
        }
    }

    pub fn ability(&self) -> Option<AbilityKind> {
        match self {
            Self::AbilityFired { ability, .. } => Some(*ability),
            _ => None,
        }
    }

    pub fn entered_phase(&self) -> Option<Phase> {
        match self {
            Self::PhaseEntered { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}
