//! Read-only battle preview. Works on a published boss snapshot and never
//! touches the boss lock.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::combat::boss::{Boss, BossSummary, Phase};
use crate::combat::power::{calculate_power, Tactic, TacticModifiers, UnitRoster};
use crate::combat::resolver::{damage_for, power_ratio, CombatTuning};
use crate::error::EngineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Difficulty {
    #[serde(rename = "Manageable")]
    Manageable,
    #[serde(rename = "Challenging")]
    Challenging,
    #[serde(rename = "Difficult")]
    Difficult,
    #[serde(rename = "Very Difficult")]
    VeryDifficult,
    #[serde(rename = "Extremely Difficult")]
    ExtremelyDifficult,
}

impl Difficulty {
    /// Classify by the share of remaining HP one attack would remove.
    pub fn from_coverage(coverage: f64) -> (Self, u8) {
        if coverage >= 1.0 {
            (Self::Manageable, 4)
        } else if coverage >= 0.5 {
            (Self::Challenging, 3)
        } else if coverage >= 0.25 {
            (Self::Difficult, 2)
        } else if coverage >= 0.1 {
            (Self::VeryDifficult, 1)
        } else {
            (Self::ExtremelyDifficult, 1)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleEstimate {
    pub player_power: f64,
    pub defense_power: f64,
    pub boss_power: f64,
    pub power_ratio: f64,
    pub projected_damage: u64,
    pub estimate: Difficulty,
    pub recommended_phases: u8,
    pub current_phase: Phase,
    pub boss_info: BossSummary,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EstimateService {
    pub tactics: TacticModifiers,
    pub tuning: CombatTuning,
}

impl EstimateService {
    pub fn new(tactics: TacticModifiers, tuning: CombatTuning) -> Self {
        Self { tactics, tuning }
    }

    /// Ability rolls are not simulated; the projection is the no-ability case.
    pub fn estimate(
        &self,
        boss: &Boss,
        roster: &UnitRoster,
        tactic: Tactic,
        now: DateTime<Utc>,
    ) -> EngineResult<BattleEstimate> {
        let power = calculate_power(roster, tactic, &self.tactics)?;
        let boss_power = boss.effective_defense();
        let projected_damage =
            damage_for(power.attack_power, boss_power, &self.tuning).min(boss.current_hp);
        let coverage = if boss.current_hp == 0 {
            0.0
        } else {
            projected_damage as f64 / boss.current_hp as f64
        };
        let (estimate, recommended_phases) = Difficulty::from_coverage(coverage);

        Ok(BattleEstimate {
            player_power: power.attack_power,
            defense_power: power.defense_power,
            boss_power,
            power_ratio: power_ratio(power.attack_power, boss_power),
            projected_damage,
            estimate,
            recommended_phases,
            current_phase: boss.phase,
            boss_info: boss.summary(now),
        })
    }
}
