use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitCategory {
    Infantry,
    Cavalry,
    Archers,
    Siege,
}

impl UnitCategory {
    pub const ALL: [UnitCategory; 4] = [
        UnitCategory::Infantry,
        UnitCategory::Cavalry,
        UnitCategory::Archers,
        UnitCategory::Siege,
    ];

    /// Per-unit (attack, defense) coefficients.
    pub const fn coefficients(self) -> (f64, f64) {
        match self {
            Self::Infantry => (10.0, 8.0),
            Self::Cavalry => (25.0, 20.0),
            Self::Archers => (30.0, 10.0),
            Self::Siege => (60.0, 15.0),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Infantry => "infantry",
            Self::Cavalry => "cavalry",
            Self::Archers => "archers",
            Self::Siege => "siege",
        }
    }
}

impl fmt::Display for UnitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quantities per unit category, supplied by the caller for one attack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitRoster {
    pub infantry: u64,
    pub cavalry: u64,
    pub archers: u64,
    pub siege: u64,
}

impl UnitRoster {
    pub fn new(infantry: u64, cavalry: u64, archers: u64, siege: u64) -> Self {
        Self {
            infantry,
            cavalry,
            archers,
            siege,
        }
    }

    pub const fn get(&self, category: UnitCategory) -> u64 {
        match category {
            UnitCategory::Infantry => self.infantry,
            UnitCategory::Cavalry => self.cavalry,
            UnitCategory::Archers => self.archers,
            UnitCategory::Siege => self.siege,
        }
    }

    pub fn set(&mut self, category: UnitCategory, quantity: u64) {
        match category {
            UnitCategory::Infantry => self.infantry = quantity,
            UnitCategory::Cavalry => self.cavalry = quantity,
            UnitCategory::Archers => self.archers = quantity,
            UnitCategory::Siege => self.siege = quantity,
        }
    }

    pub fn total(&self) -> u64 {
        UnitCategory::ALL.iter().map(|c| self.get(*c)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (UnitCategory, u64)> + '_ {
        UnitCategory::ALL.iter().map(move |c| (*c, self.get(*c)))
    }

    /// Categories with at least one unit, in declaration order.
    pub fn present(&self) -> Vec<UnitCategory> {
        self.iter()
            .filter(|(_, count)| *count > 0)
            .map(|(category, _)| category)
            .collect()
    }

    pub fn saturating_sub(&self, other: &UnitRoster) -> UnitRoster {
        let mut out = *self;
        for category in UnitCategory::ALL {
            out.set(category, self.get(category).saturating_sub(other.get(category)));
        }
        out
    }

    pub fn saturating_add(&self, other: &UnitRoster) -> UnitRoster {
        let mut out = *self;
        for category in UnitCategory::ALL {
            out.set(category, self.get(category).saturating_add(other.get(category)));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tactic {
    #[default]
    Balanced,
    Aggressive,
    Defensive,
}

impl Tactic {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "balanced" => Some(Self::Balanced),
            "aggressive" => Some(Self::Aggressive),
            "defensive" => Some(Self::Defensive),
            _ => None,
        }
    }
}

/// Attack/defense factors for the non-neutral tactics. Defensive mirrors aggressive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TacticModifiers {
    pub aggressive_attack: f64,
    pub aggressive_defense: f64,
    pub defensive_attack: f64,
    pub defensive_defense: f64,
}

impl Default for TacticModifiers {
    fn default() -> Self {
        Self {
            aggressive_attack: 1.3,
            aggressive_defense: 0.7,
            defensive_attack: 0.7,
            defensive_defense: 1.3,
        }
    }
}

impl TacticModifiers {
    /// Aggressive must trade defense for attack and defensive the reverse.
    pub fn validate(&self) -> Result<(), String> {
        let checks = [
            ("aggressive_attack", self.aggressive_attack, true),
            ("aggressive_defense", self.aggressive_defense, false),
            ("defensive_attack", self.defensive_attack, false),
            ("defensive_defense", self.defensive_defense, true),
        ];
        for (name, value, boosts) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("tactics.{name} must be a non-negative number, got {value}"));
            }
            if boosts && value <= 1.0 {
                return Err(format!("tactics.{name} must be above 1.0, got {value}"));
            }
            if !boosts && value >= 1.0 {
                return Err(format!("tactics.{name} must be below 1.0, got {value}"));
            }
        }
        Ok(())
    }

    pub fn factors(&self, tactic: Tactic) -> (f64, f64) {
        match tactic {
            Tactic::Balanced => (1.0, 1.0),
            Tactic::Aggressive => (self.aggressive_attack, self.aggressive_defense),
            Tactic::Defensive => (self.defensive_attack, self.defensive_defense),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerScore {
    pub attack_power: f64,
    pub defense_power: f64,
}

/// Convert a roster and tactic into attack/defense power.
pub fn calculate_power(
    roster: &UnitRoster,
    tactic: Tactic,
    modifiers: &TacticModifiers,
) -> EngineResult<PowerScore> {
    calculate_power_without(roster, tactic, modifiers, None)
}

/// Same as [calculate_power], but `disabled` contributes nothing to attack power.
/// Defense still counts the disabled units.
pub fn calculate_power_without(
    roster: &UnitRoster,
    tactic: Tactic,
    modifiers: &TacticModifiers,
    disabled: Option<UnitCategory>,
) -> EngineResult<PowerScore> {
    if roster.is_empty() {
        return Err(EngineError::InvalidRoster);
    }

    let (attack_factor, defense_factor) = modifiers.factors(tactic);
    let mut attack = 0.0;
    let mut defense = 0.0;
    for (category, count) in roster.iter() {
        let (unit_attack, unit_defense) = category.coefficients();
        if Some(category) != disabled {
            attack += unit_attack * count as f64;
        }
        defense += unit_defense * count as f64;
    }

    Ok(PowerScore {
        attack_power: (attack * attack_factor).max(0.0),
        defense_power: (defense * defense_factor).max(0.0),
    })
}
