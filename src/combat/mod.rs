pub mod abilities;
pub mod battle_log;
pub mod boss;
pub mod estimate;
pub mod loot;
pub mod power;
pub mod resolver;
pub mod rng;

pub use abilities::{
    AbilityEngine, AbilityKind, AbilityPolicy, AoePolicy, AttackContext, DisablePolicy, Trigger,
};
pub use battle_log::{AbilityEffect, BattleLogEntry, Outcome};
pub use boss::{
    Boss, BossId, BossSpawn, BossSummary, BossTier, BossType, DamageOutcome, Phase,
    PhaseTransition, ShieldBuff,
};
pub use estimate::{BattleEstimate, Difficulty, EstimateService};
pub use loot::{roll_rewards, LootItem, Rarity, Rewards};
pub use power::{
    calculate_power, calculate_power_without, PowerScore, Tactic, TacticModifiers, UnitCategory,
    UnitRoster,
};
pub use resolver::{damage_for, power_ratio, AttackResult, Attacker, CombatResolver, CombatTuning};
pub use rng::Rng;
