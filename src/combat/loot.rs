use serde::Serialize;

use crate::combat::battle_log::Outcome;
use crate::combat::boss::{BossTier, BossType, Phase};
use crate::combat::rng::Rng;

const CONSOLATION_FRACTION: f64 = 0.25;
const PHASE_BONUS_STEP: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
    Mythic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LootItem {
    pub kind: &'static str,
    pub rarity: Rarity,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Rewards {
    pub gold: u64,
    pub experience: u64,
    pub items: Vec<LootItem>,
}

struct ItemRoll {
    kind: &'static str,
    rarity: Rarity,
    chance: f64,
}

struct TierLoot {
    gold: (u64, u64),
    experience: (u64, u64),
    items: &'static [ItemRoll],
}

const GREY: TierLoot = TierLoot {
    gold: (800, 1_200),
    experience: (80, 120),
    items: &[
        ItemRoll { kind: "resource_pack", rarity: Rarity::Common, chance: 0.5 },
        ItemRoll { kind: "unit_blueprint", rarity: Rarity::Common, chance: 0.3 },
    ],
};

const GREEN: TierLoot = TierLoot {
    gold: (2_000, 3_000),
    experience: (200, 300),
    items: &[
        ItemRoll { kind: "resource_pack", rarity: Rarity::Uncommon, chance: 0.6 },
        ItemRoll { kind: "unit_blueprint", rarity: Rarity::Uncommon, chance: 0.4 },
        ItemRoll { kind: "building_upgrade", rarity: Rarity::Common, chance: 0.35 },
    ],
};

const BLUE: TierLoot = TierLoot {
    gold: (4_500, 5_500),
    experience: (450, 550),
    items: &[
        ItemRoll { kind: "resource_pack", rarity: Rarity::Rare, chance: 0.7 },
        ItemRoll { kind: "unit_blueprint", rarity: Rarity::Rare, chance: 0.5 },
        ItemRoll { kind: "building_upgrade", rarity: Rarity::Uncommon, chance: 0.45 },
        ItemRoll { kind: "artifact_fragment", rarity: Rarity::Rare, chance: 0.25 },
    ],
};

const PURPLE: TierLoot = TierLoot {
    gold: (9_000, 11_000),
    experience: (900, 1_100),
    items: &[
        ItemRoll { kind: "resource_pack", rarity: Rarity::Epic, chance: 0.8 },
        ItemRoll { kind: "unit_blueprint", rarity: Rarity::Epic, chance: 0.6 },
        ItemRoll { kind: "building_upgrade", rarity: Rarity::Rare, chance: 0.55 },
        ItemRoll { kind: "artifact_fragment", rarity: Rarity::Epic, chance: 0.4 },
        ItemRoll { kind: "boss_token", rarity: Rarity::Epic, chance: 0.3 },
    ],
};

const RED: TierLoot = TierLoot {
    gold: (22_000, 28_000),
    experience: (2_200, 2_800),
    items: &[
        ItemRoll { kind: "resource_pack", rarity: Rarity::Legendary, chance: 0.85 },
        ItemRoll { kind: "unit_blueprint", rarity: Rarity::Legendary, chance: 0.7 },
        ItemRoll { kind: "building_upgrade", rarity: Rarity::Epic, chance: 0.65 },
        ItemRoll { kind: "artifact_fragment", rarity: Rarity::Legendary, chance: 0.5 },
        ItemRoll { kind: "boss_token", rarity: Rarity::Legendary, chance: 0.45 },
        ItemRoll { kind: "exclusive_skin", rarity: Rarity::Legendary, chance: 0.15 },
    ],
};

const GOLDEN: TierLoot = TierLoot {
    gold: (90_000, 110_000),
    experience: (9_000, 11_000),
    items: &[
        ItemRoll { kind: "resource_pack", rarity: Rarity::Mythic, chance: 1.0 },
        ItemRoll { kind: "unit_blueprint", rarity: Rarity::Mythic, chance: 0.85 },
        ItemRoll { kind: "building_upgrade", rarity: Rarity::Legendary, chance: 0.75 },
        ItemRoll { kind: "artifact", rarity: Rarity::Mythic, chance: 0.6 },
        ItemRoll { kind: "boss_token", rarity: Rarity::Mythic, chance: 0.55 },
        ItemRoll { kind: "exclusive_skin", rarity: Rarity::Mythic, chance: 0.3 },
        ItemRoll { kind: "title", rarity: Rarity::Mythic, chance: 0.2 },
    ],
};

fn table(tier: BossTier) -> &'static TierLoot {
    match tier {
        BossTier::Grey => &GREY,
        BossTier::Green => &GREEN,
        BossTier::Blue => &BLUE,
        BossTier::Purple => &PURPLE,
        BossTier::Red => &RED,
        BossTier::Golden => &GOLDEN,
    }
}

fn boss_type_bonus(boss_type: BossType) -> LootItem {
    let (kind, rarity) = match boss_type {
        BossType::EliteGuardian => ("defense_rune", Rarity::Rare),
        BossType::AncientTitan => ("strength_rune", Rarity::Rare),
        BossType::VoidReaver => ("speed_rune", Rarity::Rare),
        BossType::CosmicEmperor => ("cosmic_essence", Rarity::Epic),
    };
    LootItem {
        kind,
        rarity,
        quantity: 1,
    }
}

pub fn phase_bonus(phases_reached: Phase) -> f64 {
    1.0 + (u8::from(phases_reached) as f64 - 1.0) * PHASE_BONUS_STEP
}

/// Roll rewards for one resolved attack. Defeats get a fraction of the
/// gold/experience roll and no items.
pub fn roll_rewards(
    tier: BossTier,
    boss_type: BossType,
    phases_reached: Phase,
    outcome: Outcome,
    rng: &mut Rng,
) -> Rewards {
    let loot = table(tier);
    let bonus = phase_bonus(phases_reached);
    let gold = rng.range_u64(loot.gold.0, loot.gold.1) as f64 * bonus;
    let experience = rng.range_u64(loot.experience.0, loot.experience.1) as f64 * bonus;

    if outcome == Outcome::Defeat {
        return Rewards {
            gold: (gold * CONSOLATION_FRACTION).floor() as u64,
            experience: (experience * CONSOLATION_FRACTION).floor() as u64,
            items: Vec::new(),
        };
    }

    let mut items: Vec<LootItem> = loot
        .items
        .iter()
        .filter(|roll| rng.chance(roll.chance))
        .map(|roll| LootItem {
            kind: roll.kind,
            rarity: roll.rarity,
            quantity: if roll.kind == "resource_pack" {
                u32::from(u8::from(phases_reached)) * 2
            } else {
                1
            },
        })
        .collect();
    items.push(boss_type_bonus(boss_type));

    Rewards {
        gold: gold.floor() as u64,
        experience: experience.floor() as u64,
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rolls(tier: BossTier) -> Vec<(&'static str, Rarity, f64)> {
        table(tier)
            .items
            .iter()
            .map(|roll| (roll.kind, roll.rarity, roll.chance))
            .collect()
    }

    #[test]
    fn tier_tables_list_every_item_roll() {
        assert_eq!(
            rolls(BossTier::Grey),
            vec![
                ("resource_pack", Rarity::Common, 0.5),
                ("unit_blueprint", Rarity::Common, 0.3),
            ]
        );
        assert_eq!(
            rolls(BossTier::Green),
            vec![
                ("resource_pack", Rarity::Uncommon, 0.6),
                ("unit_blueprint", Rarity::Uncommon, 0.4),
                ("building_upgrade", Rarity::Common, 0.35),
            ]
        );
        assert_eq!(
            rolls(BossTier::Blue),
            vec![
                ("resource_pack", Rarity::Rare, 0.7),
                ("unit_blueprint", Rarity::Rare, 0.5),
                ("building_upgrade", Rarity::Uncommon, 0.45),
                ("artifact_fragment", Rarity::Rare, 0.25),
            ]
        );
        assert_eq!(
            rolls(BossTier::Purple),
            vec![
                ("resource_pack", Rarity::Epic, 0.8),
                ("unit_blueprint", Rarity::Epic, 0.6),
                ("building_upgrade", Rarity::Rare, 0.55),
                ("artifact_fragment", Rarity::Epic, 0.4),
                ("boss_token", Rarity::Epic, 0.3),
            ]
        );
        assert_eq!(
            rolls(BossTier::Red),
            vec![
                ("resource_pack", Rarity::Legendary, 0.85),
                ("unit_blueprint", Rarity::Legendary, 0.7),
                ("building_upgrade", Rarity::Epic, 0.65),
                ("artifact_fragment", Rarity::Legendary, 0.5),
                ("boss_token", Rarity::Legendary, 0.45),
                ("exclusive_skin", Rarity::Legendary, 0.15),
            ]
        );
        assert_eq!(
            rolls(BossTier::Golden),
            vec![
                ("resource_pack", Rarity::Mythic, 1.0),
                ("unit_blueprint", Rarity::Mythic, 0.85),
                ("building_upgrade", Rarity::Legendary, 0.75),
                ("artifact", Rarity::Mythic, 0.6),
                ("boss_token", Rarity::Mythic, 0.55),
                ("exclusive_skin", Rarity::Mythic, 0.3),
                ("title", Rarity::Mythic, 0.2),
            ]
        );
    }

    #[test]
    fn phase_bonus_grows_by_quarter() {
        assert_eq!(phase_bonus(Phase::One), 1.0);
        assert_eq!(phase_bonus(Phase::Four), 1.75);
    }

    #[test]
    fn defeat_pays_consolation_without_items() {
        let mut rng = Rng::new(9);
        let rewards = roll_rewards(BossTier::Grey, BossType::VoidReaver, Phase::One, Outcome::Defeat, &mut rng);
        assert!(rewards.items.is_empty());
        assert!((200..=300).contains(&rewards.gold));
    }

    #[test]
    fn victory_always_includes_boss_type_bonus() {
        let mut rng = Rng::new(9);
        let rewards = roll_rewards(
            BossTier::Golden,
            BossType::CosmicEmperor,
            Phase::Four,
            Outcome::Victory,
            &mut rng,
        );
        assert!(rewards.items.iter().any(|item| item.kind == "cosmic_essence"));
        assert!(rewards.items.iter().any(|item| item.kind == "resource_pack" && item.quantity == 8));
        assert!(rewards.gold >= 157_500);
    }
}
