use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use bossraid::combat::{Attacker, BossId, BossSpawn, BossTier, BossType, Outcome, Tactic, UnitRoster};
use bossraid::config::EngineConfig;
use bossraid::raid::{Alliance, RaidId, RaidRequest, RaidStatus};
use bossraid::{BossEngine, EngineError};
use chrono::{Duration, Utc};

const ALLIANCE: u64 = 7;
const LEADER: u64 = 1;

fn config() -> EngineConfig {
    EngineConfig {
        alliances: vec![Alliance {
            id: ALLIANCE,
            leaders: vec![LEADER],
            members: (2..=12).collect(),
        }],
        ..EngineConfig::default()
    }
}

fn spawn(base_hp: u64) -> BossSpawn {
    BossSpawn {
        boss_type: BossType::CosmicEmperor,
        tier: BossTier::Golden,
        base_hp,
        defense: 100.0,
        abilities: BTreeSet::new(),
        expires_in_minutes: 60,
    }
}

fn request(boss_id: BossId, min: u32, max: u32) -> RaidRequest {
    RaidRequest {
        boss_id: Some(boss_id),
        alliance_id: Some(ALLIANCE),
        min_participants: Some(min),
        max_participants: Some(max),
    }
}

fn attacker(user_id: u64, roster: UnitRoster) -> Attacker {
    Attacker {
        user_id,
        roster,
        tactic: Tactic::Balanced,
    }
}

/// Create, fill with members 2..=`extra + 1`, and start.
fn active_raid(engine: &BossEngine, boss_id: BossId, extra: u64, max: u32) -> RaidId {
    let raid = engine
        .create_raid(LEADER, &request(boss_id, 1, max), Utc::now())
        .unwrap();
    for user in 2..=extra + 1 {
        engine.join_raid(raid.id, user, Utc::now()).unwrap();
    }
    engine.start_raid(raid.id, LEADER, Utc::now()).unwrap();
    raid.id
}

#[test]
fn leader_gets_forming_raid_and_non_leader_is_forbidden() {
    let engine = BossEngine::new(&config()).unwrap();
    let boss = engine.insert_boss(&spawn(100_000), Utc::now()).unwrap();

    let raid = engine
        .create_raid(LEADER, &request(boss.boss_id, 3, 10), Utc::now())
        .unwrap();
    assert_eq!(raid.status, RaidStatus::Forming);
    assert_eq!(raid.min_participants, 3);
    assert_eq!(raid.max_participants, 10);

    let err = engine
        .create_raid(5, &request(boss.boss_id, 3, 10), Utc::now())
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
}

#[test]
fn defaults_fill_missing_bounds() {
    let engine = BossEngine::new(&config()).unwrap();
    let boss = engine.insert_boss(&spawn(100_000), Utc::now()).unwrap();
    let raid = engine
        .create_raid(
            LEADER,
            &RaidRequest {
                boss_id: Some(boss.boss_id),
                alliance_id: Some(ALLIANCE),
                ..RaidRequest::default()
            },
            Utc::now(),
        )
        .unwrap();
    assert_eq!((raid.min_participants, raid.max_participants), (3, 10));
}

#[test]
fn raid_on_missing_or_defeated_boss_is_rejected() {
    let engine = BossEngine::new(&config()).unwrap();
    let err = engine
        .create_raid(LEADER, &request(BossId(99), 1, 5), Utc::now())
        .unwrap_err();
    assert_eq!(err.status_code(), 404);

    let boss = engine.insert_boss(&spawn(100), Utc::now()).unwrap();
    engine
        .attack(boss.boss_id, &attacker(2, UnitRoster::new(0, 0, 0, 10)), Utc::now())
        .unwrap();
    let err = engine
        .create_raid(LEADER, &request(boss.boss_id, 1, 5), Utc::now())
        .unwrap_err();
    assert_eq!(err, EngineError::BossDefeated(boss.boss_id));
}

#[test]
fn contributions_accumulate_per_participant() {
    let engine = BossEngine::new(&config()).unwrap();
    let boss = engine.insert_boss(&spawn(1_000_000), Utc::now()).unwrap();
    let raid_id = active_raid(&engine, boss.boss_id, 2, 5);

    let roster = UnitRoster::new(100, 0, 0, 0);
    let first = engine.contribute(raid_id, &attacker(2, roster), Utc::now()).unwrap();
    let second = engine.contribute(raid_id, &attacker(2, roster), Utc::now()).unwrap();
    let third = engine.contribute(raid_id, &attacker(3, roster), Utc::now()).unwrap();

    assert_eq!(first.attack.raid_id, Some(raid_id));
    let raid = third.raid;
    let user_two = raid.contributions[&2];
    assert_eq!(user_two.attacks, 2);
    assert_eq!(
        user_two.damage,
        first.attack.damage_dealt + second.attack.damage_dealt
    );
    assert_eq!(
        raid.total_damage,
        raid.contributions.values().map(|c| c.damage).sum::<u64>()
    );

    let detail = engine.raid_detail(raid_id, Utc::now()).unwrap();
    assert_eq!(detail.participants[0].user_id, 2);
    let percent: f64 = detail.participants.iter().map(|p| p.contribution_percent).sum();
    assert!((percent - 100.0).abs() < 0.05, "percentages sum to {percent}");
}

#[test]
fn forming_raid_rejects_contributions() {
    let engine = BossEngine::new(&config()).unwrap();
    let boss = engine.insert_boss(&spawn(100_000), Utc::now()).unwrap();
    let raid = engine
        .create_raid(LEADER, &request(boss.boss_id, 2, 5), Utc::now())
        .unwrap();

    let err = engine
        .contribute(raid.id, &attacker(LEADER, UnitRoster::new(1, 0, 0, 0)), Utc::now())
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::RaidNotActive {
            raid: raid.id,
            status: RaidStatus::Forming
        }
    );
    let detail = engine.boss_detail(boss.boss_id, Utc::now()).unwrap();
    assert_eq!(detail.boss.hp.current, 100_000);
}

#[test]
fn full_raid_turns_away_new_attackers() {
    let engine = BossEngine::new(&config()).unwrap();
    let boss = engine.insert_boss(&spawn(100_000), Utc::now()).unwrap();
    let raid_id = active_raid(&engine, boss.boss_id, 1, 2);

    let err = engine
        .contribute(raid_id, &attacker(9, UnitRoster::new(1, 0, 0, 0)), Utc::now())
        .unwrap_err();
    assert_eq!(err, EngineError::ParticipantLimit { raid: raid_id, max: 2 });
}

#[test]
fn outsiders_cannot_contribute() {
    let engine = BossEngine::new(&config()).unwrap();
    let boss = engine.insert_boss(&spawn(100_000), Utc::now()).unwrap();
    let raid_id = active_raid(&engine, boss.boss_id, 1, 5);

    let err = engine
        .contribute(raid_id, &attacker(500, UnitRoster::new(1, 0, 0, 0)), Utc::now())
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
}

#[test]
fn finishing_blow_completes_raid_and_later_contributions_conflict() {
    let engine = BossEngine::new(&config()).unwrap();
    let boss = engine.insert_boss(&spawn(5_000), Utc::now()).unwrap();
    let raid_id = active_raid(&engine, boss.boss_id, 1, 5);

    let finisher = engine
        .contribute(raid_id, &attacker(2, UnitRoster::new(0, 0, 0, 200)), Utc::now())
        .unwrap();
    assert_eq!(finisher.attack.result, Outcome::Victory);
    assert_eq!(finisher.raid.status, RaidStatus::Completed);
    assert_eq!(finisher.raid.total_damage, 5_000);

    let err = engine
        .contribute(raid_id, &attacker(LEADER, UnitRoster::new(1, 0, 0, 0)), Utc::now())
        .unwrap_err();
    assert_eq!(err.status_code(), 409);

    let history = engine.list_raids(ALLIANCE, Some(RaidStatus::Completed), Utc::now());
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, raid_id);
}

#[test]
fn solo_kill_completes_the_open_raid() {
    let engine = BossEngine::new(&config()).unwrap();
    let boss = engine.insert_boss(&spawn(1_000), Utc::now()).unwrap();
    let raid_id = active_raid(&engine, boss.boss_id, 1, 5);

    engine
        .attack(boss.boss_id, &attacker(42, UnitRoster::new(0, 0, 0, 100)), Utc::now())
        .unwrap();
    let detail = engine.raid_detail(raid_id, Utc::now()).unwrap();
    assert_eq!(detail.raid.status, RaidStatus::Completed);
    assert_eq!(detail.raid.total_damage, 0);
}

#[test]
fn expired_boss_fails_the_raid() {
    let engine = BossEngine::new(&config()).unwrap();
    let spawned_at = Utc::now() - Duration::minutes(30);
    let boss = engine.insert_boss(&spawn(100_000), spawned_at).unwrap();
    let raid_id = active_raid(&engine, boss.boss_id, 1, 5);

    let later = Utc::now() + Duration::hours(1);
    let err = engine
        .contribute(raid_id, &attacker(2, UnitRoster::new(10, 0, 0, 0)), later)
        .unwrap_err();
    assert_eq!(err.status_code(), 409);
    let detail = engine.raid_detail(raid_id, later).unwrap();
    assert_eq!(detail.raid.status, RaidStatus::Failed);
}

#[test]
fn concurrent_raid_and_solo_attacks_conserve_damage() {
    let engine = Arc::new(BossEngine::new(&config()).unwrap());
    let boss = engine.insert_boss(&spawn(400_000), Utc::now()).unwrap();
    let raid_id = active_raid(&engine, boss.boss_id, 9, 10);
    let roster = UnitRoster::new(100, 50, 50, 10);

    thread::scope(|scope| {
        for user in 1..=10u64 {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                for _ in 0..30 {
                    match engine.contribute(raid_id, &attacker(user, roster), Utc::now()) {
                        Ok(_)
                        | Err(EngineError::RaidNotActive { .. })
                        | Err(EngineError::BossDefeated(_))
                        | Err(EngineError::Contention { .. }) => {}
                        Err(err) => panic!("unexpected raid error: {err}"),
                    }
                }
            });
        }
        for user in 100..104u64 {
            let engine = Arc::clone(&engine);
            scope.spawn(move || {
                for _ in 0..30 {
                    match engine.attack(boss.boss_id, &attacker(user, roster), Utc::now()) {
                        Ok(_) | Err(EngineError::BossDefeated(_)) | Err(EngineError::Contention { .. }) => {}
                        Err(err) => panic!("unexpected solo error: {err}"),
                    }
                }
            });
        }
    });

    let detail = engine.raid_detail(raid_id, Utc::now()).unwrap();
    let boss_state = engine.boss_detail(boss.boss_id, Utc::now()).unwrap();
    let raid_sum: u64 = detail.raid.contributions.values().map(|c| c.damage).sum();
    let solo_sum: u64 = (100..104u64)
        .flat_map(|user| engine.user_attempts(user, Some(100)))
        .map(|attempt| attempt.damage_dealt)
        .sum();

    assert_eq!(raid_sum, detail.raid.total_damage);
    assert!(raid_sum <= 400_000);
    assert_eq!(400_000 - boss_state.boss.hp.current, raid_sum + solo_sum);
    assert_eq!(engine.ranked_damage(boss.boss_id), raid_sum + solo_sum);
    assert!(detail.raid.participants.len() <= 10);
    assert!(boss_state.stats.victories <= 1);
}
