use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::combat::abilities::AbilityKind;
use crate::combat::boss::{BossSpawn, BossSummary, BossTier, BossType};
use crate::combat::power::{Tactic, UnitRoster};
use crate::combat::resolver::{AttackResult, Attacker};
use crate::config::EngineConfig;
use crate::engine::BossEngine;
use crate::parallel::{run_raid_simulation, RaidSimConfig};
use crate::server;

const USAGE: &str = "usage: bossraid <serve|simulate|estimate|raid-sim>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Serve,
    Simulate,
    Estimate,
    RaidSim,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("serve") => Some(Command::Serve),
        Some("simulate") => Some(Command::Simulate),
        Some("estimate") => Some(Command::Estimate),
        Some("raid-sim") => Some(Command::RaidSim),
        _ => None,
    }
}

pub fn run_with_args(args: &[String]) -> i32 {
    let Some(command) = parse_command(args) else {
        eprintln!("{USAGE}");
        return 2;
    };

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("config error: {err}");
            return 1;
        }
    };

    match command {
        Command::Serve => handle_serve(&config),
        Command::Simulate => handle_simulate(args, &config),
        Command::Estimate => handle_estimate(args, &config),
        Command::RaidSim => handle_raid_sim(args, &config),
    }
}

fn handle_serve(config: &EngineConfig) -> i32 {
    let engine = match BossEngine::new(config) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            eprintln!("failed to start engine: {err}");
            return 1;
        }
    };
    tracing::info!(bosses = config.bosses.len(), alliances = config.alliances.len(), "engine ready");
    match server::run_server(engine, config.bind_addr()) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("server error: {err}");
            1
        }
    }
}

fn demo_boss(base_hp: u64) -> BossSpawn {
    BossSpawn {
        boss_type: BossType::VoidReaver,
        tier: BossTier::Red,
        base_hp,
        defense: 100.0,
        abilities: BTreeSet::from([
            AbilityKind::ShieldRegeneration,
            AbilityKind::AoeBlast,
            AbilityKind::UnitDisable,
        ]),
        expires_in_minutes: 60,
    }
}

fn default_roster() -> UnitRoster {
    UnitRoster::new(200, 100, 100, 20)
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    boss: BossSummary,
    attacks: Vec<Arc<AttackResult>>,
}

/// `simulate [attacks] [base_hp] [tactic] [--table]`: one user attacking a
/// fresh boss with every ability enabled.
fn handle_simulate(args: &[String], config: &EngineConfig) -> i32 {
    let attacks = parse_u32_arg(args.get(2), "attacks", 5);
    let base_hp = parse_u64_arg(args.get(3), "base_hp", 100_000);
    let tactic = parse_tactic_arg(args.get(4));
    let as_table = args.iter().any(|arg| arg == "--table");

    let engine = match BossEngine::new(config) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("failed to build engine: {err}");
            return 1;
        }
    };
    let boss = match engine.insert_boss(&demo_boss(base_hp), Utc::now()) {
        Ok(boss) => boss,
        Err(err) => {
            eprintln!("failed to spawn boss: {err}");
            return 1;
        }
    };

    let attacker = Attacker {
        user_id: 1,
        roster: default_roster(),
        tactic,
    };
    let mut results = Vec::new();
    for _ in 0..attacks {
        match engine.attack(boss.boss_id, &attacker, Utc::now()) {
            Ok(result) => results.push(result),
            // Defeated bosses reject further attacks; that ends the run.
            Err(err) => {
                tracing::debug!(error = %err, "simulation stopped");
                break;
            }
        }
    }

    let final_boss = match engine.boss_detail(boss.boss_id, Utc::now()) {
        Ok(detail) => detail.boss,
        Err(err) => {
            eprintln!("failed to read boss: {err}");
            return 1;
        }
    };

    if as_table {
        println!("attack\tresult\tdamage\tphase\tboss_hp");
        for (index, result) in results.iter().enumerate() {
            println!(
                "{}\t{}\t{}\t{}\t{}",
                index + 1,
                result.result.as_str(),
                result.damage_dealt,
                result.phases_reached,
                result.boss_hp_remaining
            );
        }
        return 0;
    }

    print_json(&SimulationReport {
        boss: final_boss,
        attacks: results,
    })
}

/// `estimate [infantry] [cavalry] [archers] [siege] [tactic]`
fn handle_estimate(args: &[String], config: &EngineConfig) -> i32 {
    let roster = UnitRoster::new(
        parse_u64_arg(args.get(2), "infantry", 200),
        parse_u64_arg(args.get(3), "cavalry", 100),
        parse_u64_arg(args.get(4), "archers", 100),
        parse_u64_arg(args.get(5), "siege", 20),
    );
    let tactic = parse_tactic_arg(args.get(6));

    let engine = match BossEngine::new(config) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("failed to build engine: {err}");
            return 1;
        }
    };
    let estimate = engine
        .insert_boss(&demo_boss(100_000), Utc::now())
        .and_then(|boss| engine.estimate(boss.boss_id, &roster, tactic, Utc::now()));
    match estimate {
        Ok(estimate) => print_json(&estimate),
        Err(err) => {
            eprintln!("estimate failed: {err}");
            1
        }
    }
}

/// `raid-sim [participants] [attacks_per_participant] [workers]`. Exits 1
/// when the damage totals disagree.
fn handle_raid_sim(args: &[String], config: &EngineConfig) -> i32 {
    let sim = RaidSimConfig {
        participants: parse_u32_arg(args.get(2), "participants", 10),
        attacks_per_participant: parse_u32_arg(args.get(3), "attacks", 20),
        workers: parse_u32_arg(args.get(4), "workers", 0) as usize,
        engine: config.clone(),
        ..RaidSimConfig::default()
    };

    match run_raid_simulation(&sim) {
        Ok(report) => {
            let code = print_json(&report);
            if report.damage_conserved {
                code
            } else {
                eprintln!("damage totals disagree");
                1
            }
        }
        Err(err) => {
            eprintln!("raid simulation failed: {err}");
            1
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(payload) => {
            println!("{payload}");
            0
        }
        Err(err) => {
            eprintln!("failed to serialize output: {err}");
            1
        }
    }
}

fn parse_tactic_arg(raw: Option<&String>) -> Tactic {
    match raw.filter(|value| !value.starts_with("--")) {
        Some(value) => Tactic::parse(value).unwrap_or_else(|| {
            eprintln!("invalid tactic '{value}', defaulting to balanced");
            Tactic::Balanced
        }),
        None => Tactic::Balanced,
    }
}

fn parse_u32_arg(raw: Option<&String>, name: &str, default: u32) -> u32 {
    raw.and_then(|value| value.parse::<u32>().ok())
        .unwrap_or_else(|| {
            if let Some(value) = raw {
                eprintln!("invalid {name} '{value}', defaulting to {default}");
            }
            default
        })
}

fn parse_u64_arg(raw: Option<&String>, name: &str, default: u64) -> u64 {
    raw.and_then(|value| value.parse::<u64>().ok())
        .unwrap_or_else(|| {
            if let Some(value) = raw {
                eprintln!("invalid {name} '{value}', defaulting to {default}");
            }
            default
        })
}
