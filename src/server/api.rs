use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::combat::boss::{BossId, BossSpawn, BossSummary, BossTier, BossType};
use crate::combat::power::{Tactic, UnitRoster};
use crate::combat::resolver::Attacker;
use crate::engine::{BossEngine, BossFilter};
use crate::error::EngineError;
use crate::leaderboard::LeaderboardEntry;
use crate::raid::{AllianceRaid, RaidId, RaidRequest, RaidStatus};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request body: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to serialize response: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Parse(_) | Self::BadRequest(_) => 400,
            Self::Engine(err) => err.status_code(),
            Self::Serialize(_) => 500,
        }
    }
}

pub type ApiResult = Result<String, ApiError>;

fn to_json<T: Serialize>(value: &T) -> ApiResult {
    serde_json::to_string_pretty(value).map_err(ApiError::Serialize)
}

fn parse_body<'a, T: Deserialize<'a>>(body: &'a str) -> Result<T, ApiError> {
    let body = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(body).map_err(ApiError::Parse)
}

pub fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        (name.trim() == key).then(|| value.trim())
    })
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse::<T>()
        .map_err(|_| ApiError::BadRequest(format!("invalid {what} '{raw}'")))
}

fn optional_number<T: std::str::FromStr>(query: &str, key: &str) -> Result<Option<T>, ApiError> {
    query_param(query, key)
        .filter(|raw| !raw.is_empty())
        .map(|raw| parse_number(raw, key))
        .transpose()
}

pub fn parse_boss_id(raw: &str) -> Result<BossId, ApiError> {
    parse_number(raw, "boss id").map(BossId)
}

pub fn parse_raid_id(raw: &str) -> Result<RaidId, ApiError> {
    parse_number(raw, "raid id").map(RaidId)
}

pub fn health_payload() -> ApiResult {
    to_json(&serde_json::json!({
        "status": "ok",
        "service": "bossraid-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Clone, Serialize)]
pub struct BossListResponse {
    pub status: &'static str,
    pub count: usize,
    pub bosses: Vec<BossSummary>,
}

pub fn bosses_payload(engine: &BossEngine, query: &str) -> ApiResult {
    let tier = match query_param(query, "tier").filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(
            BossTier::parse(raw).ok_or_else(|| ApiError::BadRequest(format!("unknown tier '{raw}'")))?,
        ),
        None => None,
    };
    let boss_type = match query_param(query, "boss_type").filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(
            BossType::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown boss_type '{raw}'")))?,
        ),
        None => None,
    };
    let include_inactive = matches!(query_param(query, "include_inactive"), Some("1" | "true"));

    let bosses = engine.list_bosses(
        BossFilter {
            tier,
            boss_type,
            include_inactive,
        },
        Utc::now(),
    );
    to_json(&BossListResponse {
        status: "ok",
        count: bosses.len(),
        bosses,
    })
}

pub fn boss_detail_payload(engine: &BossEngine, boss_id: BossId) -> ApiResult {
    to_json(&engine.boss_detail(boss_id, Utc::now())?)
}

/// Body shared by estimate, attack, and raid contribution.
#[derive(Debug, Clone, Deserialize)]
pub struct ArmyRequest {
    pub units: Option<UnitRoster>,
    #[serde(default)]
    pub tactic: Tactic,
}

impl ArmyRequest {
    fn roster(&self) -> Result<UnitRoster, ApiError> {
        self.units
            .ok_or_else(|| ApiError::BadRequest("units required".to_string()))
    }
}

pub fn estimate_payload(engine: &BossEngine, boss_id: BossId, body: &str) -> ApiResult {
    let request: ArmyRequest = parse_body(body)?;
    let roster = request.roster()?;
    to_json(&engine.estimate(boss_id, &roster, request.tactic, Utc::now())?)
}

pub fn attack_payload(engine: &BossEngine, boss_id: BossId, caller: u64, body: &str) -> ApiResult {
    let request: ArmyRequest = parse_body(body)?;
    let attacker = Attacker {
        user_id: caller,
        roster: request.roster()?,
        tactic: request.tactic,
    };
    let attack = engine.attack(boss_id, &attacker, Utc::now())?;
    to_json(attack.as_ref())
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardResponse {
    pub boss_id: BossId,
    pub offset: usize,
    pub entries: Vec<LeaderboardEntry>,
}

pub fn leaderboard_payload(engine: &BossEngine, boss_id: BossId, query: &str) -> ApiResult {
    let limit = optional_number::<usize>(query, "limit")?;
    let offset = optional_number::<usize>(query, "offset")?.unwrap_or(0);
    let entries = engine.leaderboard(boss_id, offset, limit)?;
    to_json(&LeaderboardResponse {
        boss_id,
        offset,
        entries,
    })
}

pub fn boss_attempts_payload(engine: &BossEngine, boss_id: BossId, query: &str) -> ApiResult {
    let limit = optional_number::<usize>(query, "limit")?;
    let attempts = engine.boss_attempts(boss_id, limit)?;
    to_json(&serde_json::json!({ "boss_id": boss_id, "attempts": attempts }))
}

pub fn user_attempts_payload(engine: &BossEngine, caller: u64, query: &str) -> ApiResult {
    let limit = optional_number::<usize>(query, "limit")?;
    let attempts = engine.user_attempts(caller, limit);
    to_json(&serde_json::json!({ "user_id": caller, "attempts": attempts }))
}

#[derive(Debug, Clone, Serialize)]
pub struct RaidListResponse {
    pub alliance_id: u64,
    pub raids: Vec<AllianceRaid>,
}

pub fn raids_payload(engine: &BossEngine, query: &str) -> ApiResult {
    let Some(alliance_id) = optional_number::<u64>(query, "alliance_id")? else {
        return Err(ApiError::BadRequest("alliance_id required".to_string()));
    };
    let status = match query_param(query, "status").filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(
            RaidStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown raid status '{raw}'")))?,
        ),
        None => None,
    };
    to_json(&RaidListResponse {
        alliance_id,
        raids: engine.list_raids(alliance_id, status, Utc::now()),
    })
}

pub fn raid_create_payload(engine: &BossEngine, caller: u64, body: &str) -> ApiResult {
    let request: RaidRequest = parse_body(body)?;
    to_json(&engine.create_raid(caller, &request, Utc::now())?)
}

pub fn raid_detail_payload(engine: &BossEngine, raid_id: RaidId) -> ApiResult {
    to_json(&engine.raid_detail(raid_id, Utc::now())?)
}

pub fn raid_join_payload(engine: &BossEngine, raid_id: RaidId, caller: u64) -> ApiResult {
    to_json(&engine.join_raid(raid_id, caller, Utc::now())?)
}

pub fn raid_start_payload(engine: &BossEngine, raid_id: RaidId, caller: u64) -> ApiResult {
    to_json(&engine.start_raid(raid_id, caller, Utc::now())?)
}

pub fn raid_contribute_payload(engine: &BossEngine, raid_id: RaidId, caller: u64, body: &str) -> ApiResult {
    let request: ArmyRequest = parse_body(body)?;
    let attacker = Attacker {
        user_id: caller,
        roster: request.roster()?,
        tactic: request.tactic,
    };
    to_json(&engine.contribute(raid_id, &attacker, Utc::now())?)
}

pub fn spawn_boss_payload(engine: &BossEngine, caller: u64, body: &str) -> ApiResult {
    let spawn: BossSpawn = parse_body(body)?;
    to_json(&engine.spawn_boss(caller, &spawn, Utc::now())?)
}
