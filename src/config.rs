//! Engine configuration. Every field has a default, so an empty (or absent)
//! YAML file yields a working engine with no bosses and no alliances.
//!
//! ```yaml
//! bind_addr: 0.0.0.0:3000
//! abilities:
//!   aoe_blast: { every_n_attacks: 5 }
//! alliances:
//!   - { id: 7, leaders: [1], members: [2, 3, 4] }
//! admins: [1]
//! bosses:
//!   - { boss_type: void_reaver, tier: red, base_hp: 500000, abilities: [aoe_blast] }
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::combat::abilities::AbilityPolicy;
use crate::combat::boss::BossSpawn;
use crate::combat::power::TacticModifiers;
use crate::combat::resolver::CombatTuning;
use crate::leaderboard::LeaderboardLimits;
use crate::raid::{Alliance, RaidDefaults};
use crate::store::LockPolicy;

pub const CONFIG_ENV: &str = "BOSSRAID_CONFIG";
pub const BIND_ENV: &str = "BOSSRAID_BIND";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bind_addr: Option<String>,
    pub tactics: TacticModifiers,
    pub combat: CombatTuning,
    pub abilities: AbilityPolicy,
    pub locking: LockPolicy,
    pub raids: RaidDefaults,
    pub leaderboard: LeaderboardLimits,
    pub alliances: Vec<Alliance>,
    pub admins: Vec<u64>,
    pub bosses: Vec<BossSpawn>,
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Reject settings that parse but cannot drive combat.
    pub fn validate(&self) -> Result<(), String> {
        self.tactics.validate()
    }

    /// Load the file named by `BOSSRAID_CONFIG` (defaults when unset) and
    /// apply the `BOSSRAID_BIND` override.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(path)?,
            _ => Self::default(),
        };
        if let Ok(bind) = env::var(BIND_ENV) {
            config.bind_addr = Some(bind);
        }
        Ok(config)
    }

    pub fn bind_addr(&self) -> &str {
        self.bind_addr.as_deref().unwrap_or(DEFAULT_BIND_ADDR)
    }
}
