//! Engine error taxonomy. Every failure is detected before any boss or raid
//! state is committed; the server maps [ErrorKind] to a status code at the edge.

use thiserror::Error;

use crate::combat::boss::BossId;
use crate::raid::{RaidId, RaidStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Forbidden,
    Transient,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("roster must contain at least one unit")]
    InvalidRoster,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("boss {0} already defeated")]
    BossDefeated(BossId),

    #[error("boss {0} has expired")]
    BossExpired(BossId),

    #[error("raid {raid} is {status}, not active")]
    RaidNotActive { raid: RaidId, status: RaidStatus },

    #[error("raid {raid} is full ({max} participants)")]
    ParticipantLimit { raid: RaidId, max: u32 },

    #[error("user {user} already joined raid {raid}")]
    AlreadyJoined { raid: RaidId, user: u64 },

    #[error("boss {boss} already has an open raid ({raid})")]
    RaidAlreadyOpen { boss: BossId, raid: RaidId },

    #[error("{0}")]
    Forbidden(String),

    #[error("boss {boss} is busy, gave up after {attempts} lock attempts")]
    Contention { boss: BossId, attempts: u32 },
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn boss_not_found(id: BossId) -> Self {
        Self::NotFound {
            entity: "boss",
            id: id.0,
        }
    }

    pub fn raid_not_found(id: RaidId) -> Self {
        Self::NotFound {
            entity: "raid",
            id: id.0,
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::InvalidRoster => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::BossDefeated(_)
            | Self::BossExpired(_)
            | Self::RaidNotActive { .. }
            | Self::ParticipantLimit { .. }
            | Self::AlreadyJoined { .. }
            | Self::RaidAlreadyOpen { .. } => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Contention { .. } => ErrorKind::Transient,
        }
    }

    pub const fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Forbidden => 403,
            ErrorKind::Transient => 503,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_transport_codes() {
        assert_eq!(EngineError::InvalidRoster.status_code(), 400);
        assert_eq!(EngineError::boss_not_found(BossId(4)).status_code(), 404);
        assert_eq!(EngineError::BossDefeated(BossId(4)).status_code(), 409);
        assert_eq!(EngineError::Forbidden("no".into()).status_code(), 403);
        assert_eq!(
            EngineError::Contention {
                boss: BossId(4),
                attempts: 3
            }
            .status_code(),
            503
        );
    }

    #[test]
    fn messages_are_human_readable() {
        let err = EngineError::ParticipantLimit {
            raid: RaidId(9),
            max: 10,
        };
        assert_eq!(err.to_string(), "raid 9 is full (10 participants)");
    }
}
