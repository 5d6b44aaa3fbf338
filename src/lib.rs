pub mod cli;
pub mod combat;
pub mod config;
pub mod engine;
pub mod error;
pub mod leaderboard;
pub mod logging;
pub mod parallel;
pub mod raid;
pub mod server;
pub mod store;

pub use engine::BossEngine;
pub use error::{EngineError, EngineResult};
