pub mod pool;
pub mod raid_sim;

pub use pool::WorkerPool;
pub use raid_sim::{run_raid_simulation, RaidSimConfig, RaidSimReport};
