//! Logging setup. `BOSSRAID_LOG` takes an `EnvFilter` directive
//! (e.g. `debug` or `info,bossraid::store=debug`); the default is `info`.
//!
//! Output goes to stderr so command output on stdout stays machine-readable.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

pub const LOG_ENV: &str = "BOSSRAID_LOG";

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::NONE);

    if tracing_subscriber::registry()
        .with(stderr_layer)
        .with(filter)
        .try_init()
        .is_ok()
    {
        tracing::debug!("bossraid logging initialized");
    }
}
