//! Log output setup

use syncstream_core::{SyncError, SyncResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber
///
/// `RUST_LOG` overrides the level picked by `debug`.
pub fn init(debug: bool) -> SyncResult<()> {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(fmt::layer().with_target(false))
        .try_init()
        .map_err(|e| SyncError::InvalidConfiguration(format!("logging: {e}")))
}
