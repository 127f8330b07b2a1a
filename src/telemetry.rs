//! Log output setup.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber logging at `level` and above.
///
/// `RUST_LOG` takes precedence over `level` when set. Returns `false` if a
/// global subscriber was already installed, in which case nothing changes.
pub fn init_tracing(level: Level) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
