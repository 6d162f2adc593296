//! Log sink setup.
//!
//! Every component logs through the `tracing` macros. Installing a
//! subscriber is left to the process; [`init_logging`] is the default one
//! used by harness binaries.

use tracing_subscriber::EnvFilter;

/// Install a formatted `tracing` subscriber filtered by `filter`
/// (e.g. `"info"` or `"autotest_harness=debug"`).
///
/// Returns `false` when a global subscriber was already installed; the
/// existing one is kept.
pub fn init_logging(filter: &str) -> bool {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
