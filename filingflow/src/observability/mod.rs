//! Tracing setup for pipeline runs.
//!
//! The executor emits structured events (step dispatched / succeeded /
//! failed / skipped, run started / finished) through `tracing`; these
//! helpers install a subscriber for binaries and ad-hoc tooling.
//! Embedders with their own subscriber should skip them.

use tracing_subscriber::EnvFilter;

/// Installs a plain-text subscriber honoring `RUST_LOG`, defaulting to
/// `info`. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Installs a JSON subscriber for log-shipping environments.
pub fn init_tracing_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init();
}
