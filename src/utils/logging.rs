//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Default filter used when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "mintinghub=info";

/// Install a global `fmt` subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once; only the first call installs a subscriber.
/// Returns true if this call installed it.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Same as [`init_tracing`] but writes through the test harness capture
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mintinghub=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
