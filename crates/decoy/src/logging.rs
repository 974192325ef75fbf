//! Opt-in log output for test binaries.
//!
//! The library only emits `tracing` events. Call [`init`] once at the start of
//! a test to see them; `RUST_LOG` takes precedence over the default filter.

use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber filtered to `decoy=info` unless `RUST_LOG` is set.
pub fn init() {
    init_with("decoy=info");
}

/// Like [`init`] with a different default filter. Safe to call repeatedly.
pub fn init_with(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // Another subscriber may already be installed by an earlier test
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

