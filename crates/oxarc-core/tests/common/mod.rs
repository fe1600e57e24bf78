//! Shared setup for the integration suites.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT_TRACING: Once = Once::new();

/// Install the test tracing subscriber at most once per test process.
/// `RUST_LOG` controls verbosity; output routes through the test writer so
/// it interleaves with captured test output.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}
