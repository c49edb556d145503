// crates/test-utils/src/lib.rs

//! Shared fixtures for the `clusterdag` integration tests: stack and command
//! builders, a scripted agent, a store that fails on demand, and tracing and
//! timeout helpers.

pub mod builders;
pub mod flaky_store;
pub mod scripted_agent;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();

/// Route `tracing` output into the test harness capture.
///
/// Filter with `RUST_LOG`, e.g. `RUST_LOG=clusterdag::engine=debug`.
/// Defaults to `warn` so passing runs stay quiet.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, panicking if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F: Future>(f: F) -> F::Output {
    match tokio::time::timeout(TEST_TIMEOUT, f).await {
        Ok(out) => out,
        Err(_) => panic!("test future did not finish within {TEST_TIMEOUT:?}"),
    }
}
