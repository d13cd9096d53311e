#![allow(dead_code)]

use tracing_subscriber::EnvFilter;

use std::time::{Duration, Instant};

/// Installs a test-friendly subscriber once per test binary.
///
/// Filtered through `RUST_LOG`, e.g. `RUST_LOG=tandem=trace`.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Spins until `condition` holds, failing the test after five seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);

    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Async flavour of [`wait_until`]; sleeps on the timer driver between
/// checks instead of blocking the worker.
pub async fn wait_until_async(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);

    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tandem::time::sleep(Duration::from_millis(1)).await;
    }
}
