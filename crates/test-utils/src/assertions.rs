//! Polling assertions and tracing setup for tests.

use std::time::Duration;

/// Installs a fmt subscriber honoring `RUST_LOG`, once per process.
///
/// Safe to call from every test; repeat installations are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` every few milliseconds until it returns true or the
/// timeout elapses. Returns whether the condition was ever satisfied.
///
/// For asserting on effects that land asynchronously, such as a
/// fire-and-forget background rebuild updating the shared store.
pub async fn assert_eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
