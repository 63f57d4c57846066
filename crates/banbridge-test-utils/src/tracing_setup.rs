//! Tracing initialisation for tests.
//!
//! The subscriber is installed at most once per process, so every test can
//! call [`init_test_tracing`] first thing.

use tracing_subscriber::EnvFilter;

/// Route tracing output to the test harness, filtered by `RUST_LOG`
/// (default `info`).
///
/// ```ignore
/// #[tokio::test]
/// async fn exchange_is_logged() {
///     banbridge_test_utils::tracing_setup::init_test_tracing();
///     tracing::debug!("visible with RUST_LOG=debug");
/// }
/// ```
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
