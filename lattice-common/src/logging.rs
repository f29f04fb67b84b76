use tracing_subscriber::EnvFilter;

/// Initializes a best-effort `tracing` subscriber for unit/integration tests.
/// Mirrors the teacher pattern of a fallible, idempotent test-only init: it
/// is safe to call from every test that wants log output, and a second call
/// from another test in the same binary is simply ignored.
pub fn init_tracing_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
