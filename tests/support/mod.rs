use tracing_subscriber::EnvFilter;

/// Initializes the `tracing` subscriber from `RUST_LOG`, once per process.
/// Safe to call multiple times — later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).with_test_writer().try_init();
}
