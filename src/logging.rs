/// Logging initialization: tracing-subscriber::fmt → stderr, filter from
/// `RUST_LOG` when set.
///
/// Called once at the start of `ChatApp::new()`, before anything else.
/// Safe to call again (later calls are no-ops), so tests can construct
/// multiple apps in one process.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "banter_core=debug,info".into()),
        )
        .try_init();
}
