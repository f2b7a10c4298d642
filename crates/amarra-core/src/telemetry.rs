use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber for the coordination layer.
///
/// `RUST_LOG` controls the filter, falling back to `info`. Debug builds
/// emit human-readable lines with targets; release builds emit JSON for
/// log aggregation. Installation is best-effort so embedders (and test
/// binaries) that already installed a subscriber keep theirs.
pub fn init_tracing() {
    init_tracing_with("info")
}

/// Like [`init_tracing`], with an explicit fallback directive applied
/// when `RUST_LOG` is unset.
pub fn init_tracing_with(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if cfg!(debug_assertions) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init();
    }
}
