use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber shared by every binary. `RUST_LOG` overrides
/// the default `info` level. Calling it twice is harmless.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
}
