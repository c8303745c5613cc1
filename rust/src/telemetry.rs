//! Tracing setup for the binary. The library only emits events; installing a
//! subscriber is left to whichever process embeds it.

use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber writing to stderr. `RUST_LOG` wins over the
/// configured level; `info` applies when neither is set. Calling it twice is
/// harmless.
pub fn init_tracing(debug_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(debug_level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
