//! Logging setup

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Sends `tracing` events to stderr, filtered by `RUST_LOG` (default `info`).
///
/// Stdout stays reserved for command output.
pub fn initialize_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    // A second initialization (e.g. in tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
