//! Logging infrastructure for forgefs.
//!
//! Console logging through `tracing`, configurable via the `RUST_LOG`
//! environment variable. The mount process runs in the foreground, so there
//! is no file output; operators redirect or let the service manager capture
//! the stream.

use tracing_subscriber::EnvFilter;

/// Initialize the logging system.
///
/// `RUST_LOG` takes precedence when set; otherwise the default level is
/// `info`, or `debug` when `debug` is true.
pub fn init(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
