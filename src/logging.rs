//! Logging configuration for sqlsense.
//!
//! Logs go to stderr so stdout stays clean for JSON output from the CLI.

use tracing_subscriber::EnvFilter;

/// Initializes logging to stderr.
///
/// The filter is taken from `RUST_LOG` when set, defaulting to `info`.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
