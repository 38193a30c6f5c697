//! Process-wide tracing initialization.

use tracing_subscriber::EnvFilter;

/// Initializes the global subscriber with JSON output at the given level.
///
/// An unrecognized level falls back to `info`. Fails if a subscriber is
/// already installed.
pub fn init(level: &str) -> Result<(), crate::Error> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init()
        .map_err(Into::into)
}
