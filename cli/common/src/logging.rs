//! Logging initialization.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::fmt;

use crate::LogLevel;

/// Install the global fmt subscriber at `level`.
///
/// Logs go to stderr; stdout belongs to handler output such as the stdout
/// object handler's JSON lines.
pub fn init_logging(level: LogLevel) -> Result<()> {
    let level: Level = level.into();

    fmt::Subscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
