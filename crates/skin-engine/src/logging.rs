//! Logging setup

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::{EngineError, LoggingConfig};

/// Install the global tracing subscriber. Logs go to stderr so stdout stays
/// machine-readable.
pub fn init_logging(config: &LoggingConfig) -> Result<(), EngineError> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| EngineError::Logging(format!("invalid log level {:?}", config.level)))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.map_err(|e| EngineError::Logging(e.to_string()))
}
