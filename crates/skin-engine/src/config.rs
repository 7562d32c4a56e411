//! Engine configuration

use std::path::Path;

use capture_session::CaptureConfig;
use config::{Config, ConfigError, Environment, File};
use model_manager::ModelConfig;
use serde::{Deserialize, Serialize};

/// Environment variable prefix, e.g. `SKIN_ENGINE__CAPTURE__FRAME_TIMEOUT_MS`
pub const ENV_PREFIX: &str = "SKIN_ENGINE";

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Maximum level: trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub models: ModelConfig,
    pub capture: CaptureConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Layer defaults, an optional config file and environment overrides
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&EngineConfig::default())?);
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
