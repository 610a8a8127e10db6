//! Application configuration using Figment
//!
//! Sources, later ones winning:
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, default `config/pco.toml` if present)
//! 3. Environment variables prefixed with `PCO_DAQ_`, nested with `__`
//!
//! ```bash
//! PCO_DAQ_CAMERA__EXPOSURE=20ms PCO_DAQ_LOGGING__LEVEL=debug pco-capture grab
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use daq_driver_pco::PcoCameraConfig;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::tracing_init::{parse_log_level, OutputFormat};

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config/pco.toml";
/// Prefix of overriding environment variables.
pub const ENV_PREFIX: &str = "PCO_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: PcoCameraConfig,
    pub logging: LoggingConfig,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    pub format: OutputFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: OutputFormat::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, or from [`DEFAULT_CONFIG_PATH`] when it exists, then
    /// apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("config file {} not found", path.display());
                }
                Some(path.to_path_buf())
            }
            None => Some(PathBuf::from(DEFAULT_CONFIG_PATH)).filter(|p| p.exists()),
        };

        let mut figment = Figment::new();
        if let Some(file) = &file {
            figment = figment.merge(Toml::file(file));
        }
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("failed to load configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        parse_log_level(&self.logging.level)?;
        self.camera
            .validate()
            .context("invalid [camera] configuration")?;
        Ok(())
    }
}
