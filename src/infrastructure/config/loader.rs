use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::services::suggestion_schema::validate_generator_params;

/// Directory holding project configuration and run data.
pub const CONFIG_DIR: &str = ".autopilot";

/// Prefix of environment variable overrides (`AUTOPILOT_OPTIMIZER__MAX_ITERATIONS`).
pub const ENV_PREFIX: &str = "AUTOPILOT_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 2] = ["json", "pretty"];
const VALID_ROTATIONS: [&str; 3] = ["daily", "hourly", "never"];

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid target_score: {0}. Must be between 0 and 1")]
    InvalidTargetScore(f64),

    #[error("Invalid {0}: must be at least 1")]
    ZeroLimit(&'static str),

    #[error("Invalid initial_params: {0}")]
    InvalidInitialParams(String),

    #[error("Invalid advisor timeout_seconds: must be at least 1")]
    InvalidAdvisorTimeout,

    #[error("Invalid advisor temperature: {0}. Must be between 0 and 1")]
    InvalidTemperature(f32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Storage path cannot be empty")]
    EmptyStoragePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. .autopilot/config.yaml
    /// 3. .autopilot/local.yaml (optional overrides)
    /// 4. AUTOPILOT_* environment variables, `__` separating sections
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Same as [`ConfigLoader::load`] with `.autopilot/` resolved under `root`.
    pub fn load_from_dir(root: impl AsRef<Path>) -> Result<Config> {
        let dir = root.as_ref().join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let optimizer = &config.optimizer;

        if !(0.0..=1.0).contains(&optimizer.target_score) {
            return Err(ConfigError::InvalidTargetScore(optimizer.target_score));
        }

        for (name, value) in [
            ("max_iterations", optimizer.max_iterations),
            ("stagnation_limit", optimizer.stagnation_limit),
            ("checkpoint_interval", optimizer.checkpoint_interval),
            ("log_interval", optimizer.log_interval),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroLimit(name));
            }
        }

        if optimizer.candidates_per_iteration == 0 {
            return Err(ConfigError::ZeroLimit("candidates_per_iteration"));
        }

        if optimizer.lease_ttl_seconds == 0 {
            return Err(ConfigError::ZeroLimit("lease_ttl_seconds"));
        }

        validate_generator_params(&config.initial_params)
            .map_err(|e| ConfigError::InvalidInitialParams(e.to_string()))?;

        if config.advisor.timeout_seconds == 0 {
            return Err(ConfigError::InvalidAdvisorTimeout);
        }

        if !(0.0..=1.0).contains(&config.advisor.temperature) {
            return Err(ConfigError::InvalidTemperature(config.advisor.temperature));
        }

        if config.storage.path.trim().is_empty() {
            return Err(ConfigError::EmptyStoragePath);
        }

        if config.storage.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.storage.max_connections));
        }

        if !VALID_LOG_LEVELS.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if !VALID_LOG_FORMATS.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if !VALID_ROTATIONS.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}
