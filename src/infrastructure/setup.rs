//! Project setup and component wiring
//!
//! Handles:
//! - Configuration directory and default config file creation
//! - Building the configured state store (migrations included)
//! - Building the configured advisor

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::advisory::{AnthropicApiConfig, AnthropicBackend, ClaudeCodeBackend};
use crate::adapters::filesystem::FileStateStore;
use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig, SqliteStateStore};
use crate::domain::models::{AdvisorBackendKind, AdvisorConfig, StorageBackend, StorageConfig};
use crate::domain::ports::{Advisor, AdvisoryBackend, NullAdvisor, StateStore};
use crate::services::{LlmAdvisor, LlmAdvisorConfig};

use super::config::CONFIG_DIR;

/// Default configuration template content
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Schedule autopilot configuration
# Override settings by editing this file, adding .autopilot/local.yaml, or
# setting environment variables with the AUTOPILOT_ prefix
#
# Example environment variables:
#   export AUTOPILOT_OPTIMIZER__MAX_ITERATIONS=500
#   export AUTOPILOT_ADVISOR__ENABLED=true
#   export AUTOPILOT_LOGGING__LEVEL=debug

optimizer:
  # Hard cap on iterations per run
  max_iterations: 200
  # Stop once the best score reaches this value (0-1)
  target_score: 0.95
  # Stop after this many iterations without improvement
  stagnation_limit: 20
  # Wall-clock budget per session in seconds (unset = unlimited)
  # time_limit_seconds: 3600
  # Candidates generated and evaluated per iteration
  candidates_per_iteration: 3
  # Save run state every N iterations
  checkpoint_interval: 5
  # Progress log every N iterations
  log_interval: 10
  # Recent iterations shown to the adapter and advisor
  history_window: 10
  # Consult the advisor every N iterations
  advisor_interval: 1
  # Seconds before an unrenewed run lease counts as abandoned
  lease_ttl_seconds: 1800

# Parameters for the first iteration of a new run
initial_params:
  # greedy, cp_sat, pulp, hybrid
  algorithm: greedy
  timeout_seconds: 60
  diversification_factor: 0.0
  constraint_weights: {}

advisor:
  enabled: false
  # anthropic or claude_code
  backend: anthropic
  model: "claude-sonnet-4-5-20250929"
  max_tokens: 1024
  temperature: 0.2
  timeout_seconds: 30
  # api_key falls back to ANTHROPIC_API_KEY
  base_url: "https://api.anthropic.com"

storage:
  # sqlite or filesystem
  backend: sqlite
  # SQLite database file, or run directory for the filesystem backend
  path: ".autopilot/runs.db"
  max_connections: 5

logging:
  # trace, debug, info, warn, error
  level: "info"
  # json or pretty
  format: "json"
  # daily, hourly or never (used when log_dir is set)
  rotation: "daily"
"#;

/// Setup paths and directories
pub struct SetupPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
}

impl SetupPaths {
    /// Paths under `root`.
    pub fn in_dir(root: impl AsRef<Path>) -> Self {
        let config_dir = root.as_ref().join(CONFIG_DIR);
        Self {
            config_file: config_dir.join("config.yaml"),
            config_dir,
        }
    }

    /// Paths for the current directory.
    pub fn new() -> Result<Self> {
        let current_dir = std::env::current_dir().context("Failed to get current directory")?;
        Ok(Self::in_dir(current_dir))
    }

    pub fn is_initialized(&self) -> bool {
        self.config_file.exists()
    }
}

/// Create the configuration directory and default config file.
///
/// An existing config file is kept unless `force` is set.
pub fn init_project(paths: &SetupPaths, force: bool) -> Result<()> {
    fs::create_dir_all(&paths.config_dir).context("Failed to create config directory")?;

    if paths.config_file.exists() && !force {
        return Ok(());
    }

    fs::write(&paths.config_file, DEFAULT_CONFIG_TEMPLATE).context("Failed to write config file")?;
    Ok(())
}

/// Build the configured state store, running migrations for SQLite.
pub async fn build_state_store(config: &StorageConfig) -> Result<Arc<dyn StateStore>> {
    match config.backend {
        StorageBackend::Sqlite => {
            let url = database_url(Path::new(&config.path));
            let pool = initialize_database(&url, &PoolConfig::from(config))
                .await
                .with_context(|| format!("Failed to open run database at {}", config.path))?;
            Ok(Arc::new(SqliteStateStore::new(pool)))
        }
        StorageBackend::Filesystem => {
            fs::create_dir_all(&config.path)
                .with_context(|| format!("Failed to create run directory {}", config.path))?;
            Ok(Arc::new(FileStateStore::new(&config.path)))
        }
    }
}

/// Build the configured advisor; [`NullAdvisor`] when advice is disabled.
pub fn build_advisor(config: &AdvisorConfig, history_window: usize) -> Result<Arc<dyn Advisor>> {
    if !config.enabled {
        return Ok(Arc::new(NullAdvisor));
    }

    let backend: Arc<dyn AdvisoryBackend> = match config.backend {
        AdvisorBackendKind::Anthropic => Arc::new(
            AnthropicBackend::new(AnthropicApiConfig::from(config))
                .context("Failed to create Anthropic backend")?,
        ),
        AdvisorBackendKind::ClaudeCode => Arc::new(ClaudeCodeBackend::new(
            config.claude_code_path.as_deref().unwrap_or("claude"),
        )),
    };

    let advisor_config = LlmAdvisorConfig::from(config).with_history_window(history_window);
    Ok(Arc::new(LlmAdvisor::new(backend, advisor_config)))
}
