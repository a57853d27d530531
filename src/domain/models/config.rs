use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::params::GeneratorParams;

/// Main configuration structure for the autopilot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Search loop limits and cadences
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Parameters used for the first iteration of a fresh run
    #[serde(default)]
    pub initial_params: GeneratorParams,

    /// Advisory backend configuration
    #[serde(default)]
    pub advisor: AdvisorConfig,

    /// Run state persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limits and cadences of the optimization loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OptimizerConfig {
    /// Hard cap on iterations per run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Score in [0, 1] at which the run is considered done
    #[serde(default = "default_target_score")]
    pub target_score: f64,

    /// Iterations without improvement before giving up
    #[serde(default = "default_stagnation_limit")]
    pub stagnation_limit: u32,

    /// Wall-clock limit for one loop session, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_seconds: Option<u64>,

    /// Candidates requested from the generator per iteration
    #[serde(default = "default_candidates_per_iteration")]
    pub candidates_per_iteration: usize,

    /// Save a checkpoint every N iterations
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u32,

    /// Write a progress line to the run log every N iterations
    #[serde(default = "default_log_interval")]
    pub log_interval: u32,

    /// Number of recent iteration records handed to the adapter and advisor
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Consult the advisor every N iterations
    #[serde(default = "default_advisor_interval")]
    pub advisor_interval: u32,

    /// Seconds a run's write lease stays valid without renewal. The loop
    /// renews it every iteration; an expired lease can be taken over.
    #[serde(default = "default_lease_ttl_seconds")]
    pub lease_ttl_seconds: u64,
}

const fn default_max_iterations() -> u32 {
    200
}

const fn default_target_score() -> f64 {
    0.95
}

const fn default_stagnation_limit() -> u32 {
    20
}

const fn default_candidates_per_iteration() -> usize {
    3
}

const fn default_checkpoint_interval() -> u32 {
    5
}

const fn default_log_interval() -> u32 {
    10
}

const fn default_history_window() -> usize {
    10
}

const fn default_advisor_interval() -> u32 {
    1
}

const fn default_lease_ttl_seconds() -> u64 {
    1800
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            target_score: default_target_score(),
            stagnation_limit: default_stagnation_limit(),
            time_limit_seconds: None,
            candidates_per_iteration: default_candidates_per_iteration(),
            checkpoint_interval: default_checkpoint_interval(),
            log_interval: default_log_interval(),
            history_window: default_history_window(),
            advisor_interval: default_advisor_interval(),
            lease_ttl_seconds: default_lease_ttl_seconds(),
        }
    }
}

/// Which advisory backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisorBackendKind {
    /// Anthropic Messages API over HTTPS
    Anthropic,
    /// Local `claude` CLI in print mode
    ClaudeCode,
}

/// Advisory backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AdvisorConfig {
    /// Whether the loop consults an advisor at all
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_advisor_backend")]
    pub backend: AdvisorBackendKind,

    /// Model identifier sent with every request
    #[serde(default = "default_advisor_model")]
    pub model: String,

    #[serde(default = "default_advisor_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature (0.0-1.0)
    #[serde(default = "default_advisor_temperature")]
    pub temperature: f32,

    /// Upper bound on a single backend call, in seconds
    #[serde(default = "default_advisor_timeout")]
    pub timeout_seconds: u64,

    /// API key (can also be set via ANTHROPIC_API_KEY env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL for API (for testing/proxies)
    #[serde(default = "default_advisor_base_url")]
    pub base_url: String,

    /// Path to claude CLI executable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_code_path: Option<String>,
}

const fn default_advisor_backend() -> AdvisorBackendKind {
    AdvisorBackendKind::Anthropic
}

fn default_advisor_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

const fn default_advisor_max_tokens() -> u32 {
    1024
}

const fn default_advisor_temperature() -> f32 {
    0.2
}

const fn default_advisor_timeout() -> u64 {
    30
}

fn default_advisor_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: default_advisor_backend(),
            model: default_advisor_model(),
            max_tokens: default_advisor_max_tokens(),
            temperature: default_advisor_temperature(),
            timeout_seconds: default_advisor_timeout(),
            api_key: None,
            base_url: default_advisor_base_url(),
            claude_code_path: None,
        }
    }
}

/// Run state storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Sqlite,
    Filesystem,
}

/// Run state persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    /// `SQLite` database file, or the root directory for the filesystem store
    #[serde(default = "default_storage_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

const fn default_storage_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_storage_path() -> String {
    ".autopilot/runs.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: default_storage_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
