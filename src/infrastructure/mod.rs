//! Infrastructure layer module
//!
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - Project setup and component wiring

pub mod config;
pub mod logging;
pub mod setup;

pub use config::{ConfigError, ConfigLoader};
pub use logging::{LogConfig, LoggerImpl};
pub use setup::{build_advisor, build_state_store, init_project, SetupPaths};
