//! Configuration module for the Beaver runtime.
//!
//! Layered loading with figment, schema types, and validation for logging,
//! dispatcher and executor settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BeaverConfig, EventBusConfig, ExecutorConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, SpanEventConfig,
};
pub use validation::validate_config;
