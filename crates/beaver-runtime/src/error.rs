//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use beaver_eventbus::ConfigurationError;

/// Errors that can occur while assembling or running the event bus.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A subscriber or interceptor was rejected at registration.
    #[error("Event bus configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A configured executor failed to start.
    #[error("Failed to start executor '{name}': {source}")]
    Executor {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
