//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BeaverConfig, ExecutorConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BeaverConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;

    for (name, executor) in &config.executors {
        validate_executor_config(name, executor)?;
    }

    if config
        .eventbus
        .task_executor
        .as_deref()
        .is_some_and(|name| name.trim().is_empty())
    {
        return Err(ConfigError::missing_field("eventbus.task_executor"));
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.max_files == 0 {
        return Err(ConfigError::validation("logging.max_files must be greater than 0"));
    }

    if let Some(module) = logging.filters.keys().find(|m| m.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid logging filter module: {module:?}"
        )));
    }

    Ok(())
}

/// Validates a single executor.
fn validate_executor_config(name: &str, executor: &ExecutorConfig) -> ConfigResult<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::validation("Executor name cannot be empty"));
    }

    if executor.worker_threads == 0 {
        return Err(ConfigError::validation(format!(
            "Executor '{name}' must have at least one worker thread"
        )));
    }

    if executor
        .thread_name
        .as_deref()
        .is_some_and(|thread_name| thread_name.trim().is_empty())
    {
        return Err(ConfigError::validation(format!(
            "Executor '{name}' has an empty thread name"
        )));
    }

    Ok(())
}
