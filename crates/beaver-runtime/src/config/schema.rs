//! Configuration schema definitions.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

use beaver_eventbus::ExecutionOptions;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaverConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Dispatcher settings.
    #[serde(default)]
    pub eventbus: EventBusConfig,

    /// Named task executors available to the dispatcher.
    #[serde(default = "default_executors")]
    pub executors: BTreeMap<String, ExecutorConfig>,
}

impl Default for BeaverConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            eventbus: EventBusConfig::default(),
            executors: default_executors(),
        }
    }
}

fn default_executors() -> BTreeMap<String, ExecutorConfig> {
    BTreeMap::from([(
        ExecutionOptions::DEFAULT_TASK_EXECUTOR.to_string(),
        ExecutorConfig {
            worker_threads: default_worker_threads(),
            thread_name: Some("event-bus".to_string()),
        },
    )])
}

// =============================================================================
// Event Bus
// =============================================================================

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Name of the executor `publish` submits listener tasks to.
    #[serde(default = "default_task_executor")]
    pub task_executor: Option<String>,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            task_executor: default_task_executor(),
        }
    }
}

impl EventBusConfig {
    /// Converts to dispatcher execution options.
    pub fn to_execution_options(&self) -> ExecutionOptions {
        match &self.task_executor {
            Some(name) => ExecutionOptions::new(name.as_str()),
            None => ExecutionOptions::unset(),
        }
    }
}

fn default_task_executor() -> Option<String> {
    Some(ExecutionOptions::DEFAULT_TASK_EXECUTOR.to_string())
}

/// A dedicated executor built at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Number of worker threads.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Worker thread name prefix; defaults to the executor name.
    #[serde(default)]
    pub thread_name: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            thread_name: None,
        }
    }
}

fn default_worker_threads() -> usize {
    4
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
///
/// `Json` requires the `json-log` feature and falls back to `Full` without it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Log file rotation period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

/// Span lifecycle events to log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files to keep.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Per-module levels, e.g. `beaver_eventbus = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            filters: HashMap::new(),
        }
    }
}

fn default_max_files() -> u32 {
    5
}
