//! Beaver Runtime - configuration, logging and wiring for the event bus.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `BeaverConfig`)
//! - Logging configuration (`LoggingBuilder`)
//! - Task executors started from configuration
//! - Runtime assembly (`EventBusRuntime`)
//!
//! ```rust,ignore
//! use beaver_runtime::EventBusRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = EventBusRuntime::builder()
//!         .subscriber(Arc::new(DeviceService::default()))
//!         .build()?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod executors;
pub mod logging;
pub mod runtime;

pub use config::{
    BeaverConfig, ConfigError, ConfigLoader, ConfigResult, EventBusConfig, ExecutorConfig,
    LoggingConfig, Profile,
};
pub use error::{RuntimeError, RuntimeResult};
pub use executors::register_configured_executors;
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{EventBusRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Provides the logging macros, `span`, `instrument` and `Level`.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
