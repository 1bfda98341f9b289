//! Event bus runtime wiring.
//!
//! [`EventBusRuntime`] turns a [`BeaverConfig`] into a ready dispatcher:
//! logging is initialized, configured executors are started, the interceptor
//! chain is built and every subscriber runs its registration pass.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use beaver_runtime::EventBusRuntime;
//!
//! let runtime = EventBusRuntime::builder()
//!     .config_file("config/beaver.toml")
//!     .interceptor::<DeviceEvent, _>(AuditInterceptor)
//!     .subscriber(Arc::new(DeviceService::default()))
//!     .build()?;
//!
//! runtime.dispatcher().publish(BoxedEvent::new(event))?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use beaver_core::Event;
use beaver_eventbus::{
    ConfigurationError, DynEventInterceptor, EventBusDispatcher, EventInterceptor,
    EventSubscriber, ExecutorRegistry, InstrumentedInterceptor, InterceptorChainBuilder,
    PayloadAdapter, TaskExecutor, interceptor,
};

use crate::config::{BeaverConfig, ConfigError, ConfigLoader, validate_config};
use crate::error::RuntimeResult;
use crate::executors::register_configured_executors;
use crate::logging;

type Registration =
    Box<dyn FnOnce(&EventBusDispatcher) -> Result<usize, ConfigurationError> + Send>;

/// A configured event bus with its executors.
///
/// Dropping the runtime shuts its dedicated executors down.
pub struct EventBusRuntime {
    config: BeaverConfig,
    dispatcher: Arc<EventBusDispatcher>,
    executors: Arc<ExecutorRegistry>,
    shutdown: CancellationToken,
}

impl EventBusRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    pub fn from_config(config: BeaverConfig) -> RuntimeResult<Self> {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &BeaverConfig {
        &self.config
    }

    /// Returns the shared dispatcher.
    pub fn dispatcher(&self) -> &Arc<EventBusDispatcher> {
        &self.dispatcher
    }

    pub fn executors(&self) -> &Arc<ExecutorRegistry> {
        &self.executors
    }

    /// Returns a token cancelled when the runtime stops.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Requests [`run`](Self::run) to return.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Runs until Ctrl+C, SIGTERM or [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Beaver event bus is running. Press Ctrl+C to stop.");
        let token = self.shutdown.clone();
        self.run_until(async move {
            tokio::select! {
                _ = wait_for_signal() => {}
                _ = token.cancelled() => info!("Shutdown requested"),
            }
        })
        .await
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        info!(stats = %self.dispatcher.stats(), "Event bus started");
        shutdown.await;
        self.shutdown.cancel();
        info!("Event bus stopped");
        Ok(())
    }
}

impl std::fmt::Debug for EventBusRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBusRuntime")
            .field("dispatcher", &self.dispatcher)
            .field("executors", &self.executors)
            .finish()
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Cannot listen for SIGTERM"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`EventBusRuntime`].
///
/// Executors added with [`executor`](Self::executor) replace configured ones
/// of the same name.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<BeaverConfig>,
    interceptors: InterceptorChainBuilder,
    executors: Vec<(String, Arc<dyn TaskExecutor>)>,
    registrations: Vec<Registration>,
    payload_adapter: Option<Arc<dyn PayloadAdapter>>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            interceptors: InterceptorChainBuilder::new(),
            executors: Vec::new(),
            registrations: Vec::new(),
            payload_adapter: None,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration below files and environment.
    pub fn merge(mut self, config: BeaverConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses `config` as is, skipping file and environment loading.
    pub fn config(mut self, config: BeaverConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Adds an interceptor that runs after every ordered one.
    pub fn interceptor<E, I>(self, inner: I) -> Self
    where
        E: Event,
        I: EventInterceptor<E>,
    {
        self.ordered_interceptor::<E, I>(i32::MAX, inner)
    }

    /// Adds an interceptor with an explicit order value; lower runs first.
    pub fn ordered_interceptor<E, I>(self, order: i32, inner: I) -> Self
    where
        E: Event,
        I: EventInterceptor<E>,
    {
        self.dyn_interceptor(order, interceptor::<E, I>(inner))
    }

    /// Adds a type-erased interceptor.
    pub fn dyn_interceptor(mut self, order: i32, inner: Arc<dyn DynEventInterceptor>) -> Self {
        let instrumented: Arc<dyn DynEventInterceptor> =
            Arc::new(InstrumentedInterceptor::new(inner));
        self.interceptors = self.interceptors.shared(order, instrumented);
        self
    }

    /// Registers a task executor under `name`.
    pub fn executor(mut self, name: impl Into<String>, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executors.push((name.into(), executor));
        self
    }

    /// Registers every subscription of `subscriber` during `build`.
    pub fn subscriber<S: EventSubscriber>(mut self, subscriber: Arc<S>) -> Self {
        self.registrations
            .push(Box::new(move |dispatcher| dispatcher.register_subscriber(subscriber)));
        self
    }

    /// Replaces the adapter used to build exchange views.
    pub fn payload_adapter(mut self, adapter: Arc<dyn PayloadAdapter>) -> Self {
        self.payload_adapter = Some(adapter);
        self
    }

    pub fn build(self) -> RuntimeResult<EventBusRuntime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.config_loader.load()?,
        };

        logging::init_from_config(&config.logging);

        let executors = Arc::new(ExecutorRegistry::new());
        register_configured_executors(&executors, &config.executors)?;
        for (name, executor) in self.executors {
            if executors.register(name.as_str(), executor).is_some() {
                debug!(executor = %name, "Configured executor replaced");
            }
        }
        if let Some(name) = config.eventbus.task_executor.as_deref() {
            if !executors.contains(name) {
                return Err(ConfigError::UnknownExecutor(name.to_string()).into());
            }
        }

        let chain = self.interceptors.build()?;
        let mut builder = EventBusDispatcher::builder()
            .options(config.eventbus.to_execution_options())
            .executors(Arc::clone(&executors))
            .interceptor_chain(chain);
        if let Some(adapter) = self.payload_adapter {
            builder = builder.payload_adapter(adapter);
        }
        let dispatcher = Arc::new(builder.build());

        let mut handlers = 0;
        for registration in self.registrations {
            handlers += registration(dispatcher.as_ref())?;
        }

        info!(
            log_level = %config.logging.level,
            task_executor = config.eventbus.task_executor.as_deref().unwrap_or("<unset>"),
            executors = ?executors.names(),
            handlers,
            interceptors = dispatcher.interceptor_chain().len(),
            "Runtime initialized from configuration"
        );

        Ok(EventBusRuntime {
            config,
            dispatcher,
            executors,
            shutdown: CancellationToken::new(),
        })
    }
}
