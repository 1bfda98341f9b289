//! Task executors for asynchronous dispatch.
//!
//! `publish` never runs listeners itself: it resolves a named
//! [`TaskExecutor`] from the [`ExecutorRegistry`] and submits one task per
//! listener. Pool sizing belongs to whoever builds the executor.
//!
//! ```rust,ignore
//! let registry = ExecutorRegistry::new();
//! registry.register(
//!     ExecutionOptions::DEFAULT_TASK_EXECUTOR,
//!     Arc::new(DedicatedExecutor::new("event-bus", 4)?),
//! );
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

/// A service accepting fire-and-forget tasks.
pub trait TaskExecutor: Send + Sync {
    fn submit(&self, task: BoxFuture<'static, ()>);
}

// ============================================================================
// Tokio Executors
// ============================================================================

/// Spawns tasks onto an existing Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime of the calling context, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl TaskExecutor for TokioExecutor {
    fn submit(&self, task: BoxFuture<'static, ()>) {
        self.handle.spawn(task);
    }
}

/// Owns a dedicated multi-threaded Tokio runtime.
///
/// Dropping the executor shuts its runtime down without waiting for
/// running tasks.
pub struct DedicatedExecutor {
    name: String,
    handle: Handle,
    runtime: Option<Runtime>,
}

impl DedicatedExecutor {
    /// Starts a runtime with `worker_threads` workers named `{name}-worker`.
    pub fn new(name: impl Into<String>, worker_threads: usize) -> std::io::Result<Self> {
        let name = name.into();
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name(format!("{name}-worker"))
            .enable_all()
            .build()?;

        debug!(executor = %name, worker_threads, "Dedicated executor started");

        Ok(Self {
            name,
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl TaskExecutor for DedicatedExecutor {
    fn submit(&self, task: BoxFuture<'static, ()>) {
        self.handle.spawn(task);
    }
}

impl Drop for DedicatedExecutor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for DedicatedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedicatedExecutor")
            .field("name", &self.name)
            .finish()
    }
}

// ============================================================================
// Executor Registry
// ============================================================================

/// Named executor lookup.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<String, Arc<dyn TaskExecutor>>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executor, returning the one it replaced.
    pub fn register(
        &self,
        name: impl Into<String>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Option<Arc<dyn TaskExecutor>> {
        let name = name.into();
        debug!(executor = %name, "Executor registered");
        self.executors.write().insert(name, executor)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.executors.read().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.write().remove(name)
    }

    /// Returns the registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.executors.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("executors", &self.names())
            .finish()
    }
}

// ============================================================================
// Execution Options
// ============================================================================

/// Dispatcher execution settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    task_executor: Option<String>,
}

impl ExecutionOptions {
    /// Name of the executor used when nothing else is configured.
    pub const DEFAULT_TASK_EXECUTOR: &'static str = "eventBusTaskExecutor";

    pub fn new(task_executor: impl Into<String>) -> Self {
        Self {
            task_executor: Some(task_executor.into()),
        }
    }

    /// Options without a task executor; `publish` then fails.
    pub fn unset() -> Self {
        Self {
            task_executor: None,
        }
    }

    pub fn task_executor(&self) -> Option<&str> {
        self.task_executor.as_deref()
    }
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TASK_EXECUTOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_tokio_executor_runs_task() {
        let executor = TokioExecutor::try_current().unwrap();
        let (tx, rx) = oneshot::channel();

        executor.submit(Box::pin(async move {
            let _ = tx.send(42);
        }));

        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_dedicated_executor_runs_on_named_threads() {
        let executor = DedicatedExecutor::new("bus-test", 2).unwrap();
        let (tx, rx) = oneshot::channel();

        executor.submit(Box::pin(async move {
            let name = std::thread::current().name().map(str::to_string);
            let _ = tx.send(name);
        }));

        let name = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(name.as_deref(), Some("bus-test-worker"));
        drop(executor);
    }

    #[test]
    fn test_registry_lookup() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let registry = ExecutorRegistry::new();

        assert!(registry.get("missing").is_none());
        assert!(
            registry
                .register("primary", Arc::new(TokioExecutor::new(runtime.handle().clone())))
                .is_none()
        );
        assert!(registry.contains("primary"));
        assert_eq!(registry.names(), vec!["primary".to_string()]);
        assert!(registry.remove("primary").is_some());
        assert!(!registry.contains("primary"));
    }

    #[test]
    fn test_execution_options() {
        assert_eq!(
            ExecutionOptions::default().task_executor(),
            Some("eventBusTaskExecutor")
        );
        assert_eq!(ExecutionOptions::unset().task_executor(), None);
    }
}
