//! Executor construction from configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use beaver_eventbus::{DedicatedExecutor, ExecutorRegistry};
use tracing::info;

use crate::config::ExecutorConfig;
use crate::error::{RuntimeError, RuntimeResult};

/// Starts one [`DedicatedExecutor`] per configured entry.
///
/// Executors already present in `registry` are kept; configured ones with the
/// same name replace them.
pub fn register_configured_executors(
    registry: &ExecutorRegistry,
    executors: &BTreeMap<String, ExecutorConfig>,
) -> RuntimeResult<()> {
    for (name, config) in executors {
        let thread_name = config.thread_name.as_deref().unwrap_or(name);
        let executor = DedicatedExecutor::new(thread_name, config.worker_threads).map_err(
            |source| RuntimeError::Executor {
                name: name.clone(),
                source,
            },
        )?;

        info!(
            executor = %name,
            worker_threads = config.worker_threads,
            thread_name,
            "Task executor started"
        );
        registry.register(name.as_str(), Arc::new(executor));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_every_configured_executor() {
        let registry = ExecutorRegistry::new();
        let executors = BTreeMap::from([
            ("eventBusTaskExecutor".to_string(), ExecutorConfig::default()),
            (
                "reports".to_string(),
                ExecutorConfig {
                    worker_threads: 1,
                    thread_name: Some("reports".to_string()),
                },
            ),
        ]);

        register_configured_executors(&registry, &executors).unwrap();

        assert_eq!(registry.names(), ["eventBusTaskExecutor", "reports"]);
    }
}
