//! The interceptor chain.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use beaver_core::{BoxedEvent, EventClass, EventResponse};

use super::DynEventInterceptor;
use crate::error::{ConfigurationError, EventBusExecutionError};

/// Collects interceptors before building an [`EventInterceptorChain`].
///
/// Interceptors run by ascending order value; equal values keep insertion
/// order. Interceptors added without an order run last.
#[derive(Default)]
pub struct InterceptorChainBuilder {
    entries: Vec<(i32, Arc<dyn DynEventInterceptor>)>,
}

impl InterceptorChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an interceptor with the lowest precedence.
    pub fn interceptor(self, interceptor: impl DynEventInterceptor + 'static) -> Self {
        self.shared(i32::MAX, Arc::new(interceptor))
    }

    /// Adds an interceptor with an explicit order value.
    pub fn ordered(self, order: i32, interceptor: impl DynEventInterceptor + 'static) -> Self {
        self.shared(order, Arc::new(interceptor))
    }

    /// Adds an already shared interceptor.
    pub fn shared(mut self, order: i32, interceptor: Arc<dyn DynEventInterceptor>) -> Self {
        self.entries.push((order, interceptor));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the chain, failing if any interceptor has no target class.
    pub fn build(mut self) -> Result<EventInterceptorChain, ConfigurationError> {
        self.entries.sort_by_key(|(order, _)| *order);
        EventInterceptorChain::new(self.entries.into_iter().map(|(_, i)| i))
    }
}

/// Interceptors grouped by the exact event class they target.
///
/// The chain is an immutable snapshot; adding an interceptor later produces a
/// new chain through [`with_interceptor`](Self::with_interceptor).
#[derive(Default, Clone)]
pub struct EventInterceptorChain {
    ordered: Vec<Arc<dyn DynEventInterceptor>>,
    by_class: HashMap<EventClass, Vec<Arc<dyn DynEventInterceptor>>>,
}

impl EventInterceptorChain {
    pub fn builder() -> InterceptorChainBuilder {
        InterceptorChainBuilder::new()
    }

    /// Groups interceptors by target class, keeping the given order.
    pub fn new<I>(interceptors: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = Arc<dyn DynEventInterceptor>>,
    {
        let mut chain = Self::default();
        for interceptor in interceptors {
            chain.push(interceptor)?;
        }
        debug!(
            interceptor_count = chain.ordered.len(),
            event_classes = chain.by_class.len(),
            "Interceptor chain built"
        );
        Ok(chain)
    }

    /// Returns a new chain with `interceptor` appended.
    pub fn with_interceptor(
        &self,
        interceptor: Arc<dyn DynEventInterceptor>,
    ) -> Result<Self, ConfigurationError> {
        let mut chain = self.clone();
        chain.push(interceptor)?;
        Ok(chain)
    }

    fn push(
        &mut self,
        interceptor: Arc<dyn DynEventInterceptor>,
    ) -> Result<(), ConfigurationError> {
        let class = interceptor.target_class().ok_or_else(|| {
            ConfigurationError::InterceptorWithoutTarget {
                interceptor: interceptor.name().to_string(),
            }
        })?;
        self.by_class
            .entry(class)
            .or_default()
            .push(Arc::clone(&interceptor));
        self.ordered.push(interceptor);
        Ok(())
    }

    /// Returns the interceptors targeting `class`, in registration order.
    pub fn interceptors_for(&self, class: EventClass) -> &[Arc<dyn DynEventInterceptor>] {
        self.by_class.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Runs `before_handle` of every matching interceptor in order.
    ///
    /// Stops at the first veto. Returns `true` when no interceptor targets the
    /// event's class.
    pub fn pre_handle(&self, event: &BoxedEvent) -> bool {
        for interceptor in self.interceptors_for(event.class()) {
            if interceptor.matches(event) && !interceptor.before_handle(event) {
                debug!(interceptor = interceptor.name(), "Dispatch vetoed");
                return false;
            }
        }
        true
    }

    /// Runs `after_handle` of every matching interceptor in reverse order.
    ///
    /// Returns `error` back when no interceptor matched it.
    pub fn after_handle(
        &self,
        event: &BoxedEvent,
        response: &EventResponse,
        error: Option<EventBusExecutionError>,
    ) -> Result<(), EventBusExecutionError> {
        let mut matched = false;
        for interceptor in self.interceptors_for(event.class()).iter().rev() {
            if interceptor.matches(event) {
                matched = true;
                interceptor.after_handle(event, response, error.as_ref());
            }
        }

        match error {
            Some(error) if !matched => Err(error),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for EventInterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventInterceptorChain")
            .field("interceptor_count", &self.ordered.len())
            .field("event_classes", &self.by_class.len())
            .finish()
    }
}
