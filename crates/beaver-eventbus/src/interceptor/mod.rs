//! Event interceptors.
//!
//! An interceptor observes dispatch of exactly one concrete event class. It
//! may veto a dispatch in [`before_handle`](EventInterceptor::before_handle)
//! and sees the aggregate response and error of synchronous dispatches in
//! [`after_handle`](EventInterceptor::after_handle).
//!
//! # Example
//!
//! ```rust,ignore
//! struct RejectOffline;
//!
//! impl EventInterceptor<DeviceEvent> for RejectOffline {
//!     fn before_handle(&self, event: &DeviceEvent) -> bool {
//!         event.device.online
//!     }
//! }
//!
//! let chain = EventInterceptorChain::builder()
//!     .interceptor(TypedInterceptor::new(RejectOffline))
//!     .build()?;
//! ```

mod chain;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::trace;

use beaver_core::{BoxedEvent, Event, EventClass, EventResponse};

use crate::error::EventBusExecutionError;

pub use chain::{EventInterceptorChain, InterceptorChainBuilder};

/// Interceptor over the concrete event class `E`.
///
/// Every hook defaults to the open behaviour.
pub trait EventInterceptor<E: Event>: Send + Sync + 'static {
    /// Returns `true` if this interceptor applies to `event`.
    fn matches(&self, _event: &E) -> bool {
        true
    }

    /// Runs before listeners; returning `false` vetoes the dispatch.
    fn before_handle(&self, _event: &E) -> bool {
        true
    }

    /// Runs after a synchronous dispatch.
    ///
    /// A matching interceptor acknowledges `error`: it is not raised to the
    /// caller.
    fn after_handle(
        &self,
        _event: &E,
        _response: &EventResponse,
        _error: Option<&EventBusExecutionError>,
    ) {
    }
}

/// Type-erased interceptor as stored by the chain.
pub trait DynEventInterceptor: Send + Sync {
    fn name(&self) -> &str;

    /// The event class this interceptor is scoped to.
    ///
    /// Wrappers must report the class of the interceptor they wrap.
    fn target_class(&self) -> Option<EventClass>;

    fn matches(&self, event: &BoxedEvent) -> bool;

    fn before_handle(&self, event: &BoxedEvent) -> bool;

    fn after_handle(
        &self,
        event: &BoxedEvent,
        response: &EventResponse,
        error: Option<&EventBusExecutionError>,
    );
}

// ============================================================================
// Typed Interceptor
// ============================================================================

/// Adapts an [`EventInterceptor<E>`] to [`DynEventInterceptor`], declaring
/// `E` as its target class.
pub struct TypedInterceptor<E, I> {
    inner: I,
    _event: PhantomData<fn(&E)>,
}

impl<E: Event, I: EventInterceptor<E>> TypedInterceptor<E, I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            _event: PhantomData,
        }
    }

    pub fn into_inner(self) -> I {
        self.inner
    }
}

impl<E: Event, I: EventInterceptor<E>> DynEventInterceptor for TypedInterceptor<E, I> {
    fn name(&self) -> &str {
        std::any::type_name::<I>()
    }

    fn target_class(&self) -> Option<EventClass> {
        Some(EventClass::of::<E>())
    }

    fn matches(&self, event: &BoxedEvent) -> bool {
        event
            .downcast_ref::<E>()
            .is_some_and(|event| self.inner.matches(event))
    }

    fn before_handle(&self, event: &BoxedEvent) -> bool {
        event
            .downcast_ref::<E>()
            .is_none_or(|event| self.inner.before_handle(event))
    }

    fn after_handle(
        &self,
        event: &BoxedEvent,
        response: &EventResponse,
        error: Option<&EventBusExecutionError>,
    ) {
        if let Some(event) = event.downcast_ref::<E>() {
            self.inner.after_handle(event, response, error);
        }
    }
}

/// Wraps a typed interceptor for registration.
pub fn interceptor<E, I>(inner: I) -> Arc<dyn DynEventInterceptor>
where
    E: Event,
    I: EventInterceptor<E>,
{
    Arc::new(TypedInterceptor::new(inner))
}

// ============================================================================
// Instrumented Interceptor
// ============================================================================

/// Tracing wrapper around another interceptor.
///
/// Reports the wrapped interceptor's name and target class, so it can be
/// stacked freely before the chain is built.
pub struct InstrumentedInterceptor {
    inner: Arc<dyn DynEventInterceptor>,
}

impl InstrumentedInterceptor {
    pub fn new(inner: Arc<dyn DynEventInterceptor>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<dyn DynEventInterceptor> {
        &self.inner
    }
}

impl DynEventInterceptor for InstrumentedInterceptor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn target_class(&self) -> Option<EventClass> {
        self.inner.target_class()
    }

    fn matches(&self, event: &BoxedEvent) -> bool {
        let matched = self.inner.matches(event);
        trace!(interceptor = self.name(), matched, "Interceptor match");
        matched
    }

    fn before_handle(&self, event: &BoxedEvent) -> bool {
        let proceed = self.inner.before_handle(event);
        trace!(interceptor = self.name(), proceed, "Interceptor before_handle");
        proceed
    }

    fn after_handle(
        &self,
        event: &BoxedEvent,
        response: &EventResponse,
        error: Option<&EventBusExecutionError>,
    ) {
        trace!(
            interceptor = self.name(),
            response_keys = response.len(),
            failed = error.is_some(),
            "Interceptor after_handle"
        );
        self.inner.after_handle(event, response, error);
    }
}

impl fmt::Debug for dyn DynEventInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynEventInterceptor")
            .field("name", &self.name())
            .field("target_class", &self.target_class())
            .finish()
    }
}
