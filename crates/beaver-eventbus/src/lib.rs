//! # Beaver Event Bus
//!
//! In-process dispatch engine for Beaver IoT events.
//!
//! This layer provides:
//! - Listener registries keyed by concrete event class, for declarative
//!   subscriptions and dynamic subscriptions with a unique id
//! - Payload-key matching that narrows what each listener sees
//! - Interceptor chains with veto, acknowledgement and reverse post-processing
//! - Fire-and-forget `publish` on a named task executor, and sequential
//!   `handle` aggregating listener responses
//!
//! ## Example
//!
//! ```rust,ignore
//! use beaver_eventbus::{EventBusDispatcher, ExecutorRegistry, HandlerMethod};
//!
//! let dispatcher = EventBusDispatcher::new(Arc::new(registry));
//! dispatcher.register_annotation_subscribe(
//!     "temperature",
//!     [REPORT_EVENT],
//!     Arc::new(service),
//!     HandlerMethod::exchange::<Temperature, _, _, _>("on_temperature", on_temperature),
//! )?;
//!
//! let response = dispatcher.handle(BoxedEvent::new(event)).await?;
//! ```

pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod interceptor;
pub mod invoke;
pub mod key;
pub mod subscriber;

pub use dispatcher::{
    DispatcherBuilder, EventBus, EventBusDispatcher, InvocationHolder, SubscriptionStats,
};
pub use error::{
    BoxError, ConfigurationError, EventBusError, EventBusExecutionError, EventBusResult,
    ListenerError,
};
pub use executor::{
    DedicatedExecutor, ExecutionOptions, ExecutorRegistry, TaskExecutor, TokioExecutor,
};
pub use interceptor::{
    DynEventInterceptor, EventInterceptor, EventInterceptorChain, InstrumentedInterceptor,
    InterceptorChainBuilder, TypedInterceptor, interceptor,
};
pub use invoke::{
    EventInvoker, FilteringPayloadAdapter, FnInvoker, HandlerMethod, HandlerSignature,
    IntoListenerResult, ListenerParameterResolver, ListenerResult, ParameterType, PayloadAdapter,
    PayloadType, SubscribeInvoker,
};
pub use key::{KeyMatcher, KeyPattern, ListenerCacheKey, UniqueListenerCacheKey};
pub use subscriber::{EventSubscribe, EventSubscriber, SubscribeDefinition};
