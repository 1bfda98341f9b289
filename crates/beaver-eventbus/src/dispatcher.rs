//! Event bus dispatcher.
//!
//! The [`EventBusDispatcher`] owns two subscription registries keyed by
//! [`EventClass`]:
//!
//! - declarative subscriptions: filter ([`ListenerCacheKey`]) to the list of
//!   invokers sharing it, in registration order
//! - dynamic subscriptions: [`UniqueListenerCacheKey`] to exactly one invoker
//!
//! Dispatching an event:
//!
//! 1. Holders are built from both registries for the event's exact class,
//!    declarative holders first
//! 2. If any holder exists, the interceptor chain may veto the dispatch
//! 3. [`publish`](EventBusDispatcher::publish) submits one task per holder to
//!    the configured executor; [`handle`](EventBusDispatcher::handle) runs
//!    them in order and merges their responses
//!
//! ```rust,ignore
//! let dispatcher = EventBusDispatcher::builder()
//!     .executors(registry)
//!     .interceptor_chain(chain)
//!     .build();
//!
//! dispatcher.register_subscriber(Arc::new(DeviceService))?;
//! dispatcher.publish(BoxedEvent::new(event))?;
//! let response = dispatcher.handle(BoxedEvent::new(command)).await?;
//! ```

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{Instrument, Level, debug, error, span, trace, warn};

use beaver_core::{BoxedEvent, Event, EventClass, EventResponse};

use crate::error::{
    BoxError, ConfigurationError, EventBusError, EventBusExecutionError, ListenerError,
};
use crate::executor::{ExecutionOptions, ExecutorRegistry, TaskExecutor};
use crate::interceptor::{DynEventInterceptor, EventInterceptorChain};
use crate::invoke::{
    EventInvoker, HandlerMethod, ListenerParameterResolver, ListenerResult, PayloadAdapter,
    SubscribeInvoker,
};
use crate::key::{ListenerCacheKey, UniqueListenerCacheKey};
use crate::subscriber::{EventSubscribe, EventSubscriber};

type AnnotationBucket = Vec<(ListenerCacheKey, Vec<Arc<dyn EventInvoker>>)>;
type DynamicBucket = Vec<(UniqueListenerCacheKey, Arc<dyn EventInvoker>)>;

// ============================================================================
// Event Bus Trait
// ============================================================================

/// Entry points offered to event producers.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Dispatches asynchronously without waiting for listeners.
    fn publish(&self, event: BoxedEvent) -> Result<(), EventBusError>;

    /// Dispatches synchronously and returns the merged listener responses.
    async fn handle(&self, event: BoxedEvent) -> Result<EventResponse, EventBusError>;
}

// ============================================================================
// Invocation Holder
// ============================================================================

/// One listener invocation prepared for a single dispatch.
pub struct InvocationHolder {
    invoker: Arc<dyn EventInvoker>,
    matched_keys: Arc<[String]>,
    event: BoxedEvent,
}

impl InvocationHolder {
    pub fn new(
        invoker: Arc<dyn EventInvoker>,
        matched_keys: Arc<[String]>,
        event: BoxedEvent,
    ) -> Self {
        Self {
            invoker,
            matched_keys,
            event,
        }
    }

    pub fn invoker(&self) -> &Arc<dyn EventInvoker> {
        &self.invoker
    }

    pub fn matched_keys(&self) -> &[String] {
        &self.matched_keys
    }

    pub fn event(&self) -> &BoxedEvent {
        &self.event
    }

    /// Runs the listener, turning a panic into a [`ListenerError`].
    pub async fn invoke(self) -> ListenerResult {
        let Self {
            invoker,
            matched_keys,
            event,
        } = self;

        match AssertUnwindSafe(invoker.invoke(event, matched_keys))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(ListenerError::Panicked {
                listener: invoker.name().to_string(),
                message: panic_message(panic.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for InvocationHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationHolder")
            .field("listener", &self.invoker.name())
            .field("matched_keys", &self.matched_keys)
            .field("event", &self.event)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Subscription Statistics
// ============================================================================

/// Snapshot of registry sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    pub event_classes: usize,
    pub annotation_listeners: usize,
    pub dynamic_listeners: usize,
}

impl fmt::Display for SubscriptionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} declarative and {} dynamic listener(s) over {} event class(es)",
            self.annotation_listeners, self.dynamic_listeners, self.event_classes
        )
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// The central event dispatcher.
///
/// Registration and dispatch may run concurrently from any thread. Registry
/// guards are released before any listener runs.
pub struct EventBusDispatcher {
    annotation_subscriptions: DashMap<EventClass, AnnotationBucket>,
    dynamic_subscriptions: DashMap<EventClass, DynamicBucket>,
    resolver: Arc<ListenerParameterResolver>,
    interceptor_chain: RwLock<Arc<EventInterceptorChain>>,
    executors: Arc<ExecutorRegistry>,
    options: ExecutionOptions,
}

impl EventBusDispatcher {
    /// Creates a dispatcher with default options and no interceptors.
    pub fn new(executors: Arc<ExecutorRegistry>) -> Self {
        Self::builder().executors(executors).build()
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn executors(&self) -> &Arc<ExecutorRegistry> {
        &self.executors
    }

    /// Returns the current interceptor chain snapshot.
    pub fn interceptor_chain(&self) -> Arc<EventInterceptorChain> {
        Arc::clone(&self.interceptor_chain.read())
    }

    /// Adds an interceptor by rebuilding the chain snapshot.
    pub fn add_interceptor(
        &self,
        interceptor: Arc<dyn DynEventInterceptor>,
    ) -> Result<(), ConfigurationError> {
        let mut chain = self.interceptor_chain.write();
        let rebuilt = chain.with_interceptor(interceptor)?;
        *chain = Arc::new(rebuilt);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Registers a handler method of `bean` under a declarative filter.
    ///
    /// Handlers sharing an identical filter run in registration order.
    pub fn register_annotation_subscribe<B, I, S>(
        &self,
        key_expression: &str,
        event_types: I,
        bean: Arc<B>,
        method: HandlerMethod<B>,
    ) -> Result<(), ConfigurationError>
    where
        B: Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let payload_type = self.resolver.resolve_parameter_types(method.signature())?;
        let event_class = self.resolver.resolve_actual_event_type(method.signature())?;
        let cache_key = ListenerCacheKey::new(key_expression, event_types);

        debug!(
            listener = method.name(),
            event_class = %event_class,
            filter = %cache_key,
            "Registering event subscription"
        );

        let invoker: Arc<dyn EventInvoker> = Arc::new(SubscribeInvoker::new(
            bean,
            method,
            payload_type,
            Arc::clone(&self.resolver),
        ));

        let mut bucket = self.annotation_subscriptions.entry(event_class).or_default();
        match bucket.iter_mut().find(|(key, _)| *key == cache_key) {
            Some((_, invokers)) => invokers.push(invoker),
            None => bucket.push((cache_key, vec![invoker])),
        }
        Ok(())
    }

    /// Registers a handler method under an [`EventSubscribe`] filter.
    pub fn register_event_subscribe<B>(
        &self,
        subscribe: &EventSubscribe,
        bean: Arc<B>,
        method: HandlerMethod<B>,
    ) -> Result<(), ConfigurationError>
    where
        B: Send + Sync + 'static,
    {
        self.register_annotation_subscribe(
            subscribe.payload_key_expression(),
            subscribe.event_types().iter().cloned(),
            bean,
            method,
        )
    }

    /// Registers every subscription a component declares.
    ///
    /// Returns the number of registered handler methods.
    pub fn register_subscriber<S: EventSubscriber>(
        &self,
        subscriber: Arc<S>,
    ) -> Result<usize, ConfigurationError> {
        let definitions = S::subscriptions();
        let count = definitions.len();
        for definition in definitions {
            let (subscribe, method) = definition.into_parts();
            self.register_event_subscribe(&subscribe, Arc::clone(&subscriber), method)?;
        }
        debug!(
            subscriber = std::any::type_name::<S>(),
            handler_count = count,
            "Subscriber registered"
        );
        Ok(count)
    }

    /// Registers or replaces the dynamic subscription identified by `key`.
    pub fn register_dynamic_subscribe(
        &self,
        event_class: EventClass,
        key: UniqueListenerCacheKey,
        invoker: Arc<dyn EventInvoker>,
    ) {
        debug!(
            id = key.id(),
            event_class = %event_class,
            filter = %key.filter(),
            "Registering dynamic subscription"
        );

        let mut bucket = self.dynamic_subscriptions.entry(event_class).or_default();
        match bucket.iter_mut().find(|(existing, _)| *existing == key) {
            Some(slot) => *slot = (key, invoker),
            None => bucket.push((key, invoker)),
        }
    }

    /// Removes the dynamic subscription identified by `key`.
    ///
    /// Returns `false` if nothing was registered under it.
    pub fn deregister_dynamic_subscribe(
        &self,
        event_class: EventClass,
        key: &UniqueListenerCacheKey,
    ) -> bool {
        let removed = match self.dynamic_subscriptions.get_mut(&event_class) {
            Some(mut bucket) => {
                let before = bucket.len();
                bucket.retain(|(existing, _)| existing != key);
                bucket.len() != before
            }
            None => false,
        };

        if removed {
            self.dynamic_subscriptions
                .remove_if(&event_class, |_, bucket| bucket.is_empty());
            debug!(id = key.id(), event_class = %event_class, "Dynamic subscription removed");
        }
        removed
    }

    /// Returns the current registry sizes.
    pub fn stats(&self) -> SubscriptionStats {
        let mut classes = HashSet::new();
        let mut stats = SubscriptionStats::default();

        for entry in self.annotation_subscriptions.iter() {
            classes.insert(*entry.key());
            stats.annotation_listeners += entry
                .value()
                .iter()
                .map(|(_, invokers)| invokers.len())
                .sum::<usize>();
        }
        for entry in self.dynamic_subscriptions.iter() {
            classes.insert(*entry.key());
            stats.dynamic_listeners += entry.value().len();
        }

        stats.event_classes = classes.len();
        stats
    }

    // ------------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------------

    /// Builds one holder per listener matching `event`.
    ///
    /// Declarative holders come first, in filter then registration order,
    /// followed by dynamic holders.
    pub fn create_invocation_holders(&self, event: &BoxedEvent) -> Vec<InvocationHolder> {
        let class = event.class();
        let target: &dyn Event = event.inner().as_ref();
        let mut holders = Vec::new();

        if let Some(bucket) = self.annotation_subscriptions.get(&class) {
            for (cache_key, invokers) in bucket.iter() {
                let matched = cache_key.filter_match_multi_keys(target);
                if matched.is_empty() {
                    continue;
                }
                let matched: Arc<[String]> = matched.into();
                holders.extend(invokers.iter().map(|invoker| {
                    InvocationHolder::new(Arc::clone(invoker), Arc::clone(&matched), event.clone())
                }));
            }
        }

        if let Some(bucket) = self.dynamic_subscriptions.get(&class) {
            for (key, invoker) in bucket.iter() {
                let matched = key.filter().filter_match_multi_keys(target);
                if !matched.is_empty() {
                    holders.push(InvocationHolder::new(
                        Arc::clone(invoker),
                        matched.into(),
                        event.clone(),
                    ));
                }
            }
        }

        holders
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    fn resolve_executor(&self) -> Result<Arc<dyn TaskExecutor>, ConfigurationError> {
        let name = self
            .options
            .task_executor()
            .ok_or(ConfigurationError::ExecutorNotConfigured)?;
        self.executors
            .get(name)
            .ok_or_else(|| ConfigurationError::ExecutorNotFound {
                name: name.to_string(),
            })
    }

    /// Dispatches `event` asynchronously.
    ///
    /// Returns once every matching listener has been submitted to the task
    /// executor. Listener failures are logged and never reach the caller;
    /// the only error is an unresolvable executor.
    pub fn publish(&self, event: BoxedEvent) -> Result<(), EventBusError> {
        let span = span!(
            Level::DEBUG,
            "publish",
            event_class = %event.class(),
            event_type = %event.event_type()
        );
        let _enter = span.enter();

        let executor = self.resolve_executor()?;
        let holders = self.create_invocation_holders(&event);
        if holders.is_empty() {
            trace!("No listener matched");
            return Ok(());
        }

        if !self.interceptor_chain().pre_handle(&event) {
            warn!(
                event_type = event.event_type(),
                payload_key = event.payload_key(),
                "Event dispatch vetoed by interceptor"
            );
            return Ok(());
        }

        debug!(listener_count = holders.len(), "Submitting listeners");
        for holder in holders {
            let task = async move {
                let listener = holder.invoker().name().to_string();
                match holder.invoke().await {
                    Ok(_) => trace!(listener = %listener, "Listener completed"),
                    Err(e) => error!(listener = %listener, error = %e, "Event listener failed"),
                }
            };
            executor.submit(task.in_current_span().boxed());
        }
        Ok(())
    }

    /// Dispatches `event` synchronously and returns the merged responses.
    ///
    /// Listeners run one after another on the calling task; a failing
    /// listener does not stop the others. Failures are handed to the
    /// interceptor chain, and surface as [`EventBusError::Execution`] only
    /// when no interceptor for the event's class matched.
    pub async fn handle(&self, event: BoxedEvent) -> Result<EventResponse, EventBusError> {
        let span = span!(
            Level::DEBUG,
            "handle",
            event_class = %event.class(),
            event_type = %event.event_type()
        );
        self.handle_event(event).instrument(span).await
    }

    async fn handle_event(&self, event: BoxedEvent) -> Result<EventResponse, EventBusError> {
        let holders = self.create_invocation_holders(&event);
        let chain = self.interceptor_chain();
        let mut response = EventResponse::empty();

        if !holders.is_empty() && !chain.pre_handle(&event) {
            warn!(
                event_type = event.event_type(),
                payload_key = event.payload_key(),
                "Event dispatch vetoed by interceptor"
            );
            return Ok(response);
        }

        debug!(listener_count = holders.len(), "Running listeners");
        let mut causes: Vec<BoxError> = Vec::new();
        for holder in holders {
            let listener = holder.invoker().name().to_string();
            match holder.invoke().await {
                Ok(Some(partial)) => response.put_all(partial),
                Ok(None) => {}
                Err(e) => {
                    error!(listener = %listener, error = %e, "Event listener failed");
                    causes.push(e.into_cause());
                }
            }
        }

        let error = (!causes.is_empty()).then(|| EventBusExecutionError::new(causes));
        match chain.after_handle(&event, &response, error) {
            Ok(()) => Ok(response),
            Err(error) => Err(EventBusError::Execution { error, response }),
        }
    }
}

#[async_trait]
impl EventBus for EventBusDispatcher {
    fn publish(&self, event: BoxedEvent) -> Result<(), EventBusError> {
        EventBusDispatcher::publish(self, event)
    }

    async fn handle(&self, event: BoxedEvent) -> Result<EventResponse, EventBusError> {
        EventBusDispatcher::handle(self, event).await
    }
}

impl fmt::Debug for EventBusDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBusDispatcher")
            .field("stats", &self.stats())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`EventBusDispatcher`].
#[derive(Default)]
pub struct DispatcherBuilder {
    options: Option<ExecutionOptions>,
    executors: Option<Arc<ExecutorRegistry>>,
    interceptor_chain: Option<EventInterceptorChain>,
    adapter: Option<Arc<dyn PayloadAdapter>>,
}

impl DispatcherBuilder {
    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn executors(mut self, executors: Arc<ExecutorRegistry>) -> Self {
        self.executors = Some(executors);
        self
    }

    pub fn interceptor_chain(mut self, chain: EventInterceptorChain) -> Self {
        self.interceptor_chain = Some(chain);
        self
    }

    /// Replaces the adapter used to build exchange views.
    pub fn payload_adapter(mut self, adapter: Arc<dyn PayloadAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn build(self) -> EventBusDispatcher {
        let resolver = match self.adapter {
            Some(adapter) => ListenerParameterResolver::new(adapter),
            None => ListenerParameterResolver::default(),
        };

        EventBusDispatcher {
            annotation_subscriptions: DashMap::new(),
            dynamic_subscriptions: DashMap::new(),
            resolver: Arc::new(resolver),
            interceptor_chain: RwLock::new(Arc::new(self.interceptor_chain.unwrap_or_default())),
            executors: self.executors.unwrap_or_default(),
            options: self.options.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TokioExecutor;
    use crate::interceptor::{EventInterceptor, interceptor};
    use crate::invoke::{FnInvoker, HandlerSignature, ParameterType};
    use crate::subscriber::SubscribeDefinition;
    use beaver_core::exchange_event_type::REPORT_EVENT;
    use beaver_core::{EventContext, ExchangeEvent, ExchangePayload, IdentityKey};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use tokio::runtime::Handle;
    use tokio::sync::mpsc;

    // ------------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------------

    struct Device {
        id: String,
    }

    impl IdentityKey for Device {
        fn identity_key(&self) -> String {
            self.id.clone()
        }
    }

    struct DeviceEvent {
        event_type: String,
        device: Device,
    }

    impl DeviceEvent {
        fn new(event_type: &str, id: &str) -> BoxedEvent {
            BoxedEvent::new(Self {
                event_type: event_type.to_string(),
                device: Device { id: id.to_string() },
            })
        }
    }

    impl Event for DeviceEvent {
        fn event_type(&self) -> &str {
            &self.event_type
        }

        fn payload_key(&self) -> &str {
            &self.device.id
        }

        fn payload(&self) -> &dyn IdentityKey {
            &self.device
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn record(&self, name: &'static str) {
            self.calls.lock().push(name);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().clone()
        }
    }

    fn recording(name: &'static str) -> HandlerMethod<Recorder> {
        HandlerMethod::event::<ExchangeEvent, _, _, _>(name, move |bean: Arc<Recorder>, _| {
            async move {
                bean.record(name);
                EventResponse::of(name, true)
            }
        })
    }

    fn failing(name: &'static str) -> HandlerMethod<Recorder> {
        HandlerMethod::event::<ExchangeEvent, _, _, _>(name, move |bean: Arc<Recorder>, _| {
            async move {
                bean.record(name);
                Err::<EventResponse, _>("sensor offline")
            }
        })
    }

    fn crash() {
        panic!("sensor driver crashed")
    }

    struct Gate {
        name: &'static str,
        proceed: bool,
        before_calls: AtomicUsize,
        causes_seen: AtomicUsize,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Gate {
        fn new(name: &'static str, proceed: bool, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                proceed,
                before_calls: AtomicUsize::new(0),
                causes_seen: AtomicUsize::new(0),
                log: Arc::clone(log),
            })
        }
    }

    impl EventInterceptor<ExchangeEvent> for Arc<Gate> {
        fn before_handle(&self, _event: &ExchangeEvent) -> bool {
            self.before_calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().push(format!("before:{}", self.name));
            self.proceed
        }

        fn after_handle(
            &self,
            _event: &ExchangeEvent,
            _response: &EventResponse,
            error: Option<&EventBusExecutionError>,
        ) {
            if let Some(error) = error {
                self.causes_seen.fetch_add(error.causes().len(), Ordering::SeqCst);
            }
            self.log.lock().push(format!("after:{}", self.name));
        }
    }

    fn executors() -> Arc<ExecutorRegistry> {
        let registry = Arc::new(ExecutorRegistry::new());
        registry.register(
            ExecutionOptions::DEFAULT_TASK_EXECUTOR,
            Arc::new(TokioExecutor::new(Handle::current())),
        );
        registry
    }

    fn dispatcher() -> EventBusDispatcher {
        EventBusDispatcher::new(executors())
    }

    fn report() -> BoxedEvent {
        let payload = ExchangePayload::new()
            .with("temperature", 21.5)
            .with("humidity", 48);
        BoxedEvent::new(ExchangeEvent::with_payload_key(
            REPORT_EVENT,
            "temperature,humidity",
            payload,
        ))
    }

    // ------------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_no_listeners_skips_pre_handle() {
        let dispatcher = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        let gate = Gate::new("gate", false, &log);
        dispatcher
            .add_interceptor(interceptor::<ExchangeEvent, _>(Arc::clone(&gate)))
            .unwrap();

        assert!(dispatcher.create_invocation_holders(&report()).is_empty());
        tokio_test::assert_ok!(dispatcher.publish(report()));
        let response = dispatcher.handle(report()).await.unwrap();

        assert!(response.is_empty());
        assert_eq!(gate.before_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_event_type_filter() {
        let dispatcher = dispatcher();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        dispatcher
            .register_annotation_subscribe(
                "*",
                ["A"],
                Recorder::shared(),
                HandlerMethod::event::<DeviceEvent, _, _, _>(
                    "on_device",
                    move |_: Arc<Recorder>, _| {
                        let counter = Arc::clone(&counter);
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                    },
                ),
            )
            .unwrap();

        dispatcher.handle(DeviceEvent::new("B", "sensor-1")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        dispatcher.handle(DeviceEvent::new("A", "sensor-1")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_buckets_by_exact_event_class() {
        let dispatcher = dispatcher();
        let recorder = Recorder::shared();
        dispatcher
            .register_annotation_subscribe("*", Vec::<String>::new(), recorder, recording("x"))
            .unwrap();

        assert!(dispatcher.create_invocation_holders(&DeviceEvent::new("A", "d")).is_empty());
        assert_eq!(dispatcher.create_invocation_holders(&report()).len(), 1);
    }

    #[tokio::test]
    async fn test_matched_keys_narrow_payload_view() {
        let dispatcher = dispatcher();
        dispatcher
            .register_annotation_subscribe(
                "temperature",
                [REPORT_EVENT],
                Recorder::shared(),
                HandlerMethod::exchange::<ExchangePayload, _, _, _>(
                    "on_temperature",
                    |_: Arc<Recorder>, event| async move {
                        EventResponse::of("matched", event.matched_keys().join(","))
                            .with("view", event.payload().identity_key())
                            .with("payload_key", event.payload_key().to_string())
                    },
                ),
            )
            .unwrap();

        let holders = dispatcher.create_invocation_holders(&report());
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].matched_keys(), ["temperature"]);

        let response = dispatcher.handle(report()).await.unwrap();
        assert_eq!(response.get("matched").unwrap(), "temperature");
        assert_eq!(response.get("view").unwrap(), "temperature");
        assert_eq!(response.get("payload_key").unwrap(), "temperature");
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_identical_filter_keeps_registration_order() {
        let dispatcher = dispatcher();
        let recorder = Recorder::shared();
        for name in ["first", "second", "third"] {
            dispatcher
                .register_annotation_subscribe(
                    "temp*",
                    [REPORT_EVENT],
                    Arc::clone(&recorder),
                    recording(name),
                )
                .unwrap();
        }

        dispatcher.handle(report()).await.unwrap();

        assert_eq!(recorder.calls(), ["first", "second", "third"]);
        assert_eq!(
            dispatcher.stats(),
            SubscriptionStats {
                event_classes: 1,
                annotation_listeners: 3,
                dynamic_listeners: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_rejects_invalid_handler_signatures() {
        let dispatcher = dispatcher();

        let no_parameters = HandlerMethod::<Recorder>::typed::<ExchangeEvent, _, _, _>(
            HandlerSignature::new("no_parameters"),
            |_, _| async {},
        );
        let error = dispatcher
            .register_annotation_subscribe("*", [REPORT_EVENT], Recorder::shared(), no_parameters)
            .unwrap_err();
        assert!(matches!(error, ConfigurationError::MissingParameter { .. }));

        let not_an_event = HandlerMethod::<Recorder>::typed::<ExchangeEvent, _, _, _>(
            HandlerSignature::new("not_an_event").parameter(ParameterType::other::<String>()),
            |_, _| async {},
        );
        let error = dispatcher
            .register_annotation_subscribe("*", [REPORT_EVENT], Recorder::shared(), not_an_event)
            .unwrap_err();
        assert!(matches!(error, ConfigurationError::NotAnEvent { .. }));
        assert_eq!(dispatcher.stats(), SubscriptionStats::default());
    }

    #[tokio::test]
    async fn test_register_subscriber() {
        struct DeviceService;

        impl EventSubscriber for DeviceService {
            fn subscriptions() -> Vec<SubscribeDefinition<Self>> {
                vec![
                    SubscribeDefinition::new(
                        EventSubscribe::new("*").event_type("online"),
                        HandlerMethod::event::<DeviceEvent, _, _, _>("on_online", |_, _| async {
                            EventResponse::of("online", true)
                        }),
                    ),
                    SubscribeDefinition::new(
                        EventSubscribe::new("sensor-*"),
                        HandlerMethod::event::<DeviceEvent, _, _, _>("on_sensor", |_, event| {
                            async move {
                                EventResponse::of("sensor", event.payload_key().to_string())
                            }
                        }),
                    ),
                ]
            }
        }

        let dispatcher = dispatcher();
        assert_eq!(dispatcher.register_subscriber(Arc::new(DeviceService)).unwrap(), 2);

        let response = dispatcher
            .handle(DeviceEvent::new("online", "sensor-7"))
            .await
            .unwrap();
        assert_eq!(response.get("online").unwrap(), true);
        assert_eq!(response.get("sensor").unwrap(), "sensor-7");

        let response = dispatcher
            .handle(DeviceEvent::new("offline", "gateway-1"))
            .await
            .unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_dynamic_deregistration_leaves_others_active() {
        let dispatcher = dispatcher();
        let class = EventClass::of::<ExchangeEvent>();
        for id in ["rule-a", "rule-b"] {
            dispatcher.register_dynamic_subscribe(
                class,
                UniqueListenerCacheKey::new(id, "humidity", [REPORT_EVENT]),
                Arc::new(FnInvoker::typed(id, move |_: EventContext<ExchangeEvent>| async move {
                    EventResponse::of(id, true)
                })),
            );
        }

        let response = dispatcher.handle(report()).await.unwrap();
        assert_eq!(response.len(), 2);

        let rule_a = UniqueListenerCacheKey::new("rule-a", "humidity", [REPORT_EVENT]);
        assert!(dispatcher.deregister_dynamic_subscribe(class, &rule_a));
        assert!(!dispatcher.deregister_dynamic_subscribe(class, &rule_a));

        let response = dispatcher.handle(report()).await.unwrap();
        assert!(response.get("rule-a").is_none());
        assert_eq!(response.get("rule-b").unwrap(), true);
    }

    #[tokio::test]
    async fn test_dynamic_registration_replaces_same_id() {
        let dispatcher = dispatcher();
        let class = EventClass::of::<ExchangeEvent>();
        for version in [1, 2] {
            dispatcher.register_dynamic_subscribe(
                class,
                UniqueListenerCacheKey::new("rule", "*", [REPORT_EVENT]),
                Arc::new(FnInvoker::typed("rule", move |_: EventContext<ExchangeEvent>| async move {
                    EventResponse::of("version", version)
                })),
            );
        }

        let response = dispatcher.handle(report()).await.unwrap();
        assert_eq!(response.get("version").unwrap(), 2);
        assert_eq!(dispatcher.stats().dynamic_listeners, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_and_dispatch() {
        let dispatcher = Arc::new(dispatcher());
        let class = EventClass::of::<ExchangeEvent>();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    dispatcher.register_dynamic_subscribe(
                        class,
                        UniqueListenerCacheKey::new(format!("rule-{i}"), "*", [REPORT_EVENT]),
                        Arc::new(FnInvoker::typed(
                            format!("rule-{i}"),
                            |_: EventContext<ExchangeEvent>| async {},
                        )),
                    );
                    dispatcher.handle(report()).await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(dispatcher.stats().dynamic_listeners, 16);
    }

    // ------------------------------------------------------------------------
    // Handle
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_handle_merges_responses() {
        let dispatcher = dispatcher();
        let recorder = Recorder::shared();
        for (expression, name) in [("temperature", "t"), ("humidity", "h")] {
            dispatcher
                .register_annotation_subscribe(
                    expression,
                    [REPORT_EVENT],
                    Arc::clone(&recorder),
                    recording(name),
                )
                .unwrap();
        }

        let first = dispatcher.handle(report()).await.unwrap();
        let second = dispatcher.handle(report()).await.unwrap();

        assert_eq!(first.keys().collect::<Vec<_>>(), ["h", "t"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_handle_failure_does_not_stop_others() {
        let dispatcher = dispatcher();
        let recorder = Recorder::shared();
        for method in [recording("first"), failing("second"), recording("third")] {
            dispatcher
                .register_annotation_subscribe("*", [REPORT_EVENT], recorder.clone(), method)
                .unwrap();
        }

        let error = dispatcher.handle(report()).await.unwrap_err();

        assert_eq!(recorder.calls(), ["first", "second", "third"]);
        let causes = error.execution_error().unwrap().causes();
        assert_eq!(causes.len(), 1);
        assert_eq!(causes[0].to_string(), "sensor offline");

        let response = error.partial_response().unwrap();
        assert_eq!(response.len(), 2);
        assert!(response.contains_key("first"));
        assert!(response.contains_key("third"));
    }

    #[tokio::test]
    async fn test_matching_interceptor_acknowledges_failure() {
        let dispatcher = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        let gate = Gate::new("audit", true, &log);
        dispatcher
            .add_interceptor(interceptor::<ExchangeEvent, _>(Arc::clone(&gate)))
            .unwrap();
        dispatcher
            .register_annotation_subscribe("*", [REPORT_EVENT], Recorder::shared(), failing("bad"))
            .unwrap();

        let response = dispatcher.handle(report()).await.unwrap();

        assert!(response.is_empty());
        assert_eq!(gate.causes_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listener_panic_is_captured() {
        let dispatcher = dispatcher();
        dispatcher.register_dynamic_subscribe(
            EventClass::of::<ExchangeEvent>(),
            UniqueListenerCacheKey::new("crashing", "*", [REPORT_EVENT]),
            Arc::new(FnInvoker::typed("crashing", |_: EventContext<ExchangeEvent>| async {
                crash()
            })),
        );

        let error = dispatcher.handle(report()).await.unwrap_err();
        let causes = error.execution_error().unwrap().causes();

        assert_eq!(causes.len(), 1);
        assert!(matches!(
            causes[0].downcast_ref::<ListenerError>(),
            Some(ListenerError::Panicked { message, .. }) if message == "sensor driver crashed"
        ));
    }

    // ------------------------------------------------------------------------
    // Interceptors
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_veto_short_circuits_dispatch() {
        let dispatcher = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Gate::new("first", false, &log);
        let second = Gate::new("second", true, &log);
        dispatcher
            .add_interceptor(interceptor::<ExchangeEvent, _>(Arc::clone(&first)))
            .unwrap();
        dispatcher
            .add_interceptor(interceptor::<ExchangeEvent, _>(Arc::clone(&second)))
            .unwrap();
        let recorder = Recorder::shared();
        dispatcher
            .register_annotation_subscribe("*", [REPORT_EVENT], recorder.clone(), recording("x"))
            .unwrap();

        let response = dispatcher.handle(report()).await.unwrap();
        tokio_test::assert_ok!(dispatcher.publish(report()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(response.is_empty());
        assert!(recorder.calls().is_empty());
        assert_eq!(first.before_calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.before_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_after_handle_runs_in_reverse_order() {
        let dispatcher = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["x", "y"] {
            dispatcher
                .add_interceptor(interceptor::<ExchangeEvent, _>(Gate::new(name, true, &log)))
                .unwrap();
        }
        dispatcher
            .register_annotation_subscribe("*", [REPORT_EVENT], Recorder::shared(), recording("r"))
            .unwrap();

        dispatcher.handle(report()).await.unwrap();

        assert_eq!(*log.lock(), ["before:x", "before:y", "after:y", "after:x"]);
    }

    // ------------------------------------------------------------------------
    // Publish
    // ------------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_publish_does_not_wait_for_listeners() {
        let dispatcher = dispatcher();
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.register_dynamic_subscribe(
            EventClass::of::<ExchangeEvent>(),
            UniqueListenerCacheKey::new("slow", "*", [REPORT_EVENT]),
            Arc::new(FnInvoker::typed("slow", move |_: EventContext<ExchangeEvent>| {
                let tx = tx.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    let _ = tx.send("done");
                }
            })),
        );

        let started = Instant::now();
        dispatcher.publish(report()).unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));

        let done = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert_eq!(done, Some("done"));
    }

    #[tokio::test]
    async fn test_publish_swallows_listener_failures() {
        let dispatcher = dispatcher();
        dispatcher
            .register_annotation_subscribe("*", [REPORT_EVENT], Recorder::shared(), failing("bad"))
            .unwrap();

        tokio_test::assert_ok!(dispatcher.publish(report()));
    }

    #[tokio::test]
    async fn test_publish_requires_executor() {
        let dispatcher = EventBusDispatcher::new(Arc::new(ExecutorRegistry::new()));
        let error = dispatcher.publish(report()).unwrap_err();
        assert!(matches!(
            error,
            EventBusError::Configuration(ConfigurationError::ExecutorNotFound { ref name })
                if name == ExecutionOptions::DEFAULT_TASK_EXECUTOR
        ));

        let dispatcher = EventBusDispatcher::builder()
            .executors(executors())
            .options(ExecutionOptions::unset())
            .build();
        let error = dispatcher.publish(report()).unwrap_err();
        assert!(matches!(
            error,
            EventBusError::Configuration(ConfigurationError::ExecutorNotConfigured)
        ));
    }
}
