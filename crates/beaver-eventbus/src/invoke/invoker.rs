//! Listener invokers.
//!
//! Every registered listener is an [`EventInvoker`]. Two implementations
//! cover the registration styles:
//!
//! - [`SubscribeInvoker`] binds a component (`Arc<B>`) to one of its
//!   handler methods; produced by declarative registration
//! - [`FnInvoker`] wraps a closure; used for dynamic subscriptions
//!
//! # Example
//!
//! ```rust,ignore
//! struct DeviceService;
//!
//! impl DeviceService {
//!     async fn on_status(&self, event: EventContext<DeviceEvent>) -> EventResponse {
//!         EventResponse::of("status", event.payload_key())
//!     }
//! }
//!
//! let method = HandlerMethod::event("on_status", |svc: Arc<DeviceService>, event| async move {
//!     svc.on_status(event).await
//! });
//!
//! let invoker = FnInvoker::typed("audit", |event: EventContext<DeviceEvent>| async move {
//!     tracing::info!(key = event.payload_key(), "device changed");
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, ready};

use beaver_core::{
    BoxedEvent, Event, EventContext, EventResponse, ExchangeEvent, ExchangeView, PayloadResult,
};

use super::adapter::{FilteringPayloadAdapter, PayloadAdapter};
use super::resolver::ListenerParameterResolver;
use super::result::IntoListenerResult;
use super::signature::{HandlerSignature, ParameterType, PayloadType};
use crate::error::ListenerError;

/// Outcome of one listener invocation.
pub type ListenerResult = Result<Option<EventResponse>, ListenerError>;

/// Uniform callable run by the dispatcher.
///
/// Invokers are shared across concurrent dispatches and must not hold
/// per-call state.
#[async_trait]
pub trait EventInvoker: Send + Sync + 'static {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Invokes the listener with the event and the payload keys it matched.
    ///
    /// Listener failures are returned, never swallowed.
    async fn invoke(&self, event: BoxedEvent, matched_keys: Arc<[String]>) -> ListenerResult;
}

// ============================================================================
// Handler Method
// ============================================================================

/// Type-erased handler method of a component `B`.
pub type MethodFn<B> = Arc<
    dyn Fn(Arc<B>, BoxedEvent, Arc<[String]>) -> BoxFuture<'static, ListenerResult> + Send + Sync,
>;

/// A handler method together with its signature.
pub struct HandlerMethod<B> {
    signature: HandlerSignature,
    call: MethodFn<B>,
}

impl<B: Send + Sync + 'static> HandlerMethod<B> {
    /// A method taking `EventContext<E>` for a plain event class.
    pub fn event<E, F, Fut, R>(name: impl Into<String>, f: F) -> Self
    where
        E: Event,
        F: Fn(Arc<B>, EventContext<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoListenerResult,
    {
        let signature = HandlerSignature::new(name).parameter(ParameterType::event::<E>());
        Self::typed(signature, f)
    }

    /// A method taking `EventContext<ExchangeEvent<V>>`.
    ///
    /// The method is bucketed under the raw `ExchangeEvent` and receives a
    /// `V` built from the payload entries it matched.
    pub fn exchange<V, F, Fut, R>(name: impl Into<String>, f: F) -> Self
    where
        V: ExchangeView,
        F: Fn(Arc<B>, EventContext<ExchangeEvent<V>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoListenerResult,
    {
        let signature = HandlerSignature::new(name).parameter(ParameterType::exchange::<V>());
        Self::typed(signature, f)
    }

    /// A method receiving `EventContext<E>` with a caller-supplied signature.
    pub fn typed<E, F, Fut, R>(signature: HandlerSignature, f: F) -> Self
    where
        E: Event,
        F: Fn(Arc<B>, EventContext<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoListenerResult,
    {
        let listener: Arc<str> = Arc::from(signature.name());
        let call: MethodFn<B> = Arc::new(move |bean, event, matched_keys| {
            call_typed::<E, _, _, _>(&listener, event, matched_keys, |ctx| f(bean, ctx))
        });
        Self { signature, call }
    }

    /// Assembles a method from an explicit signature and an erased call.
    pub fn from_parts(signature: HandlerSignature, call: MethodFn<B>) -> Self {
        Self { signature, call }
    }

    pub fn signature(&self) -> &HandlerSignature {
        &self.signature
    }

    pub fn name(&self) -> &str {
        self.signature.name()
    }
}

impl<B> Clone for HandlerMethod<B> {
    fn clone(&self) -> Self {
        Self {
            signature: self.signature.clone(),
            call: Arc::clone(&self.call),
        }
    }
}

impl<B> fmt::Debug for HandlerMethod<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerMethod")
            .field("signature", &self.signature)
            .finish()
    }
}

/// Downcasts `event` to `E` and runs `f`, converting its output.
fn call_typed<E, G, Fut, R>(
    listener: &Arc<str>,
    event: BoxedEvent,
    matched_keys: Arc<[String]>,
    f: G,
) -> BoxFuture<'static, ListenerResult>
where
    E: Event,
    G: FnOnce(EventContext<E>) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoListenerResult,
{
    let Some(typed) = event.downcast_arc::<E>() else {
        return ready(Err(ListenerError::EventMismatch {
            listener: listener.to_string(),
            expected: std::any::type_name::<E>(),
            found: event.class().name(),
        }))
        .boxed();
    };

    let listener = Arc::clone(listener);
    let fut = f(EventContext::new(typed, matched_keys));
    async move {
        fut.await
            .into_listener_result()
            .map_err(|source| ListenerError::handler(listener.as_ref(), source))
    }
    .boxed()
}

/// Narrows `event` when the listener declared an exchange view.
fn adapt_event<A>(
    listener: &str,
    payload_type: Option<&PayloadType>,
    event: BoxedEvent,
    adapt: A,
) -> Result<BoxedEvent, ListenerError>
where
    A: FnOnce(&BoxedEvent, &PayloadType) -> PayloadResult<BoxedEvent>,
{
    match payload_type {
        Some(target) if target.is_exchange() => {
            adapt(&event, target).map_err(|source| ListenerError::Adapt {
                listener: listener.to_string(),
                source,
            })
        }
        _ => Ok(event),
    }
}

// ============================================================================
// Subscribe Invoker
// ============================================================================

/// Invoker binding a component to one of its handler methods.
pub struct SubscribeInvoker<B> {
    bean: Arc<B>,
    method: HandlerMethod<B>,
    payload_type: Option<PayloadType>,
    resolver: Arc<ListenerParameterResolver>,
}

impl<B: Send + Sync + 'static> SubscribeInvoker<B> {
    pub fn new(
        bean: Arc<B>,
        method: HandlerMethod<B>,
        payload_type: Option<PayloadType>,
        resolver: Arc<ListenerParameterResolver>,
    ) -> Self {
        Self {
            bean,
            method,
            payload_type,
            resolver,
        }
    }

    /// Returns the payload type resolved at registration.
    pub fn payload_type(&self) -> Option<&PayloadType> {
        self.payload_type.as_ref()
    }
}

#[async_trait]
impl<B: Send + Sync + 'static> EventInvoker for SubscribeInvoker<B> {
    fn name(&self) -> &str {
        self.method.name()
    }

    async fn invoke(&self, event: BoxedEvent, matched_keys: Arc<[String]>) -> ListenerResult {
        let event = adapt_event(
            self.name(),
            self.payload_type.as_ref(),
            event,
            |event, target| self.resolver.resolve_event(event, target, &matched_keys),
        )?;
        (self.method.call)(Arc::clone(&self.bean), event, matched_keys).await
    }
}

// ============================================================================
// Function Invoker
// ============================================================================

type InvokeFn =
    Arc<dyn Fn(BoxedEvent, Arc<[String]>) -> BoxFuture<'static, ListenerResult> + Send + Sync>;

/// Invoker wrapping a closure.
///
/// A closure declared over `ExchangeEvent<V>` through [`FnInvoker::exchange`]
/// must be registered under the raw `ExchangeEvent` class.
pub struct FnInvoker {
    name: String,
    payload_type: Option<PayloadType>,
    adapter: Arc<dyn PayloadAdapter>,
    call: InvokeFn,
}

impl FnInvoker {
    /// Wraps a closure receiving the type-erased event.
    pub fn new<F, Fut, R>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(BoxedEvent, Arc<[String]>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoListenerResult,
    {
        let name = name.into();
        let listener: Arc<str> = Arc::from(name.as_str());
        let call: InvokeFn = Arc::new(move |event, matched_keys| {
            let listener = Arc::clone(&listener);
            let fut = f(event, matched_keys);
            async move {
                fut.await
                    .into_listener_result()
                    .map_err(|source| ListenerError::handler(listener.as_ref(), source))
            }
            .boxed()
        });
        Self::from_call(name, None, call)
    }

    /// Wraps a closure receiving `EventContext<E>`.
    pub fn typed<E, F, Fut, R>(name: impl Into<String>, f: F) -> Self
    where
        E: Event,
        F: Fn(EventContext<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoListenerResult,
    {
        let name = name.into();
        let listener: Arc<str> = Arc::from(name.as_str());
        let call: InvokeFn = Arc::new(move |event, matched_keys| {
            call_typed::<E, _, _, _>(&listener, event, matched_keys, &f)
        });
        Self::from_call(name, None, call)
    }

    /// Wraps a closure receiving a narrowed `ExchangeEvent<V>`.
    pub fn exchange<V, F, Fut, R>(name: impl Into<String>, f: F) -> Self
    where
        V: ExchangeView,
        F: Fn(EventContext<ExchangeEvent<V>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoListenerResult,
    {
        let mut invoker = Self::typed(name, f);
        invoker.payload_type = Some(PayloadType::exchange::<V>());
        invoker
    }

    /// Replaces the adapter used for exchange payloads.
    pub fn with_adapter(mut self, adapter: Arc<dyn PayloadAdapter>) -> Self {
        self.adapter = adapter;
        self
    }

    fn from_call(name: String, payload_type: Option<PayloadType>, call: InvokeFn) -> Self {
        Self {
            name,
            payload_type,
            adapter: Arc::new(FilteringPayloadAdapter),
            call,
        }
    }
}

#[async_trait]
impl EventInvoker for FnInvoker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, event: BoxedEvent, matched_keys: Arc<[String]>) -> ListenerResult {
        let event = adapt_event(
            &self.name,
            self.payload_type.as_ref(),
            event,
            |event, target| self.adapter.adapt(event, target, &matched_keys),
        )?;
        (self.call)(event, matched_keys).await
    }
}

impl fmt::Debug for FnInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInvoker")
            .field("name", &self.name)
            .field("payload_type", &self.payload_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaver_core::{ExchangePayload, IdentityKey};

    struct Counter {
        offset: i64,
    }

    fn report() -> BoxedEvent {
        BoxedEvent::new(ExchangeEvent::of(
            "REPORT_EVENT",
            ExchangePayload::new()
                .with("temperature", 21)
                .with("humidity", 50),
        ))
    }

    fn keys(keys: &[&str]) -> Arc<[String]> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn test_subscribe_invoker_adapts_exchange_payload() {
        let method = HandlerMethod::exchange::<ExchangePayload, _, _, _>(
            "on_report",
            |bean: Arc<Counter>, event| async move {
                let seen: Vec<String> = event.payload().keys().map(str::to_string).collect();
                EventResponse::of("seen", seen.join(",")).with("offset", bean.offset)
            },
        );
        let payload_type = Some(PayloadType::exchange::<ExchangePayload>());
        let invoker = SubscribeInvoker::new(
            Arc::new(Counter { offset: 7 }),
            method,
            payload_type,
            Arc::new(ListenerParameterResolver::default()),
        );

        let response = invoker
            .invoke(report(), keys(&["temperature"]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response.get("seen").unwrap(), "temperature");
        assert_eq!(response.get("offset").unwrap(), 7);
        assert_eq!(invoker.name(), "on_report");
    }

    #[tokio::test]
    async fn test_subscribe_invoker_propagates_handler_error() {
        let method = HandlerMethod::event::<ExchangeEvent, _, _, _>(
            "failing",
            |_: Arc<Counter>, _| async move { Err::<(), _>("sensor offline") },
        );
        let invoker = SubscribeInvoker::new(
            Arc::new(Counter { offset: 0 }),
            method,
            None,
            Arc::new(ListenerParameterResolver::default()),
        );

        let error = invoker
            .invoke(report(), keys(&["temperature"]))
            .await
            .unwrap_err();
        assert_eq!(error.listener(), "failing");
        assert_eq!(error.into_cause().to_string(), "sensor offline");
    }

    #[tokio::test]
    async fn test_event_mismatch() {
        struct Other;
        impl IdentityKey for Other {
            fn identity_key(&self) -> String {
                String::new()
            }
        }
        impl Event for Other {
            fn event_type(&self) -> &str {
                "other"
            }
            fn payload_key(&self) -> &str {
                ""
            }
            fn payload(&self) -> &dyn IdentityKey {
                self
            }
        }

        let invoker = FnInvoker::typed("typed", |_: EventContext<ExchangeEvent>| async {});
        let error = invoker
            .invoke(BoxedEvent::new(Other), keys(&[]))
            .await
            .unwrap_err();

        assert!(matches!(error, ListenerError::EventMismatch { .. }));
    }

    #[tokio::test]
    async fn test_fn_invoker_exchange_view() {
        let invoker =
            FnInvoker::exchange::<ExchangePayload, _, _, _>("dynamic", |event| async move {
                EventResponse::of("keys", event.payload().identity_key())
                    .with("matched", event.matched_keys().len())
            });

        let response = invoker
            .invoke(report(), keys(&["humidity"]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response.get("keys").unwrap(), "humidity");
        assert_eq!(response.get("matched").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_fn_invoker_raw_event() {
        let invoker = FnInvoker::new("raw", |event: BoxedEvent, matched: Arc<[String]>| async move {
            Some(EventResponse::of(event.event_type(), matched.join("|")))
        });

        let response = invoker
            .invoke(report(), keys(&["humidity", "temperature"]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response.get("REPORT_EVENT").unwrap(), "humidity|temperature");
    }
}
