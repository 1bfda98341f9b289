//! Declarative subscriptions.
//!
//! Components describe their handler methods once; the host application then
//! hands each component to
//! [`EventBusDispatcher::register_subscriber`](crate::EventBusDispatcher::register_subscriber)
//! during startup.
//!
//! # Example
//!
//! ```rust,ignore
//! struct DeviceService;
//!
//! impl EventSubscriber for DeviceService {
//!     fn subscriptions() -> Vec<SubscribeDefinition<Self>> {
//!         vec![SubscribeDefinition::new(
//!             EventSubscribe::new("device.*.status").event_type("device.update"),
//!             HandlerMethod::event("on_status", |svc: Arc<Self>, event: EventContext<DeviceEvent>| {
//!                 async move { svc.on_status(event).await }
//!             }),
//!         )]
//!     }
//! }
//!
//! dispatcher.register_subscriber(Arc::new(DeviceService))?;
//! ```

use crate::invoke::HandlerMethod;
use crate::key::ListenerCacheKey;

/// Subscription filter declared on a handler method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSubscribe {
    payload_key_expression: String,
    event_types: Vec<String>,
}

impl EventSubscribe {
    pub fn new(payload_key_expression: impl Into<String>) -> Self {
        Self {
            payload_key_expression: payload_key_expression.into(),
            event_types: Vec::new(),
        }
    }

    /// Restricts the subscription to an additional event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types.push(event_type.into());
        self
    }

    pub fn payload_key_expression(&self) -> &str {
        &self.payload_key_expression
    }

    pub fn event_types(&self) -> &[String] {
        &self.event_types
    }

    /// Returns the cache key this subscription is bucketed under.
    pub fn to_cache_key(&self) -> ListenerCacheKey {
        ListenerCacheKey::new(
            self.payload_key_expression.as_str(),
            self.event_types.iter().cloned(),
        )
    }
}

/// A handler method of `B` with its subscription filter.
pub struct SubscribeDefinition<B> {
    subscribe: EventSubscribe,
    method: HandlerMethod<B>,
}

impl<B> SubscribeDefinition<B> {
    pub fn new(subscribe: EventSubscribe, method: HandlerMethod<B>) -> Self {
        Self { subscribe, method }
    }

    pub fn subscribe(&self) -> &EventSubscribe {
        &self.subscribe
    }

    pub fn method(&self) -> &HandlerMethod<B> {
        &self.method
    }

    pub fn into_parts(self) -> (EventSubscribe, HandlerMethod<B>) {
        (self.subscribe, self.method)
    }
}

/// A component exposing declarative subscriptions.
pub trait EventSubscriber: Send + Sync + Sized + 'static {
    /// Returns every handler method of this component with its filter.
    fn subscriptions() -> Vec<SubscribeDefinition<Self>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_subscribe_cache_key() {
        let subscribe = EventSubscribe::new("temperature")
            .event_type("B")
            .event_type("A");

        assert_eq!(subscribe.event_types(), ["B", "A"]);
        assert_eq!(
            subscribe.to_cache_key(),
            ListenerCacheKey::new("temperature", ["A", "B"])
        );
        assert!(EventSubscribe::new("*").to_cache_key().match_event_type("any"));
    }
}
