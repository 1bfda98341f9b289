//! Exchange events: the concrete event variant over a key/value payload.

use std::fmt;

use crate::event::Event;
use crate::payload::{ExchangePayload, IdentityKey};

/// Well-known exchange event types.
pub mod exchange_event_type {
    /// A device or integration reported a data point.
    pub const REPORT_EVENT: &str = "REPORT_EVENT";
    /// An entity property should be written.
    pub const UPDATE_PROPERTY: &str = "UPDATE_PROPERTY";
    /// An integration service should be invoked.
    pub const CALL_SERVICE: &str = "CALL_SERVICE";
}

/// An event whose payload is an exchange payload or a typed view over one.
///
/// `ExchangeEvent<ExchangePayload>` is the raw form producers publish. It is
/// also the registry bucket for every listener declaring a typed
/// `ExchangeEvent<V>`: those listeners receive a view narrowed to their
/// matched keys.
///
/// # Example
///
/// ```rust,ignore
/// let payload = ExchangePayload::new().with("temperature", 23.0);
/// bus.publish(BoxedEvent::new(ExchangeEvent::of(REPORT_EVENT, payload)))?;
/// ```
pub struct ExchangeEvent<P = ExchangePayload> {
    event_type: String,
    payload_key: String,
    payload: P,
}

impl<P: IdentityKey> ExchangeEvent<P> {
    /// Creates an event whose payload key is the payload's identity.
    pub fn of(event_type: impl Into<String>, payload: P) -> Self {
        let payload_key = payload.identity_key();
        Self {
            event_type: event_type.into(),
            payload_key,
            payload,
        }
    }

    /// Creates an event with an explicit payload key.
    pub fn with_payload_key(
        event_type: impl Into<String>,
        payload_key: impl Into<String>,
        payload: P,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            payload_key: payload_key.into(),
            payload,
        }
    }

    /// Returns the typed payload.
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Consumes the event, returning the payload.
    pub fn into_payload(self) -> P {
        self.payload
    }
}

impl<P: IdentityKey + 'static> Event for ExchangeEvent<P> {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn payload_key(&self) -> &str {
        &self.payload_key
    }

    fn payload(&self) -> &dyn IdentityKey {
        &self.payload
    }
}

impl<P: Clone> Clone for ExchangeEvent<P> {
    fn clone(&self) -> Self {
        Self {
            event_type: self.event_type.clone(),
            payload_key: self.payload_key.clone(),
            payload: self.payload.clone(),
        }
    }
}

impl<P: fmt::Debug> fmt::Debug for ExchangeEvent<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeEvent")
            .field("event_type", &self.event_type)
            .field("payload_key", &self.payload_key)
            .field("payload", &self.payload)
            .finish()
    }
}
