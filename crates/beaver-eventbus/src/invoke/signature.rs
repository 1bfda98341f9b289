//! Handler signatures.
//!
//! A signature replaces runtime reflection: it states, once at registration,
//! what the handler's first parameter is and which payload type it expects.
//! The typed constructors on [`HandlerMethod`](super::HandlerMethod) derive
//! it from Rust types; [`HandlerSignature::new`] builds one by hand.

use std::any::TypeId;
use std::fmt;

use beaver_core::{
    BoxedEvent, Event, EventClass, ExchangeEvent, ExchangePayload, ExchangeView, IdentityKey,
    PayloadResult,
};

/// Builds an adapted event from `(event_type, payload_key, narrowed payload)`.
pub type ViewFactory = fn(&str, String, ExchangePayload) -> PayloadResult<BoxedEvent>;

/// The payload type a handler declares.
#[derive(Clone, Copy)]
pub struct PayloadType {
    type_id: TypeId,
    name: &'static str,
    identity_key: bool,
    view: Option<ViewFactory>,
}

impl PayloadType {
    /// An identity-capable payload delivered as-is.
    pub fn of<T: IdentityKey + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            identity_key: true,
            view: None,
        }
    }

    /// An exchange view, built from the matched subset of an exchange payload.
    pub fn exchange<V: ExchangeView>() -> Self {
        Self {
            view: Some(build_view::<V>),
            ..Self::of::<V>()
        }
    }

    /// A payload type without the identity capability.
    ///
    /// Registering a handler declaring it fails.
    pub fn opaque<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            identity_key: false,
            view: None,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_identity_key(&self) -> bool {
        self.identity_key
    }

    /// Returns `true` if the payload is built from an exchange payload.
    pub fn is_exchange(&self) -> bool {
        self.view.is_some()
    }

    pub fn view_factory(&self) -> Option<ViewFactory> {
        self.view
    }
}

impl PartialEq for PayloadType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl fmt::Debug for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadType")
            .field("name", &self.name)
            .field("identity_key", &self.identity_key)
            .field("exchange", &self.is_exchange())
            .finish()
    }
}

fn build_view<V: ExchangeView>(
    event_type: &str,
    payload_key: String,
    payload: ExchangePayload,
) -> PayloadResult<BoxedEvent> {
    let view = V::from_exchange(payload)?;
    Ok(BoxedEvent::new(ExchangeEvent::with_payload_key(
        event_type,
        payload_key,
        view,
    )))
}

/// One declared handler parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterType {
    /// A plain event class.
    Event(EventClass),
    /// An event generic over its payload, e.g. `ExchangeEvent<V>`.
    GenericEvent {
        declared: EventClass,
        payload: PayloadType,
    },
    /// Anything that is not an event.
    Other { name: &'static str },
}

impl ParameterType {
    pub fn event<E: Event>() -> Self {
        Self::Event(EventClass::of::<E>())
    }

    pub fn generic_event<E: Event>(payload: PayloadType) -> Self {
        Self::GenericEvent {
            declared: EventClass::of::<E>(),
            payload,
        }
    }

    /// `ExchangeEvent<V>` with an exchange view payload.
    pub fn exchange<V: ExchangeView>() -> Self {
        Self::generic_event::<ExchangeEvent<V>>(PayloadType::exchange::<V>())
    }

    pub fn other<T: ?Sized + 'static>() -> Self {
        Self::Other {
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the type name of the parameter.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Event(class) => class.name(),
            Self::GenericEvent { declared, .. } => declared.name(),
            Self::Other { name } => name,
        }
    }
}

/// Registration-time description of a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerSignature {
    name: String,
    parameters: Vec<ParameterType>,
}

impl HandlerSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
        }
    }

    /// Appends a parameter.
    pub fn parameter(mut self, parameter: ParameterType) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[ParameterType] {
        &self.parameters
    }
}
