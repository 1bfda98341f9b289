//! Event system for the Beaver event bus.
//!
//! - [`Event`] - base trait for everything published on the bus
//! - [`EventClass`] - stable runtime identifier of a concrete event type,
//!   used as the bucketing key of every registry
//! - [`BoxedEvent`] - type-erased, cheaply cloneable event envelope
//! - [`EventContext<E>`] - typed view handed to listeners
//!
//! Events are matched by their *exact* concrete type. There is no
//! inheritance-based fallback: a listener registered for `DeviceEvent` never
//! sees an `EntityEvent`, even if both wrap similar payloads.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use crate::payload::IdentityKey;

// ============================================================================
// Event Class
// ============================================================================

/// Runtime identifier of a concrete event type.
///
/// Equality and hashing only consider the [`TypeId`]; the type name is kept
/// for diagnostics.
#[derive(Clone, Copy)]
pub struct EventClass {
    id: TypeId,
    name: &'static str,
}

impl EventClass {
    /// Returns the class of `E`.
    pub fn of<E: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }

    /// Returns the underlying type id.
    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Returns the fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if this class identifies `E`.
    pub fn is<E: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<E>()
    }
}

impl PartialEq for EventClass {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventClass {}

impl Hash for EventClass {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventClass({})", self.name)
    }
}

impl fmt::Display for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// ============================================================================
// Core Event Trait
// ============================================================================

/// The base trait for all events carried by the bus.
///
/// An event is an immutable envelope with a string discriminator
/// ([`event_type`](Event::event_type)), an identity-bearing payload, and a
/// payload key naming which payload fields are relevant to this instance.
/// Several keys are joined with `,`.
///
/// # Example
///
/// ```rust,ignore
/// struct DeviceEvent {
///     event_type: String,
///     device: Device,
/// }
///
/// impl Event for DeviceEvent {
///     fn event_type(&self) -> &str {
///         &self.event_type
///     }
///
///     fn payload_key(&self) -> &str {
///         &self.device.key
///     }
///
///     fn payload(&self) -> &dyn IdentityKey {
///         &self.device
///     }
/// }
/// ```
pub trait Event: Any + Send + Sync {
    /// Returns the discriminator, e.g. `"entity.update"`.
    fn event_type(&self) -> &str;

    /// Returns the comma-separated payload key(s) of this event.
    fn payload_key(&self) -> &str;

    /// Returns the payload as its identity capability.
    fn payload(&self) -> &dyn IdentityKey;
}

/// Splits a composite payload key into its individual, trimmed entries.
///
/// Empty entries are skipped and order is preserved.
pub fn split_payload_key(payload_key: &str) -> impl Iterator<Item = &str> {
    payload_key
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

// ============================================================================
// Boxed Event
// ============================================================================

/// A type-erased container for events that supports runtime downcasting.
///
/// `BoxedEvent` derefs to `dyn Event`, so trait methods can be called
/// directly:
///
/// ```rust,ignore
/// let event = BoxedEvent::new(my_event);
/// println!("{} {}", event.event_type(), event.payload_key());
/// ```
#[derive(Clone)]
pub struct BoxedEvent {
    inner: Arc<dyn Event>,
    any: Arc<dyn Any + Send + Sync>,
    class: EventClass,
}

impl BoxedEvent {
    /// Creates a new `BoxedEvent` from any type implementing `Event`.
    pub fn new<E: Event>(event: E) -> Self {
        Self::from_arc(Arc::new(event))
    }

    /// Wraps an already shared event without copying it.
    pub fn from_arc<E: Event>(event: Arc<E>) -> Self {
        Self {
            inner: event.clone(),
            any: event,
            class: EventClass::of::<E>(),
        }
    }

    /// Returns the runtime class of the wrapped event.
    pub fn class(&self) -> EventClass {
        self.class
    }

    /// Returns the inner `Arc<dyn Event>`.
    pub fn inner(&self) -> &Arc<dyn Event> {
        &self.inner
    }

    /// Returns `true` if the wrapped event is exactly `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.class.is::<E>()
    }

    /// Attempts to downcast to a concrete event type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.any.downcast_ref()
    }

    /// Attempts to recover the shared concrete event.
    pub fn downcast_arc<E: Event>(&self) -> Option<Arc<E>> {
        Arc::clone(&self.any).downcast::<E>().ok()
    }
}

impl Deref for BoxedEvent {
    type Target = dyn Event;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl fmt::Debug for BoxedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedEvent")
            .field("class", &self.class.name())
            .field("event_type", &self.event_type())
            .field("payload_key", &self.payload_key())
            .finish()
    }
}

// ============================================================================
// Event Context
// ============================================================================

/// Context wrapper handed to typed listeners.
///
/// Derefs to the event itself. [`matched_keys`](Self::matched_keys) holds the
/// subset of the event's payload keys that satisfied the listener's key
/// expression.
///
/// # Example
///
/// ```rust,ignore
/// async fn on_device(event: EventContext<DeviceEvent>) {
///     println!("{} matched {:?}", event.event_type(), event.matched_keys());
/// }
/// ```
pub struct EventContext<E> {
    event: Arc<E>,
    matched_keys: Arc<[String]>,
}

impl<E: Event> EventContext<E> {
    /// Creates a new context.
    pub fn new(event: Arc<E>, matched_keys: Arc<[String]>) -> Self {
        Self {
            event,
            matched_keys,
        }
    }

    /// Returns the shared event.
    pub fn event(&self) -> &Arc<E> {
        &self.event
    }

    /// Returns the payload keys this listener matched.
    pub fn matched_keys(&self) -> &[String] {
        &self.matched_keys
    }

    /// Consumes the context, returning the shared event.
    pub fn into_inner(self) -> Arc<E> {
        self.event
    }
}

impl<E> Clone for EventContext<E> {
    fn clone(&self) -> Self {
        Self {
            event: Arc::clone(&self.event),
            matched_keys: Arc::clone(&self.matched_keys),
        }
    }
}

impl<E> Deref for EventContext<E> {
    type Target = E;

    fn deref(&self) -> &Self::Target {
        &self.event
    }
}

impl<E: fmt::Debug> fmt::Debug for EventContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("event", &self.event)
            .field("matched_keys", &self.matched_keys)
            .finish()
    }
}
