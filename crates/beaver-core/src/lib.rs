//! Beaver Core - event model for the Beaver IoT event bus.
//!
//! This crate defines the data that flows through the bus, independent of how
//! it is dispatched:
//!
//! - [`Event`] / [`BoxedEvent`] / [`EventClass`] - type-erased events and their
//!   stable runtime class
//! - [`EventContext<E>`] - what a typed listener receives
//! - [`IdentityKey`] - the identity-bearing capability required of payloads
//! - [`ExchangePayload`] / [`ExchangeEvent`] / [`ExchangeView`] - generic
//!   key/value payloads and typed views over them
//! - [`EventResponse`] - results aggregated from synchronous listeners
//!
//! # Example
//!
//! ```rust,ignore
//! use beaver_core::{BoxedEvent, ExchangeEvent, ExchangePayload};
//!
//! let payload: ExchangePayload = [
//!     ("temperature".to_string(), 21.5.into()),
//!     ("humidity".to_string(), 40.into()),
//! ]
//! .into_iter()
//! .collect();
//!
//! let event = BoxedEvent::new(ExchangeEvent::of("REPORT_EVENT", payload));
//! assert_eq!(event.payload_key(), "humidity,temperature");
//! ```

pub mod error;
pub mod event;
pub mod exchange;
pub mod payload;
pub mod response;

pub use error::{PayloadError, PayloadResult};
pub use event::{BoxedEvent, Event, EventClass, EventContext, split_payload_key};
pub use exchange::{ExchangeEvent, exchange_event_type};
pub use payload::{ExchangePayload, ExchangeView, IdentityKey};
pub use response::EventResponse;
