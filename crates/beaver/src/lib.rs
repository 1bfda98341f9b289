//! # Beaver
//!
//! In-process event bus for the Beaver IoT integration platform.
//!
//! ## Overview
//!
//! Components publish domain events (device reports, property updates,
//! service calls) and other components subscribe to them, either
//! declaratively through an explicit registration pass at startup or
//! dynamically at runtime. Each event reaches only the listeners whose
//! event-type and payload-key filters match it.
//!
//! ```text
//! ┌──────────┐  publish   ┌────────────┐  submit   ┌──────────────────┐
//! │ Producer │──────────▶│ Dispatcher │─────────▶│ Task executor    │──▶ listeners
//! │          │  handle    │            │           └──────────────────┘
//! │          │──────────▶│ pre/after  │─────────────────────────────────▶ listeners (in order)
//! └──────────┘            │ intercept  │◀──────── merged EventResponse
//!                         └────────────┘
//! ```
//!
//! - **Core**: event model, exchange payloads and responses
//! - **Event bus**: registries, matching, interceptors and dispatch
//! - **Runtime**: configuration, logging, executors and wiring
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use beaver::prelude::*;
//!
//! struct DeviceService;
//!
//! impl EventSubscriber for DeviceService {
//!     fn subscriptions() -> Vec<SubscribeDefinition<Self>> {
//!         vec![SubscribeDefinition::new(
//!             EventSubscribe::new("temperature").event_type(REPORT_EVENT),
//!             HandlerMethod::exchange::<Temperature, _, _, _>("on_temperature", on_temperature),
//!         )]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = EventBusRuntime::builder()
//!         .subscriber(Arc::new(DeviceService))
//!         .build()?;
//!
//!     runtime.dispatcher().publish(BoxedEvent::new(report))?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use beaver_core as core;
pub use beaver_eventbus as eventbus;
pub use beaver_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use beaver::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use beaver_runtime::{BeaverConfig, EventBusRuntime, RuntimeError};

    // Event model
    pub use beaver_core::exchange_event_type::{CALL_SERVICE, REPORT_EVENT, UPDATE_PROPERTY};
    pub use beaver_core::{
        BoxedEvent, Event, EventClass, EventContext, EventResponse, ExchangeEvent,
        ExchangePayload, ExchangeView, IdentityKey, PayloadError, PayloadResult,
    };

    // Subscriptions and dispatch
    pub use beaver_eventbus::{
        EventBus, EventBusDispatcher, EventBusError, EventInterceptor, EventInvoker,
        EventSubscribe, EventSubscriber, FnInvoker, HandlerMethod, SubscribeDefinition,
        UniqueListenerCacheKey, interceptor,
    };

    // Logging
    pub use beaver_runtime::prelude::*;

    pub use std::sync::Arc;
}
