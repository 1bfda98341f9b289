//! Device Status Example
//!
//! Wires a small device service onto the Beaver event bus:
//!
//! - `DeviceService` subscribes declaratively to status changes and
//!   temperature reports
//! - `Temperature` is a typed view over the `temperature` entry of an
//!   exchange payload
//! - `AuditInterceptor` observes every exchange dispatch and acknowledges
//!   listener failures
//! - a humidity alert is subscribed dynamically and removed again
//!
//! # Usage
//!
//! ```bash
//! BEAVER_LOGGING__LEVEL=debug cargo run --package device-status
//! ```

use std::time::Duration;

use anyhow::Result;
use beaver::eventbus::EventBusExecutionError;
use beaver::prelude::*;
use serde::Serialize;
use tracing::{error, info, warn};

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    fn event_type(self) -> &'static str {
        match self {
            Self::Online => "DEVICE_ONLINE",
            Self::Offline => "DEVICE_OFFLINE",
        }
    }
}

#[derive(Debug)]
struct Device {
    key: String,
}

impl IdentityKey for Device {
    fn identity_key(&self) -> String {
        self.key.clone()
    }
}

/// A device went online or offline.
#[derive(Debug)]
struct DeviceStatusEvent {
    status: DeviceStatus,
    device: Device,
}

impl DeviceStatusEvent {
    fn new(key: &str, status: DeviceStatus) -> Self {
        Self {
            status,
            device: Device {
                key: key.to_string(),
            },
        }
    }
}

impl Event for DeviceStatusEvent {
    fn event_type(&self) -> &str {
        self.status.event_type()
    }

    fn payload_key(&self) -> &str {
        &self.device.key
    }

    fn payload(&self) -> &dyn IdentityKey {
        &self.device
    }
}

/// Typed view over a temperature report.
struct Temperature {
    payload: ExchangePayload,
    celsius: f64,
}

impl IdentityKey for Temperature {
    fn identity_key(&self) -> String {
        self.payload.identity_key()
    }
}

impl ExchangeView for Temperature {
    fn from_exchange(payload: ExchangePayload) -> PayloadResult<Self> {
        let celsius = payload.get_as("temperature")?;
        Ok(Self { payload, celsius })
    }
}

// ============================================================================
// Subscribers
// ============================================================================

#[derive(Default)]
struct DeviceService;

impl DeviceService {
    async fn on_status(&self, event: EventContext<DeviceStatusEvent>) -> Result<EventResponse> {
        info!(
            device = event.payload_key(),
            status = event.event_type(),
            "Device status changed"
        );
        Ok(EventResponse::of(
            event.payload_key(),
            serde_json::to_value(event.status)?,
        ))
    }

    async fn on_temperature(
        &self,
        event: EventContext<ExchangeEvent<Temperature>>,
    ) -> EventResponse {
        let reading = event.payload();
        info!(celsius = reading.celsius, keys = ?event.matched_keys(), "Temperature reported");
        EventResponse::of("temperature_alarm", reading.celsius > 30.0)
    }

    async fn on_battery(&self, event: EventContext<ExchangeEvent>) -> Result<()> {
        let level: u8 = event.payload().get_as("battery")?;
        anyhow::ensure!(level > 5, "battery critically low: {level}%");
        Ok(())
    }
}

impl EventSubscriber for DeviceService {
    fn subscriptions() -> Vec<SubscribeDefinition<Self>> {
        vec![
            SubscribeDefinition::new(
                EventSubscribe::new("sensor-*")
                    .event_type(DeviceStatus::Online.event_type())
                    .event_type(DeviceStatus::Offline.event_type()),
                HandlerMethod::event::<DeviceStatusEvent, _, _, _>(
                    "DeviceService::on_status",
                    |service: Arc<Self>, event| async move { service.on_status(event).await },
                ),
            ),
            SubscribeDefinition::new(
                EventSubscribe::new("temperature").event_type(REPORT_EVENT),
                HandlerMethod::exchange::<Temperature, _, _, _>(
                    "DeviceService::on_temperature",
                    |service: Arc<Self>, event| async move { service.on_temperature(event).await },
                ),
            ),
            SubscribeDefinition::new(
                EventSubscribe::new("battery").event_type(REPORT_EVENT),
                HandlerMethod::event::<ExchangeEvent, _, _, _>(
                    "DeviceService::on_battery",
                    |service: Arc<Self>, event| async move { service.on_battery(event).await },
                ),
            ),
        ]
    }
}

// ============================================================================
// Interceptors
// ============================================================================

struct AuditInterceptor;

impl EventInterceptor<ExchangeEvent> for AuditInterceptor {
    fn before_handle(&self, event: &ExchangeEvent) -> bool {
        if event.payload().is_empty() {
            warn!(event_type = event.event_type(), "Rejecting empty report");
            return false;
        }
        true
    }

    fn after_handle(
        &self,
        event: &ExchangeEvent,
        response: &EventResponse,
        error: Option<&EventBusExecutionError>,
    ) {
        match error {
            Some(error) => error!(
                payload_key = event.payload_key(),
                error = %error,
                "Report handled with failures"
            ),
            None => info!(
                payload_key = event.payload_key(),
                response_keys = response.len(),
                "Report handled"
            ),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let runtime = EventBusRuntime::builder()
        .interceptor::<ExchangeEvent, _>(AuditInterceptor)
        .subscriber(Arc::new(DeviceService))
        .build()?;
    let dispatcher = runtime.dispatcher();

    // Fire-and-forget status changes
    dispatcher.publish(BoxedEvent::new(DeviceStatusEvent::new(
        "sensor-1",
        DeviceStatus::Online,
    )))?;
    dispatcher.publish(BoxedEvent::new(DeviceStatusEvent::new(
        "gateway-1",
        DeviceStatus::Offline,
    )))?;

    // Dynamic humidity alert
    let alert_key = UniqueListenerCacheKey::new("humidity-alert", "humidity", [REPORT_EVENT]);
    dispatcher.register_dynamic_subscribe(
        EventClass::of::<ExchangeEvent>(),
        alert_key.clone(),
        Arc::new(FnInvoker::exchange::<ExchangePayload, _, _, _>(
            "humidity-alert",
            |event| async move {
                let humidity: f64 = event.payload().get_as("humidity")?;
                Ok::<_, PayloadError>(EventResponse::of("humidity_alarm", humidity > 80.0))
            },
        )),
    );

    // Synchronous report, aggregated across listeners
    let report = ExchangePayload::new()
        .with("temperature", 32.5)
        .with("humidity", 85)
        .with("battery", 3);
    let response = dispatcher
        .handle(BoxedEvent::new(ExchangeEvent::of(REPORT_EVENT, report)))
        .await?;
    info!(response = %serde_json::to_string(&response)?, "Report response");

    dispatcher.deregister_dynamic_subscribe(EventClass::of::<ExchangeEvent>(), &alert_key);
    info!(stats = %dispatcher.stats(), "Subscriptions");

    runtime
        .run_until(tokio::time::sleep(Duration::from_millis(200)))
        .await?;
    Ok(())
}
