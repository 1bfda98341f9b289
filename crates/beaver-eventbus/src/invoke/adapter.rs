//! Payload adaptation.

use beaver_core::{BoxedEvent, Event, ExchangeEvent, ExchangePayload, PayloadError, PayloadResult};

use super::signature::PayloadType;

/// Narrows a raw event's payload to the view a listener declared.
pub trait PayloadAdapter: Send + Sync {
    /// Builds the event handed to a listener declaring `target`, restricted to
    /// `matched_keys`.
    fn adapt(
        &self,
        event: &BoxedEvent,
        target: &PayloadType,
        matched_keys: &[String],
    ) -> PayloadResult<BoxedEvent>;
}

/// Default adapter: keeps only the matched entries of an
/// `ExchangeEvent<ExchangePayload>` and builds the declared view from them.
///
/// The adapted event keeps the original event type; its payload key is the
/// matched keys joined with `,`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FilteringPayloadAdapter;

impl PayloadAdapter for FilteringPayloadAdapter {
    fn adapt(
        &self,
        event: &BoxedEvent,
        target: &PayloadType,
        matched_keys: &[String],
    ) -> PayloadResult<BoxedEvent> {
        let factory = target.view_factory().ok_or(PayloadError::NoView {
            target: target.name(),
        })?;
        let raw = event
            .downcast_ref::<ExchangeEvent>()
            .ok_or(PayloadError::NotExchange {
                found: event.class().name(),
            })?;

        let narrowed = ExchangePayload::create_from(raw.payload(), matched_keys);
        factory(raw.event_type(), matched_keys.join(","), narrowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaver_core::{ExchangeView, IdentityKey};

    struct Temperature {
        celsius: f64,
    }

    impl IdentityKey for Temperature {
        fn identity_key(&self) -> String {
            "temperature".to_string()
        }
    }

    impl ExchangeView for Temperature {
        fn from_exchange(payload: ExchangePayload) -> PayloadResult<Self> {
            Ok(Self {
                celsius: payload.get_as("temperature")?,
            })
        }
    }

    fn report() -> BoxedEvent {
        BoxedEvent::new(ExchangeEvent::of(
            "REPORT_EVENT",
            ExchangePayload::new()
                .with("temperature", 22.5)
                .with("humidity", 40),
        ))
    }

    #[test]
    fn test_narrows_raw_payload() {
        let adapted = FilteringPayloadAdapter
            .adapt(
                &report(),
                &PayloadType::exchange::<ExchangePayload>(),
                &["temperature".to_string()],
            )
            .unwrap();

        let event = adapted.downcast_ref::<ExchangeEvent>().unwrap();
        assert_eq!(event.payload().keys().collect::<Vec<_>>(), vec!["temperature"]);
        assert_eq!(event.payload_key(), "temperature");
        assert_eq!(event.event_type(), "REPORT_EVENT");
    }

    #[test]
    fn test_builds_typed_view() {
        let adapted = FilteringPayloadAdapter
            .adapt(
                &report(),
                &PayloadType::exchange::<Temperature>(),
                &["temperature".to_string()],
            )
            .unwrap();

        let event = adapted.downcast_ref::<ExchangeEvent<Temperature>>().unwrap();
        assert_eq!(event.payload().celsius, 22.5);
    }

    #[test]
    fn test_view_sees_only_matched_keys() {
        let result = FilteringPayloadAdapter.adapt(
            &report(),
            &PayloadType::exchange::<Temperature>(),
            &["humidity".to_string()],
        );
        assert!(matches!(result, Err(PayloadError::MissingKey { .. })));
    }

    #[test]
    fn test_rejects_non_exchange_target() {
        let result = FilteringPayloadAdapter.adapt(
            &report(),
            &PayloadType::of::<ExchangePayload>(),
            &["temperature".to_string()],
        );
        assert!(matches!(result, Err(PayloadError::NoView { .. })));
    }
}
