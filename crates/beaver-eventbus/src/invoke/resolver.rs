//! Registration-time resolution of handler parameters.

use std::sync::Arc;

use beaver_core::{BoxedEvent, EventClass, ExchangeEvent, PayloadResult};

use super::adapter::{FilteringPayloadAdapter, PayloadAdapter};
use super::signature::{HandlerSignature, ParameterType, PayloadType};
use crate::error::ConfigurationError;

/// Resolves where a handler is bucketed and which payload it expects.
///
/// Resolution only runs at registration. On the dispatch path the resolver
/// is used through [`resolve_event`](Self::resolve_event), which delegates
/// to its [`PayloadAdapter`].
#[derive(Clone)]
pub struct ListenerParameterResolver {
    adapter: Arc<dyn PayloadAdapter>,
}

impl Default for ListenerParameterResolver {
    fn default() -> Self {
        Self::new(Arc::new(FilteringPayloadAdapter))
    }
}

impl ListenerParameterResolver {
    pub fn new(adapter: Arc<dyn PayloadAdapter>) -> Self {
        Self { adapter }
    }

    /// Returns the event class the handler is bucketed under.
    ///
    /// Handlers declaring an exchange-capable generic payload are bucketed
    /// under the raw `ExchangeEvent`, since that is what producers publish.
    pub fn resolve_actual_event_type(
        &self,
        signature: &HandlerSignature,
    ) -> Result<EventClass, ConfigurationError> {
        match first_parameter(signature)? {
            ParameterType::Event(class) => Ok(*class),
            ParameterType::GenericEvent { declared, payload } => {
                if payload.is_exchange() {
                    Ok(EventClass::of::<ExchangeEvent>())
                } else {
                    Ok(*declared)
                }
            }
            ParameterType::Other { name } => Err(ConfigurationError::NotAnEvent {
                handler: signature.name().to_string(),
                found: name,
            }),
        }
    }

    /// Returns the payload type of a generic event parameter, or `None` if
    /// the parameter is not generic.
    pub fn resolve_parameter_types(
        &self,
        signature: &HandlerSignature,
    ) -> Result<Option<PayloadType>, ConfigurationError> {
        match first_parameter(signature)? {
            ParameterType::GenericEvent { payload, .. } => {
                if !payload.is_identity_key() {
                    return Err(ConfigurationError::PayloadNotIdentity {
                        handler: signature.name().to_string(),
                        payload: payload.name(),
                    });
                }
                Ok(Some(*payload))
            }
            ParameterType::Event(_) | ParameterType::Other { .. } => Ok(None),
        }
    }

    /// Adapts `event` to the payload type a listener declared.
    pub fn resolve_event(
        &self,
        event: &BoxedEvent,
        payload_type: &PayloadType,
        matched_keys: &[String],
    ) -> PayloadResult<BoxedEvent> {
        self.adapter.adapt(event, payload_type, matched_keys)
    }
}

fn first_parameter(signature: &HandlerSignature) -> Result<&ParameterType, ConfigurationError> {
    signature
        .parameters()
        .first()
        .ok_or_else(|| ConfigurationError::MissingParameter {
            handler: signature.name().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaver_core::{Event, ExchangePayload, IdentityKey};

    struct Device;

    impl IdentityKey for Device {
        fn identity_key(&self) -> String {
            "device".to_string()
        }
    }

    struct DeviceEvent<P = Device>(P);

    impl<P: IdentityKey + 'static> Event for DeviceEvent<P> {
        fn event_type(&self) -> &str {
            "device.update"
        }

        fn payload_key(&self) -> &str {
            "device"
        }

        fn payload(&self) -> &dyn IdentityKey {
            &self.0
        }
    }

    fn signature(parameter: ParameterType) -> HandlerSignature {
        HandlerSignature::new("handler").parameter(parameter)
    }

    #[test]
    fn test_plain_event() {
        let resolver = ListenerParameterResolver::default();
        let signature = signature(ParameterType::event::<DeviceEvent>());

        assert_eq!(
            resolver.resolve_actual_event_type(&signature).unwrap(),
            EventClass::of::<DeviceEvent>()
        );
        assert_eq!(resolver.resolve_parameter_types(&signature).unwrap(), None);
    }

    #[test]
    fn test_exchange_generic_buckets_under_raw_exchange_event() {
        let resolver = ListenerParameterResolver::default();
        let signature = signature(ParameterType::exchange::<ExchangePayload>());

        assert_eq!(
            resolver.resolve_actual_event_type(&signature).unwrap(),
            EventClass::of::<ExchangeEvent>()
        );
        let payload = resolver.resolve_parameter_types(&signature).unwrap().unwrap();
        assert!(payload.is_exchange());
    }

    #[test]
    fn test_identity_generic_keeps_declared_class() {
        let resolver = ListenerParameterResolver::default();
        let signature = signature(ParameterType::generic_event::<DeviceEvent>(
            PayloadType::of::<Device>(),
        ));

        assert_eq!(
            resolver.resolve_actual_event_type(&signature).unwrap(),
            EventClass::of::<DeviceEvent>()
        );
        assert_eq!(
            resolver.resolve_parameter_types(&signature).unwrap(),
            Some(PayloadType::of::<Device>())
        );
    }

    #[test]
    fn test_missing_parameter() {
        let resolver = ListenerParameterResolver::default();
        let signature = HandlerSignature::new("empty");

        assert!(matches!(
            resolver.resolve_actual_event_type(&signature),
            Err(ConfigurationError::MissingParameter { .. })
        ));
        assert!(matches!(
            resolver.resolve_parameter_types(&signature),
            Err(ConfigurationError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_first_parameter_not_event() {
        let resolver = ListenerParameterResolver::default();
        let signature = signature(ParameterType::other::<String>());

        assert!(matches!(
            resolver.resolve_actual_event_type(&signature),
            Err(ConfigurationError::NotAnEvent { .. })
        ));
    }

    #[test]
    fn test_payload_without_identity() {
        let resolver = ListenerParameterResolver::default();
        let signature = signature(ParameterType::generic_event::<DeviceEvent>(
            PayloadType::opaque::<u64>(),
        ));

        assert!(matches!(
            resolver.resolve_parameter_types(&signature),
            Err(ConfigurationError::PayloadNotIdentity { .. })
        ));
    }
}
