//! Conversion of handler return values.

use beaver_core::EventResponse;

use crate::error::BoxError;

/// Types a listener may return.
///
/// - `()` contributes nothing
/// - `EventResponse` / `Option<EventResponse>` contribute to the aggregate
///   response of a synchronous dispatch
/// - `Result<T, E>` fails the listener on `Err`
pub trait IntoListenerResult: Send {
    fn into_listener_result(self) -> Result<Option<EventResponse>, BoxError>;
}

impl IntoListenerResult for () {
    fn into_listener_result(self) -> Result<Option<EventResponse>, BoxError> {
        Ok(None)
    }
}

impl IntoListenerResult for EventResponse {
    fn into_listener_result(self) -> Result<Option<EventResponse>, BoxError> {
        Ok(Some(self))
    }
}

impl IntoListenerResult for Option<EventResponse> {
    fn into_listener_result(self) -> Result<Option<EventResponse>, BoxError> {
        Ok(self)
    }
}

impl<T, E> IntoListenerResult for Result<T, E>
where
    T: IntoListenerResult,
    E: Into<BoxError> + Send,
{
    fn into_listener_result(self) -> Result<Option<EventResponse>, BoxError> {
        match self {
            Ok(value) => value.into_listener_result(),
            Err(error) => Err(error.into()),
        }
    }
}
