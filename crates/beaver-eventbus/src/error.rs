//! Error types for the dispatch engine.
//!
//! - [`ConfigurationError`] - fatal wiring mistakes, surfaced at registration,
//!   interceptor discovery or the first `publish`
//! - [`ListenerError`] - a single listener failed
//! - [`EventBusExecutionError`] - every listener failure of one `handle` call
//! - [`EventBusError`] - what `publish` / `handle` return

use beaver_core::{EventResponse, PayloadError};
use thiserror::Error;

/// Boxed error raised by listener code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Wiring errors. None of them are recoverable at dispatch time.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A handler signature has no parameter at all.
    #[error("handler '{handler}' declares no parameters, expected an event")]
    MissingParameter {
        /// Handler name.
        handler: String,
    },

    /// The first parameter of a handler is not an event.
    #[error("first parameter of handler '{handler}' must be an event, found '{found}'")]
    NotAnEvent {
        /// Handler name.
        handler: String,
        /// Type name of the offending parameter.
        found: &'static str,
    },

    /// A handler declares a payload type without the identity capability.
    #[error("payload type '{payload}' of handler '{handler}' does not implement IdentityKey")]
    PayloadNotIdentity {
        /// Handler name.
        handler: String,
        /// Type name of the declared payload.
        payload: &'static str,
    },

    /// An interceptor does not declare the event class it targets.
    #[error("interceptor '{interceptor}' does not declare a concrete event class")]
    InterceptorWithoutTarget {
        /// Interceptor name.
        interceptor: String,
    },

    /// No task executor name is configured.
    #[error("event bus task executor is not configured")]
    ExecutorNotConfigured,

    /// The configured task executor is not registered.
    #[error("event bus task executor '{name}' not found")]
    ExecutorNotFound {
        /// The configured executor name.
        name: String,
    },
}

// =============================================================================
// Listener Errors
// =============================================================================

/// Failure of a single listener invocation.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listener itself returned an error.
    #[error("listener '{listener}' failed: {source}")]
    Handler {
        listener: String,
        #[source]
        source: BoxError,
    },

    /// The payload could not be narrowed to the declared view.
    #[error("listener '{listener}' could not adapt payload: {source}")]
    Adapt {
        listener: String,
        #[source]
        source: PayloadError,
    },

    /// The listener received an event of a different class.
    #[error("listener '{listener}' expects '{expected}', received '{found}'")]
    EventMismatch {
        listener: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The listener panicked.
    #[error("listener '{listener}' panicked: {message}")]
    Panicked { listener: String, message: String },
}

impl ListenerError {
    /// Creates a handler error.
    pub fn handler(listener: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Handler {
            listener: listener.into(),
            source: source.into(),
        }
    }

    /// Returns the name of the failed listener.
    pub fn listener(&self) -> &str {
        match self {
            Self::Handler { listener, .. }
            | Self::Adapt { listener, .. }
            | Self::EventMismatch { listener, .. }
            | Self::Panicked { listener, .. } => listener,
        }
    }

    /// Strips the invocation wrapper and returns the root cause.
    ///
    /// For [`ListenerError::Handler`] this is the error the listener returned;
    /// every other variant is its own cause.
    pub fn into_cause(self) -> BoxError {
        match self {
            Self::Handler { source, .. } => source,
            other => Box::new(other),
        }
    }
}

// =============================================================================
// Execution Errors
// =============================================================================

/// Aggregate of every listener failure recorded during one `handle` call.
#[derive(Debug, Error)]
#[error("EventSubscribe method invoke error: {} listener(s) failed", .causes.len())]
pub struct EventBusExecutionError {
    causes: Vec<BoxError>,
}

impl EventBusExecutionError {
    pub fn new(causes: Vec<BoxError>) -> Self {
        Self { causes }
    }

    /// Returns the root causes in listener execution order.
    pub fn causes(&self) -> &[BoxError] {
        &self.causes
    }

    pub fn into_causes(self) -> Vec<BoxError> {
        self.causes
    }
}

/// Errors returned by the event bus entry points.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// Wiring error, e.g. the task executor cannot be resolved.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Listener failures no interceptor acknowledged.
    ///
    /// `response` holds what the successful listeners contributed.
    #[error("{error}")]
    Execution {
        #[source]
        error: EventBusExecutionError,
        response: EventResponse,
    },
}

impl EventBusError {
    /// Returns the aggregate execution error, if any.
    pub fn execution_error(&self) -> Option<&EventBusExecutionError> {
        match self {
            Self::Execution { error, .. } => Some(error),
            Self::Configuration(_) => None,
        }
    }

    /// Returns the response collected before the error was raised.
    pub fn partial_response(&self) -> Option<&EventResponse> {
        match self {
            Self::Execution { response, .. } => Some(response),
            Self::Configuration(_) => None,
        }
    }
}

/// Result type for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("sensor offline")]
    struct SensorOffline;

    #[test]
    fn test_into_cause_unwraps_handler_error() {
        let error = ListenerError::handler("on_report", SensorOffline);
        assert_eq!(error.listener(), "on_report");

        let cause = error.into_cause();
        assert!(cause.downcast_ref::<SensorOffline>().is_some());
    }

    #[test]
    fn test_into_cause_keeps_other_variants() {
        let error = ListenerError::Panicked {
            listener: "on_report".to_string(),
            message: "boom".to_string(),
        };

        let cause = error.into_cause();
        assert!(matches!(
            cause.downcast_ref::<ListenerError>(),
            Some(ListenerError::Panicked { .. })
        ));
    }

    #[test]
    fn test_execution_error_message() {
        let error = EventBusExecutionError::new(vec![Box::new(SensorOffline)]);
        assert_eq!(
            error.to_string(),
            "EventSubscribe method invoke error: 1 listener(s) failed"
        );
        assert_eq!(error.causes()[0].to_string(), "sensor offline");
    }
}
