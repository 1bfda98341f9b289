//! Error types for payload access and adaptation.

use thiserror::Error;

/// Errors raised while reading or narrowing an event payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// A key required by a typed view is absent from the payload.
    #[error("payload key '{key}' is missing")]
    MissingKey {
        /// The missing key.
        key: String,
    },

    /// A payload value could not be decoded into the requested type.
    #[error("payload key '{key}' cannot be read as {expected}: {source}")]
    Decode {
        /// The key whose value failed to decode.
        key: String,
        /// Name of the requested type.
        expected: &'static str,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The event handed to an adapter does not carry an exchange payload.
    #[error("event '{found}' does not carry an exchange payload")]
    NotExchange {
        /// Class name of the offending event.
        found: &'static str,
    },

    /// The requested payload type cannot be built from an exchange payload.
    #[error("payload type '{target}' has no exchange view")]
    NoView {
        /// Name of the requested payload type.
        target: &'static str,
    },
}

impl PayloadError {
    /// Creates a missing key error.
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::MissingKey { key: key.into() }
    }
}

/// Result type for payload operations.
pub type PayloadResult<T> = Result<T, PayloadError>;
