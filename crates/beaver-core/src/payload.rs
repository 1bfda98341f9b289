//! Payload capabilities and the generic exchange payload.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PayloadError, PayloadResult};

/// Identity-bearing capability every event payload must provide.
///
/// Listeners may only declare payload types implementing this trait.
pub trait IdentityKey: Send + Sync {
    /// Returns the key identifying this payload.
    fn identity_key(&self) -> String;
}

/// A generic key/value payload exchanged between integrations.
///
/// Keys are unique and ordering is irrelevant. The identity of an exchange
/// payload is its sorted key list joined with `,`, which is also the payload
/// key of an [`ExchangeEvent`](crate::ExchangeEvent) built from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangePayload {
    entries: BTreeMap<String, Value>,
}

impl ExchangePayload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a payload holding only the entries of `payload` named in `keys`.
    ///
    /// Keys absent from `payload` are ignored.
    pub fn create_from<K: AsRef<str>>(payload: &ExchangePayload, keys: &[K]) -> Self {
        keys.iter()
            .filter_map(|key| {
                let key = key.as_ref();
                payload
                    .entries
                    .get(key)
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect()
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the raw value under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Decodes the value under `key`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> PayloadResult<T> {
        let value = self
            .entries
            .get(key)
            .ok_or_else(|| PayloadError::missing_key(key))?;
        serde_json::from_value(value.clone()).map_err(|source| PayloadError::Decode {
            key: key.to_string(),
            expected: std::any::type_name::<T>(),
            source,
        })
    }

    /// Decodes the value under `key` if present.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> PayloadResult<Option<T>> {
        if self.entries.contains_key(key) {
            self.get_as(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Removes and returns the value under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the payload, returning the underlying map.
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.entries
    }
}

impl IdentityKey for ExchangePayload {
    fn identity_key(&self) -> String {
        self.keys().collect::<Vec<_>>().join(",")
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for ExchangePayload {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl From<BTreeMap<String, Value>> for ExchangePayload {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self { entries }
    }
}

impl IntoIterator for ExchangePayload {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ============================================================================
// Exchange Views
// ============================================================================

/// A typed view constructed from an [`ExchangePayload`].
///
/// Listeners declaring `ExchangeEvent<V>` receive a view built from the
/// payload entries their key expression matched, nothing else.
///
/// # Example
///
/// ```rust,ignore
/// struct Temperature {
///     payload: ExchangePayload,
///     celsius: f64,
/// }
///
/// impl ExchangeView for Temperature {
///     fn from_exchange(payload: ExchangePayload) -> PayloadResult<Self> {
///         let celsius = payload.get_as("temperature")?;
///         Ok(Self { payload, celsius })
///     }
/// }
/// ```
pub trait ExchangeView: IdentityKey + Sized + 'static {
    /// Builds the view from an already narrowed payload.
    fn from_exchange(payload: ExchangePayload) -> PayloadResult<Self>;
}

impl ExchangeView for ExchangePayload {
    fn from_exchange(payload: ExchangePayload) -> PayloadResult<Self> {
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ExchangePayload {
        ExchangePayload::new()
            .with("temperature", 21.5)
            .with("humidity", 40)
            .with("status", "online")
    }

    #[test]
    fn test_identity_key_is_sorted() {
        assert_eq!(sample().identity_key(), "humidity,status,temperature");
        assert_eq!(ExchangePayload::new().identity_key(), "");
    }

    #[test]
    fn test_create_from_filters_keys() {
        let narrowed = ExchangePayload::create_from(&sample(), &["temperature", "missing"]);

        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed.get("temperature"), Some(&json!(21.5)));
        assert!(!narrowed.contains_key("humidity"));
    }

    #[test]
    fn test_typed_access() {
        let payload = sample();

        assert_eq!(payload.get_as::<f64>("temperature").unwrap(), 21.5);
        assert_eq!(payload.get_opt::<u32>("absent").unwrap(), None);
        assert!(matches!(
            payload.get_as::<f64>("absent"),
            Err(PayloadError::MissingKey { .. })
        ));
        assert!(matches!(
            payload.get_as::<u32>("status"),
            Err(PayloadError::Decode { .. })
        ));
    }

    #[test]
    fn test_serde_transparent() {
        let payload: ExchangePayload =
            serde_json::from_value(json!({"a": 1, "b": "two"})).unwrap();

        assert_eq!(payload.identity_key(), "a,b");
        assert_eq!(serde_json::to_value(&payload).unwrap(), json!({"a": 1, "b": "two"}));
    }
}
