//! Responses aggregated from synchronous listeners.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key/value results collected from every listener of a synchronous dispatch.
///
/// Each listener contributes a partial response which is merged with
/// [`put_all`](Self::put_all). A later contribution only replaces earlier
/// values on key collision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventResponse {
    entries: BTreeMap<String, Value>,
}

impl EventResponse {
    /// Creates an empty response.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a response holding a single entry.
    pub fn of(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::empty().with(key, value)
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(key, value);
        self
    }

    /// Inserts a value, returning the previous one.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// Merges every entry of `other` into this response.
    pub fn put_all(&mut self, other: EventResponse) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the response, returning the underlying map.
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.entries
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for EventResponse {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
