//! Subscription filters: key expressions and listener cache keys.
//!
//! A listener filter has two parts: the event types it accepts (empty means
//! any) and a key expression matched against each entry of an event's
//! comma-separated payload key.
//!
//! # Key Expression Syntax
//!
//! - `,` separates alternatives; a key matches if any alternative does
//! - `*` inside an alternative matches any run of characters, including none
//! - every other character matches itself, case-sensitively
//! - whitespace around alternatives is ignored
//! - an empty expression, or one containing the alternative `*`, matches
//!   every key
//!
//! ```rust,ignore
//! let key = ListenerCacheKey::new("device.*.temperature,humidity", ["REPORT_EVENT"]);
//! assert_eq!(
//!     key.match_multi_keys("device.1.temperature,pressure,humidity"),
//!     vec!["device.1.temperature", "humidity"],
//! );
//! ```
//!
//! Custom grammars plug in through [`KeyMatcher`].

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use beaver_core::{Event, split_payload_key};

// ============================================================================
// Key Matching
// ============================================================================

/// Decides whether a single payload key satisfies a key expression.
pub trait KeyMatcher: Send + Sync {
    fn matches(&self, key: &str) -> bool;
}

/// The default compiled key expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    alternatives: Vec<Alternative>,
    match_all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Alternative {
    Exact(String),
    /// Literal fragments between `*`; always at least two.
    Glob(Vec<String>),
}

impl KeyPattern {
    /// Compiles a key expression.
    pub fn parse(expression: &str) -> Self {
        let mut alternatives = Vec::new();
        let mut match_all = expression.trim().is_empty();

        for alternative in split_payload_key(expression) {
            if alternative.chars().all(|c| c == '*') {
                match_all = true;
            } else if alternative.contains('*') {
                alternatives.push(Alternative::Glob(
                    alternative.split('*').map(str::to_string).collect(),
                ));
            } else {
                alternatives.push(Alternative::Exact(alternative.to_string()));
            }
        }

        Self {
            alternatives,
            match_all,
        }
    }

    /// Returns `true` if every key matches.
    pub fn is_match_all(&self) -> bool {
        self.match_all
    }
}

impl KeyMatcher for KeyPattern {
    fn matches(&self, key: &str) -> bool {
        self.match_all
            || self.alternatives.iter().any(|alternative| match alternative {
                Alternative::Exact(expected) => expected == key,
                Alternative::Glob(fragments) => glob_match(fragments, key),
            })
    }
}

fn glob_match(fragments: &[String], key: &str) -> bool {
    let [first, middle @ .., last] = fragments else {
        return false;
    };

    if key.len() < first.len() + last.len()
        || !key.starts_with(first.as_str())
        || !key.ends_with(last.as_str())
    {
        return false;
    }

    let mut remaining = &key[first.len()..key.len() - last.len()];
    for fragment in middle.iter().filter(|f| !f.is_empty()) {
        match remaining.find(fragment.as_str()) {
            Some(index) => remaining = &remaining[index + fragment.len()..],
            None => return false,
        }
    }
    true
}

// ============================================================================
// Listener Cache Key
// ============================================================================

/// A declarative subscription filter.
///
/// Equal filters (same expression text, same set of event types) share one
/// registry bucket; every handler declared with that filter is appended to
/// the bucket in registration order. A filter built with a custom matcher is
/// only equal to clones sharing that matcher.
#[derive(Clone)]
pub struct ListenerCacheKey {
    key_expression: String,
    event_types: BTreeSet<String>,
    matcher: Arc<dyn KeyMatcher>,
    custom_matcher: bool,
}

impl ListenerCacheKey {
    /// Creates a filter using the default [`KeyPattern`] grammar.
    pub fn new<I, S>(key_expression: impl Into<String>, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key_expression = key_expression.into();
        let matcher = Arc::new(KeyPattern::parse(&key_expression));
        Self {
            key_expression,
            event_types: event_types.into_iter().map(Into::into).collect(),
            matcher,
            custom_matcher: false,
        }
    }

    /// Creates a filter accepting every event type.
    pub fn any_type(key_expression: impl Into<String>) -> Self {
        Self::new(key_expression, Vec::<String>::new())
    }

    /// Creates a filter with a custom matcher.
    ///
    /// The expression text is kept for diagnostics; identity also includes
    /// the matcher instance.
    pub fn with_matcher<I, S>(
        key_expression: impl Into<String>,
        event_types: I,
        matcher: Arc<dyn KeyMatcher>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key_expression: key_expression.into(),
            event_types: event_types.into_iter().map(Into::into).collect(),
            matcher,
            custom_matcher: true,
        }
    }

    fn matcher_identity(&self) -> Option<*const ()> {
        self.custom_matcher.then(|| Arc::as_ptr(&self.matcher).cast::<()>())
    }

    pub fn key_expression(&self) -> &str {
        &self.key_expression
    }

    /// Returns the accepted event types in sorted order.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.event_types.iter().map(String::as_str)
    }

    /// Returns `true` if this filter accepts `event_type`.
    pub fn match_event_type(&self, event_type: &str) -> bool {
        self.event_types.is_empty() || self.event_types.contains(event_type)
    }

    /// Returns the entries of `payload_key` accepted by the key expression.
    ///
    /// An event without any payload key is treated as carrying the single
    /// empty key, which only a match-all expression accepts.
    pub fn match_multi_keys(&self, payload_key: &str) -> Vec<String> {
        let mut keys = split_payload_key(payload_key).peekable();
        if keys.peek().is_none() {
            return if self.matcher.matches("") {
                vec![String::new()]
            } else {
                Vec::new()
            };
        }

        keys.filter(|key| self.matcher.matches(key))
            .map(str::to_string)
            .collect()
    }

    /// Returns the matched payload keys of `event`, or nothing if its type is
    /// not accepted.
    pub fn filter_match_multi_keys(&self, event: &dyn Event) -> Vec<String> {
        if !self.match_event_type(event.event_type()) {
            return Vec::new();
        }
        self.match_multi_keys(event.payload_key())
    }
}

impl PartialEq for ListenerCacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.key_expression == other.key_expression
            && self.event_types == other.event_types
            && self.matcher_identity() == other.matcher_identity()
    }
}

impl Eq for ListenerCacheKey {}

impl Hash for ListenerCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_expression.hash(state);
        self.event_types.hash(state);
        self.matcher_identity().hash(state);
    }
}

impl fmt::Debug for ListenerCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerCacheKey")
            .field("key_expression", &self.key_expression)
            .field("event_types", &self.event_types)
            .finish()
    }
}

impl fmt::Display for ListenerCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_expression)?;
        if !self.event_types.is_empty() {
            let types: Vec<_> = self.event_types().collect();
            write!(f, " [{}]", types.join(","))?;
        }
        Ok(())
    }
}

// ============================================================================
// Unique Listener Cache Key
// ============================================================================

/// Identity of exactly one dynamic subscription.
///
/// Equality and hashing use the `id` alone, so the same key deregisters
/// precisely what it registered regardless of its filter.
#[derive(Clone, Debug)]
pub struct UniqueListenerCacheKey {
    id: String,
    filter: ListenerCacheKey,
}

impl UniqueListenerCacheKey {
    pub fn new<I, S>(
        id: impl Into<String>,
        key_expression: impl Into<String>,
        event_types: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_filter(id, ListenerCacheKey::new(key_expression, event_types))
    }

    pub fn from_filter(id: impl Into<String>, filter: ListenerCacheKey) -> Self {
        Self {
            id: id.into(),
            filter,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn filter(&self) -> &ListenerCacheKey {
        &self.filter
    }
}

impl PartialEq for UniqueListenerCacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for UniqueListenerCacheKey {}

impl Hash for UniqueListenerCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
