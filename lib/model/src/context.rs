use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An immutable set of key-value entries that accompanies a query through every collaborator.
///
/// Cloning a context is cheap. Adding an entry produces a new context and leaves the original
/// untouched, so a context handed to a spawned task can never change underneath it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryContext {
    entries: Arc<BTreeMap<String, Value>>,
}

impl QueryContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns whether an entry for `key` exists.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns a new context with `key` set to `value`.
    #[must_use]
    pub fn with(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut entries = BTreeMap::clone(&self.entries);
        entries.insert(key.into(), value.into());
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Returns a new context containing the entries of `self`, overridden by those of `other`.
    #[must_use]
    pub fn merge(&self, other: &QueryContext) -> Self {
        if other.entries.is_empty() {
            return self.clone();
        }
        if self.entries.is_empty() {
            return other.clone();
        }

        let mut entries = BTreeMap::clone(&self.entries);
        entries.extend(
            other
                .entries
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the context has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
