//! Peer state: an ordered key/value map with shallow-merge semantics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An ordered mapping of string keys to arbitrary JSON values.
///
/// Mutation is a shallow merge: applying an incoming state overwrites
/// only the keys it carries and preserves everything else. There is no
/// versioning; the last merge observed locally wins. A state is never
/// reset to empty after construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(BTreeMap<String, Value>);

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from a JSON object. Non-object values yield an
    /// empty state, since there are no keys to merge.
    pub fn from_value(value: &Value) -> Self {
        match value.as_object() {
            Some(map) => Self(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            None => Self::new(),
        }
    }

    /// Shallow merge: keys present in `incoming` overwrite, absent keys
    /// are preserved.
    pub fn merge(&mut self, incoming: &State) {
        for (key, value) in &incoming.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The state as a JSON object value, for wire payloads.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for State {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
