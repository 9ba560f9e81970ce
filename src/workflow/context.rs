//! Execution Context
//!
//! The shared key-value scratchpad of one execution. Every task in the
//! dependency tree of a single top-level call reads and writes the same
//! instance; the engine itself records task results and skip markers here.
//!
//! A [`Context`] is a handle: cloning it yields another reference to the
//! same underlying map, not a copy.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use super::model::TaskId;

/// Key under which event-triggered executions receive the event payload.
pub const EVENT_PAYLOAD_KEY: &str = "event_payload";

/// Errors raised by context accessors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContextError {
    #[error("Required context key \"{key}\" not found")]
    MissingKey { key: String },

    #[error("Context key \"{key}\" has an unexpected shape: {message}")]
    Deserialize { key: String, message: String },

    #[error("Initial context data must be a JSON object or null, found {found}")]
    NotAnObject { found: String },
}

/// Insertion-ordered mapping from string keys to JSON values.
#[derive(Clone, Default)]
pub struct Context {
    data: Arc<RwLock<Map<String, Value>>>,
}

impl Context {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context seeded from a JSON object.
    ///
    /// `null` yields an empty context; any other non-object value is rejected.
    pub fn from_value(initial: Value) -> Result<Self, ContextError> {
        match initial {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self::from(map)),
            other => Err(ContextError::NotAnObject {
                found: json_kind(&other).to_string(),
            }),
        }
    }

    /// Stores a value, overwriting any previous value for the key.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.write().insert(key.into(), value.into());
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Returns the value stored under `key`, deserialized into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ContextError> {
        self.get(key).map(|value| decode(key, value)).transpose()
    }

    /// Returns the value stored under `key` or fails with
    /// [`ContextError::MissingKey`].
    pub fn get_required(&self, key: &str) -> Result<Value, ContextError> {
        self.get(key).ok_or_else(|| ContextError::MissingKey {
            key: key.to_string(),
        })
    }

    /// Typed variant of [`get_required`](Self::get_required).
    pub fn get_required_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextError> {
        decode(key, self.get_required(key)?)
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Copies every entry of `other` into this context.
    ///
    /// Colliding keys take the value from `other`; `other` is left untouched.
    pub fn merge(&self, other: &Context) {
        if Arc::ptr_eq(&self.data, &other.data) {
            return;
        }
        let entries = other.snapshot();
        let mut data = self.data.write();
        for (key, value) in entries {
            data.insert(key, value);
        }
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns a point-in-time copy of all entries.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.data.read().clone()
    }

    /// Returns the entries as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.snapshot())
    }

    /// Returns the recorded result of a task that ran in this context.
    pub fn result_of(&self, task_id: &TaskId) -> Option<Value> {
        self.get(&task_id.result_key())
    }

    /// Returns true if the task was skipped because its condition was false.
    pub fn was_skipped(&self, task_id: &TaskId) -> bool {
        matches!(self.get(&task_id.skipped_key()), Some(Value::Bool(true)))
    }

    /// Returns true if both handles refer to the same context instance.
    pub fn same_instance(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            data: Arc::new(RwLock::new(map)),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let map: Map<String, Value> = iter.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::from(map)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.snapshot()).finish()
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, ContextError> {
    serde_json::from_value(value).map_err(|e| ContextError::Deserialize {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
