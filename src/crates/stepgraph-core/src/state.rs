//! State channel model
//!
//! A graph run carries one [`State`]: an ordered mapping from string keys to
//! JSON values. Nodes never mutate it. They return a [`Delta`], a partial
//! update, and the engine produces the next state with [`merge`].
//!
//! How a key is merged is decided by its [`Channel`] in the graph's
//! [`Schema`]:
//!
//! - no channel, or a channel without reducer: the new value overwrites
//! - a channel with a [`Reducer`]: `reducer(old or default, new)`
//!
//! Every delta entry is an [`Update`]:
//!
//! | Update | Effect |
//! |---|---|
//! | `Set(v)` | goes through the key's reducer |
//! | `Replace(v)` | stores `v`, bypassing the reducer |
//! | `Remove` | removes the key |
//!
//! # Example
//!
//! ```rust
//! use stepgraph_core::state::{merge, Channel, Delta, Schema, State};
//! use serde_json::json;
//!
//! let schema = Schema::new().with_channel("messages", Channel::appender());
//!
//! let state = State::new();
//! let state = merge(&state, &Delta::new().set("messages", json!("a")), &schema).unwrap();
//! let state = merge(&state, &Delta::new().set("messages", json!(["b", "c"])), &schema).unwrap();
//!
//! assert_eq!(state.get("messages"), Some(&json!(["a", "b", "c"])));
//!
//! let state = merge(&state, &Delta::new().remove("messages"), &schema).unwrap();
//! assert!(!state.contains_key("messages"));
//! ```
//!
//! # Custom reducers
//!
//! ```rust
//! use stepgraph_core::state::{Reducer, StateError};
//! use serde_json::{json, Value};
//!
//! struct MaxReducer;
//!
//! impl Reducer for MaxReducer {
//!     fn reduce(&self, current: &Value, update: &Value) -> Result<Value, StateError> {
//!         let a = current.as_f64().unwrap_or(f64::MIN);
//!         let b = update.as_f64().unwrap_or(f64::MIN);
//!         Ok(json!(a.max(b)))
//!     }
//!
//!     fn name(&self) -> &str {
//!         "max"
//!     }
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the channel model
#[derive(Debug, Error)]
pub enum StateError {
    /// State structure is invalid (e.g., not an object when expected)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Reducer encountered incompatible types or failed to merge
    #[error("Reducer error: {0}")]
    ReducerError(String),

    /// Reducer failed for a specific key
    #[error("Reducer '{reducer}' failed for key '{key}': {error}")]
    Channel {
        key: String,
        reducer: String,
        error: String,
    },
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Immutable snapshot of a run's state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Map<String, Value>);

impl State {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StateError::InvalidState(format!(
                "state must be an object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserialize the value of `key`, if present and well-typed
    pub fn value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying map
    pub fn data(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_data(self) -> Map<String, Value> {
        self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for State {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<State> for Map<String, Value> {
    fn from(state: State) -> Self {
        state.0
    }
}

/// A single entry of a [`Delta`]
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Merge through the key's reducer (overwrite when there is none)
    Set(Value),
    /// Store the value as is, bypassing the reducer
    Replace(Value),
    /// Remove the key
    Remove,
}

/// Partial state update produced by a node, hook or edge
///
/// Entries keep insertion order; setting a key twice keeps its first
/// position and the last update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    entries: Vec<(String, Update)>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reducer-merged value
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, Update::Set(value.into()));
        self
    }

    /// Add a value that bypasses the reducer
    pub fn replace(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, Update::Replace(value.into()));
        self
    }

    /// Add a deletion marker
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.insert(key, Update::Remove);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, update: Update) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = update,
            None => self.entries.push((key, update)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Update> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, u)| u)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Update)> {
        self.entries.iter().map(|(k, u)| (k.as_str(), u))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Combine with a later delta; the later delta wins on conflicting keys
    pub fn merged_with(mut self, later: Delta) -> Delta {
        for (key, update) in later.entries {
            self.insert(key, update);
        }
        self
    }

    /// Build a delta of `Set` entries from a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(Self::from_state(State::from_value(value)?))
    }

    /// Build a delta of `Set` entries from every key of a state
    pub fn from_state(state: State) -> Self {
        state
            .into_data()
            .into_iter()
            .map(|(k, v)| (k, Update::Set(v)))
            .collect()
    }
}

impl FromIterator<(String, Update)> for Delta {
    fn from_iter<I: IntoIterator<Item = (String, Update)>>(iter: I) -> Self {
        let mut delta = Delta::new();
        for (key, update) in iter {
            delta.insert(key, update);
        }
        delta
    }
}

impl IntoIterator for Delta {
    type Item = (String, Update);
    type IntoIter = std::vec::IntoIter<(String, Update)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Trait for reducing/merging state values
///
/// Reducers define how successive writes to the same key are combined.
pub trait Reducer: Send + Sync {
    /// Apply an update to the current value (`Null` when the key is absent
    /// and the channel has no default)
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value>;

    /// Get a human-readable name for this reducer
    fn name(&self) -> &str;
}

/// Overwrite reducer - replaces the current value with the update
#[derive(Debug, Clone)]
pub struct OverwriteReducer;

impl Reducer for OverwriteReducer {
    fn reduce(&self, _current: &Value, update: &Value) -> Result<Value> {
        Ok(update.clone())
    }

    fn name(&self) -> &str {
        "overwrite"
    }
}

/// Append reducer - appends update to current array
///
/// - **Array + Array**: concatenates both arrays
/// - **Array + Scalar**: appends the scalar as a single element
/// - **Null + Array**: initializes with the array
/// - **Null + Scalar**: creates an array with a single element
///
/// ```rust
/// use stepgraph_core::state::{AppendReducer, Reducer};
/// use serde_json::json;
///
/// let result = AppendReducer.reduce(&json!(["User: Hello"]), &json!(["AI: Hi there!"])).unwrap();
/// assert_eq!(result, json!(["User: Hello", "AI: Hi there!"]));
/// ```
#[derive(Debug, Clone)]
pub struct AppendReducer;

impl Reducer for AppendReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Array(curr_arr), Value::Array(upd_arr)) => {
                let mut result = curr_arr.clone();
                result.extend_from_slice(upd_arr);
                Ok(Value::Array(result))
            }
            (Value::Null, Value::Array(upd_arr)) => Ok(Value::Array(upd_arr.clone())),
            (Value::Array(curr_arr), single_value) => {
                let mut result = curr_arr.clone();
                result.push(single_value.clone());
                Ok(Value::Array(result))
            }
            (Value::Null, single_value) => Ok(Value::Array(vec![single_value.clone()])),
            _ => Err(StateError::ReducerError(
                "AppendReducer requires array values".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "append"
    }
}

/// Merge reducer - shallow-merges object fields, update keys win
#[derive(Debug, Clone)]
pub struct MergeReducer;

impl Reducer for MergeReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Object(curr_obj), Value::Object(upd_obj)) => {
                let mut result = curr_obj.clone();
                for (key, value) in upd_obj {
                    result.insert(key.clone(), value.clone());
                }
                Ok(Value::Object(result))
            }
            (Value::Null, Value::Object(upd_obj)) => Ok(Value::Object(upd_obj.clone())),
            _ => Err(StateError::ReducerError(
                "MergeReducer requires object values".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "merge"
    }
}

/// Sum reducer - adds numbers, integer arithmetic when both sides are integers
#[derive(Debug, Clone)]
pub struct SumReducer;

impl Reducer for SumReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Number(a), Value::Number(b)) => {
                if let Some(sum) = a.as_i64().zip(b.as_i64()).and_then(|(a, b)| a.checked_add(b)) {
                    return Ok(Value::Number(sum.into()));
                }
                match (a.as_f64(), b.as_f64()) {
                    (Some(a), Some(b)) => serde_json::Number::from_f64(a + b)
                        .map(Value::Number)
                        .ok_or_else(|| StateError::ReducerError("sum is not finite".to_string())),
                    _ => Err(StateError::ReducerError(
                        "Cannot add non-numeric values".to_string(),
                    )),
                }
            }
            (Value::Null, Value::Number(_)) => Ok(update.clone()),
            _ => Err(StateError::ReducerError(
                "SumReducer requires numeric values".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "sum"
    }
}

/// Reducer backed by a closure
pub struct FnReducer<F> {
    name: String,
    f: F,
}

impl<F> FnReducer<F>
where
    F: Fn(&Value, &Value) -> Result<Value> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Reducer for FnReducer<F>
where
    F: Fn(&Value, &Value) -> Result<Value> + Send + Sync,
{
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        (self.f)(current, update)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Look up a built-in reducer by name
pub fn reducer_by_name(name: &str) -> Option<Arc<dyn Reducer>> {
    match name {
        "overwrite" => Some(Arc::new(OverwriteReducer)),
        "append" => Some(Arc::new(AppendReducer)),
        "merge" => Some(Arc::new(MergeReducer)),
        "sum" => Some(Arc::new(SumReducer)),
        _ => None,
    }
}

type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Merge policy of one state key
#[derive(Clone, Default)]
pub struct Channel {
    default: Option<DefaultFn>,
    reducer: Option<Arc<dyn Reducer>>,
}

impl Channel {
    /// Overwrite channel without default
    pub fn new() -> Self {
        Self::default()
    }

    /// List channel: appends, defaults to `[]`
    pub fn appender() -> Self {
        Self::new()
            .with_reducer(AppendReducer)
            .with_default(|| Value::Array(Vec::new()))
    }

    /// Numeric channel: sums, defaults to `0`
    pub fn counter() -> Self {
        Self::new().with_reducer(SumReducer).with_default(|| Value::from(0))
    }

    pub fn with_default<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(f));
        self
    }

    /// Use a fixed default value
    pub fn with_default_value(self, value: Value) -> Self {
        self.with_default(move || value.clone())
    }

    pub fn with_reducer<R: Reducer + 'static>(mut self, reducer: R) -> Self {
        self.reducer = Some(Arc::new(reducer));
        self
    }

    pub fn with_shared_reducer(mut self, reducer: Arc<dyn Reducer>) -> Self {
        self.reducer = Some(reducer);
        self
    }

    pub fn default_value(&self) -> Option<Value> {
        self.default.as_ref().map(|f| f())
    }

    pub fn reducer(&self) -> Option<&dyn Reducer> {
        self.reducer.as_deref()
    }

    /// Merge `new` into `old` for `key`
    pub fn update(&self, key: &str, old: Option<&Value>, new: &Value) -> Result<Value> {
        let Some(reducer) = &self.reducer else {
            return Ok(new.clone());
        };
        let base = match old {
            Some(value) => value.clone(),
            None => self.default_value().unwrap_or(Value::Null),
        };
        reducer.reduce(&base, new).map_err(|e| StateError::Channel {
            key: key.to_string(),
            reducer: reducer.name().to_string(),
            error: e.to_string(),
        })
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("reducer", &self.reducer.as_ref().map(|r| r.name()))
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// Immutable mapping from state key to [`Channel`]
#[derive(Debug, Clone, Default)]
pub struct Schema {
    channels: Arc<HashMap<String, Channel>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, key: impl Into<String>, channel: Channel) -> Self {
        Arc::make_mut(&mut self.channels).insert(key.into(), channel);
        self
    }

    pub fn channel(&self, key: &str) -> Option<&Channel> {
        self.channels.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.channels.keys()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// State holding the default value of every channel that declares one
    pub fn initial_state(&self) -> State {
        let mut keys: Vec<_> = self.channels.keys().collect();
        keys.sort();
        let data = keys
            .into_iter()
            .filter_map(|key| {
                self.channels[key]
                    .default_value()
                    .map(|value| (key.clone(), value))
            })
            .collect::<Map<_, _>>();
        State(data)
    }

    /// Apply `delta` on top of `previous`
    pub fn merge(&self, previous: &State, delta: &Delta) -> Result<State> {
        if delta.is_empty() {
            return Ok(previous.clone());
        }
        let mut data = previous.0.clone();
        for (key, update) in delta.iter() {
            match update {
                Update::Remove => {
                    data.remove(key);
                }
                Update::Replace(value) => {
                    data.insert(key.to_string(), value.clone());
                }
                Update::Set(value) => {
                    let merged = match self.channels.get(key) {
                        Some(channel) => channel.update(key, data.get(key), value)?,
                        None => value.clone(),
                    };
                    data.insert(key.to_string(), merged);
                }
            }
        }
        Ok(State(data))
    }
}

/// Apply `delta` on top of `previous` using `schema`
///
/// Pure and deterministic; `merge(s, &Delta::new(), schema) == s`.
pub fn merge(previous: &State, delta: &Delta, schema: &Schema) -> Result<State> {
    schema.merge(previous, delta)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
