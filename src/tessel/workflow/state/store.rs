// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow runs

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::schema::{ReducerType, StateSchema};

/// State values with reducer support
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    fields: Map<String, Value>,
    reducers: HashMap<String, ReducerType>,
}

impl WorkflowState {
    /// Seed state from schema defaults, then the given values
    pub fn new(schema: &StateSchema, initial: &Map<String, Value>) -> Self {
        let mut fields = Map::new();
        let mut reducers = HashMap::new();

        for (name, def) in &schema.fields {
            if let Some(default) = &def.default {
                fields.insert(name.clone(), default.clone());
            }
            reducers.insert(name.clone(), def.reducer);
        }

        for (k, v) in initial {
            fields.insert(k.clone(), v.clone());
        }

        Self { fields, reducers }
    }

    /// Update a field using the key's reducer
    pub fn update(&mut self, key: &str, value: Value) {
        let reducer = self
            .reducers
            .get(key)
            .copied()
            .unwrap_or(ReducerType::Overwrite);

        match reducer {
            ReducerType::Overwrite => {
                self.fields.insert(key.to_string(), value);
            }
            ReducerType::Append => {
                let arr = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Array(vec![]));
                if let Value::Array(a) = arr {
                    match value {
                        Value::Array(new_items) => a.extend(new_items),
                        other => a.push(other),
                    }
                }
            }
            ReducerType::Max => self.keep_if(key, value, |new, current| new > current),
            ReducerType::Min => self.keep_if(key, value, |new, current| new < current),
            ReducerType::Merge => {
                let current = self
                    .fields
                    .entry(key.to_string())
                    .or_insert(Value::Object(Map::new()));
                match (current, value) {
                    (Value::Object(current_obj), Value::Object(new_obj)) => {
                        current_obj.extend(new_obj);
                    }
                    (_, other) => log::warn!("Ignoring non-object merge into '{}': {}", key, other),
                }
            }
        }
    }

    fn keep_if(&mut self, key: &str, value: Value, better: fn(f64, f64) -> bool) {
        let Some(new) = value.as_f64() else {
            log::warn!("Ignoring non-numeric write to '{}': {}", key, value);
            return;
        };
        let replace = match self.fields.get(key).and_then(Value::as_f64) {
            Some(current) => better(new, current),
            None => true,
        };
        if replace {
            self.fields.insert(key.to_string(), value);
        }
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a nested field value using dot notation (e.g., "result.intent")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.fields, path)
    }

    /// Copy of the current values
    pub fn snapshot(&self) -> Map<String, Value> {
        self.fields.clone()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }
}

/// Resolve a dot path inside an object map
pub fn lookup_path<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = root.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            other => other.get(part)?,
        };
    }
    Some(current)
}

/// Guarded state shared by the runner and every step of one run
///
/// Writes are serialized by the lock; concurrent writers to a key with an
/// accumulating reducer combine instead of overwriting each other.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<RwLock<WorkflowState>>,
}

impl SharedState {
    pub fn new(state: WorkflowState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn get_path(&self, path: &str) -> Option<Value> {
        self.inner.read().await.get_path(path).cloned()
    }

    pub async fn update(&self, key: &str, value: Value) {
        self.inner.write().await.update(key, value)
    }

    pub async fn snapshot(&self) -> Map<String, Value> {
        self.inner.read().await.snapshot()
    }
}
