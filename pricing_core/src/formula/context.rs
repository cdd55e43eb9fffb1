//! Typed variable context for formula evaluation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Named numeric values visible to a formula.
///
/// Booleans are stored as `1.0` / `0.0` so they can drive ternaries
/// (`isDouble ? 2 : 1`). Nothing outside this map is reachable from a
/// formula.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormulaContext {
    values: BTreeMap<String, f64>,
}

impl FormulaContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style numeric insert
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style boolean insert
    pub fn with_flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.set_flag(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn set_flag(&mut self, name: impl Into<String>, value: bool) {
        self.values.insert(name.into(), if value { 1.0 } else { 0.0 });
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Copy every numeric or boolean entry of a JSON object into the context.
    ///
    /// Strings, arrays, objects and nulls have no numeric meaning and are
    /// left out, so a formula referencing them fails as an unknown identifier.
    pub fn merge_json(&mut self, map: &serde_json::Map<String, serde_json::Value>) {
        for (key, value) in map {
            match value {
                serde_json::Value::Number(n) => {
                    if let Some(v) = n.as_f64() {
                        self.set(key.clone(), v);
                    }
                }
                serde_json::Value::Bool(b) => self.set_flag(key.clone(), *b),
                _ => {}
            }
        }
    }

    /// Overlay another context; its values win.
    pub fn merge(&mut self, other: &FormulaContext) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), *v);
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
