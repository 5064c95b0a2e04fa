//! Component values attached to scene nodes.
//!
//! A node carries at most one [`Component`] per component type name
//! (`"light"`, `"mesh"`, ...). Component data is a flat JSON object of named
//! fields so that rules can address individual fields without knowing the
//! concrete Rust type behind them.

use serde::{Deserialize, Serialize};

/// A single component instance: a JSON object of field values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Component {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl Component {
    /// Create a component with no fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: &str, value: serde_json::Value) -> Self {
        self.fields.insert(field.to_owned(), value);
        self
    }

    /// Read a field.
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// Write a field, returning the previous value.
    pub fn set(&mut self, field: &str, value: serde_json::Value) -> Option<serde_json::Value> {
        self.fields.insert(field.to_owned(), value)
    }

    /// All fields in key order.
    pub fn fields(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.fields
    }
}

/// Short human-readable name of a JSON value's type, used in error messages.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
