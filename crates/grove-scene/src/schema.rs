//! Component schemas: which fields a component type has and how values for
//! those fields are validated and coerced.
//!
//! Every component type whose fields are modified by rules must be registered
//! in a [`SchemaRegistry`] ahead of use. Each field is described by a
//! [`FieldSchema`] carrying a [`FieldKind`] and a default value; the default is
//! what a field falls back to when a supplied value fails validation.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::json_type_name;
use crate::SceneError;

// ---------------------------------------------------------------------------
// FieldKind
// ---------------------------------------------------------------------------

/// The value shape a field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Any finite number. Numeric strings are coerced.
    Number,
    /// A whole number. Floats without a fractional part and numeric strings
    /// are coerced.
    Integer,
    /// A boolean. `"true"`/`"false"` and `0`/`1` are coerced.
    Bool,
    /// A string. Numbers and booleans are stringified.
    Text,
    /// A three-component vector stored as `[x, y, z]`. A single number is
    /// broadcast to all three axes and `{x, y, z}` objects are flattened.
    Vec3,
    /// A color stored as a lowercase `#rrggbb` string. Accepts `#rgb`,
    /// `#rrggbb` and integers in `0..=0xFFFFFF`.
    Color,
    /// Any JSON value, stored as-is.
    Json,
}

// ---------------------------------------------------------------------------
// FieldSchema
// ---------------------------------------------------------------------------

/// Schema for a single component field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub kind: FieldKind,
    /// Value used when a supplied value fails validation.
    pub default: Value,
    /// Inclusive lower bound for `Number`/`Integer` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Inclusive upper bound for `Number`/`Integer` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl FieldSchema {
    pub fn new(kind: FieldKind, default: Value) -> Self {
        Self {
            kind,
            default,
            min: None,
            max: None,
        }
    }

    pub fn number(default: f64) -> Self {
        Self::new(FieldKind::Number, Value::from(default))
    }

    pub fn integer(default: i64) -> Self {
        Self::new(FieldKind::Integer, Value::from(default))
    }

    pub fn boolean(default: bool) -> Self {
        Self::new(FieldKind::Bool, Value::from(default))
    }

    pub fn text(default: &str) -> Self {
        Self::new(FieldKind::Text, Value::from(default))
    }

    pub fn vec3(default: [f64; 3]) -> Self {
        Self::new(FieldKind::Vec3, Value::from(default.to_vec()))
    }

    pub fn color(default: &str) -> Self {
        Self::new(FieldKind::Color, Value::from(default))
    }

    pub fn json(default: Value) -> Self {
        Self::new(FieldKind::Json, default)
    }

    /// Restrict a numeric field to `min..=max`.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Validate `value` against this field, coercing it into the field's
    /// canonical representation.
    pub fn validate(&self, field: &str, value: &Value) -> Result<Value, SceneError> {
        let reject = |reason: String| SceneError::InvalidFieldValue {
            field: field.to_owned(),
            value: value.to_string(),
            reason,
        };

        let coerced = match self.kind {
            FieldKind::Json => return Ok(value.clone()),
            FieldKind::Number => {
                let n = as_number(value).ok_or_else(|| {
                    reject(format!("expected number, found {}", json_type_name(value)))
                })?;
                self.check_range(n).map_err(&reject)?;
                Value::from(n)
            }
            FieldKind::Integer => {
                let n = as_number(value).ok_or_else(|| {
                    reject(format!("expected integer, found {}", json_type_name(value)))
                })?;
                if n.fract() != 0.0 {
                    return Err(reject(format!("{n} has a fractional part")));
                }
                // 2^63 itself is exactly representable and already out of range.
                if !(-I64_BOUND..I64_BOUND).contains(&n) {
                    return Err(reject(format!("{n} does not fit a 64-bit integer")));
                }
                self.check_range(n).map_err(&reject)?;
                Value::from(n as i64)
            }
            FieldKind::Bool => match value {
                Value::Bool(b) => Value::Bool(*b),
                Value::String(s) if s == "true" => Value::Bool(true),
                Value::String(s) if s == "false" => Value::Bool(false),
                Value::Number(n) if n.as_f64() == Some(0.0) => Value::Bool(false),
                Value::Number(n) if n.as_f64() == Some(1.0) => Value::Bool(true),
                _ => return Err(reject("expected bool".to_owned())),
            },
            FieldKind::Text => match value {
                Value::String(s) => Value::String(s.clone()),
                Value::Number(n) => Value::String(n.to_string()),
                Value::Bool(b) => Value::String(b.to_string()),
                _ => {
                    return Err(reject(format!(
                        "expected string, found {}",
                        json_type_name(value)
                    )))
                }
            },
            FieldKind::Vec3 => coerce_vec3(value).ok_or_else(|| {
                reject("expected [x, y, z], {x, y, z} or a single number".to_owned())
            })?,
            FieldKind::Color => {
                coerce_color(value).ok_or_else(|| reject("expected #rgb, #rrggbb or 0xRRGGBB".to_owned()))?
            }
        };
        Ok(coerced)
    }

    fn check_range(&self, n: f64) -> Result<(), String> {
        if let Some(min) = self.min {
            if n < min {
                return Err(format!("{n} is below the minimum {min}"));
            }
        }
        if let Some(max) = self.max {
            if n > max {
                return Err(format!("{n} is above the maximum {max}"));
            }
        }
        Ok(())
    }
}

const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn coerce_vec3(value: &Value) -> Option<Value> {
    let xyz: [f64; 3] = match value {
        Value::Number(_) => {
            let n = as_number(value)?;
            [n, n, n]
        }
        Value::Array(items) if items.len() == 3 => {
            [as_number(&items[0])?, as_number(&items[1])?, as_number(&items[2])?]
        }
        Value::Object(map) => [
            as_number(map.get("x")?)?,
            as_number(map.get("y")?)?,
            as_number(map.get("z")?)?,
        ],
        _ => return None,
    };
    Some(Value::from(xyz.to_vec()))
}

fn coerce_color(value: &Value) -> Option<Value> {
    let rgb = match value {
        Value::Number(n) => {
            let raw = n.as_u64()?;
            if raw > 0xFF_FFFF {
                return None;
            }
            raw as u32
        }
        Value::String(s) => {
            let hex = s.strip_prefix('#')?;
            if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                return None;
            }
            match hex.len() {
                6 => u32::from_str_radix(hex, 16).ok()?,
                3 => {
                    let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
                    u32::from_str_radix(&expanded, 16).ok()?
                }
                _ => return None,
            }
        }
        _ => return None,
    };
    Some(Value::String(format!("#{rgb:06x}")))
}

// ---------------------------------------------------------------------------
// ComponentSchema
// ---------------------------------------------------------------------------

/// Field layout of one component type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSchema {
    pub name: String,
    pub fields: BTreeMap<String, FieldSchema>,
}

impl ComponentSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field declaration.
    pub fn field(mut self, name: &str, schema: FieldSchema) -> Self {
        self.fields.insert(name.to_owned(), schema);
        self
    }

    /// Schema of one declared field.
    pub fn field_schema(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    /// Validate a field value, falling back to the field default on failure.
    ///
    /// Returns the value to store and, when the fallback was taken, the
    /// validation error that caused it. Returns `None` for undeclared fields.
    pub fn coerce_or_default(
        &self,
        field: &str,
        value: &Value,
    ) -> Option<(Value, Option<SceneError>)> {
        let schema = self.fields.get(field)?;
        Some(match schema.validate(field, value) {
            Ok(v) => (v, None),
            Err(e) => (schema.default.clone(), Some(e)),
        })
    }
}

// ---------------------------------------------------------------------------
// SchemaRegistry
// ---------------------------------------------------------------------------

/// Lookup table from component type name to its [`ComponentSchema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, ComponentSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema under its name, returning any schema it replaced.
    pub fn register(&mut self, schema: ComponentSchema) -> Option<ComponentSchema> {
        if self.schemas.contains_key(&schema.name) {
            tracing::debug!(component = %schema.name, "replacing component schema");
        }
        self.schemas.insert(schema.name.clone(), schema)
    }

    /// Builder-style registration.
    pub fn with(mut self, schema: ComponentSchema) -> Self {
        self.register(schema);
        self
    }

    /// Schema registered for a component type, if any.
    pub fn schema_for(&self, component: &str) -> Option<&ComponentSchema> {
        self.schemas.get(component)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Names of all registered component types, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn light_schema() -> ComponentSchema {
        ComponentSchema::new("light")
            .field("intensity", FieldSchema::number(1.0).with_range(0.0, 100.0))
            .field("color", FieldSchema::color("#ffffff"))
            .field("castShadow", FieldSchema::boolean(false))
    }

    #[test]
    fn number_coercion_and_range() {
        let f = FieldSchema::number(1.0).with_range(0.0, 10.0);
        assert_eq!(f.validate("i", &json!(2)).unwrap(), json!(2.0));
        assert_eq!(f.validate("i", &json!("2.5")).unwrap(), json!(2.5));
        assert!(f.validate("i", &json!(11)).is_err());
        assert!(f.validate("i", &json!(true)).is_err());
    }

    #[test]
    fn integer_rejects_fractions() {
        let f = FieldSchema::integer(0);
        assert_eq!(f.validate("n", &json!(3.0)).unwrap(), json!(3));
        assert!(f.validate("n", &json!(3.5)).is_err());
    }

    #[test]
    fn integer_rejects_values_outside_i64() {
        let f = FieldSchema::integer(0);
        let err = f.validate("n", &json!(1e20)).unwrap_err();
        assert!(matches!(err, SceneError::InvalidFieldValue { .. }));
        assert!(err.to_string().contains("64-bit"));
        assert!(f.validate("n", &json!(-1e19)).is_err());
        assert!(f.validate("n", &json!("9223372036854775808")).is_err());
        assert_eq!(f.validate("n", &json!(-4_000_000_000i64)).unwrap(), json!(-4_000_000_000i64));
    }

    #[test]
    fn bool_and_text_coercion() {
        let b = FieldSchema::boolean(false);
        assert_eq!(b.validate("b", &json!("true")).unwrap(), json!(true));
        assert_eq!(b.validate("b", &json!(0)).unwrap(), json!(false));
        assert!(b.validate("b", &json!("yes")).is_err());

        let t = FieldSchema::text("");
        assert_eq!(t.validate("t", &json!(12)).unwrap(), json!("12"));
        assert!(t.validate("t", &json!([1])).is_err());
    }

    #[test]
    fn vec3_accepts_scalars_arrays_and_objects() {
        let f = FieldSchema::vec3([0.0, 0.0, 0.0]);
        assert_eq!(f.validate("p", &json!(2)).unwrap(), json!([2.0, 2.0, 2.0]));
        assert_eq!(f.validate("p", &json!([1, 2, 3])).unwrap(), json!([1.0, 2.0, 3.0]));
        assert_eq!(
            f.validate("p", &json!({"x": 1, "y": 0, "z": -1})).unwrap(),
            json!([1.0, 0.0, -1.0])
        );
        assert!(f.validate("p", &json!([1, 2])).is_err());
    }

    #[test]
    fn color_normalizes_to_lowercase_hex() {
        let f = FieldSchema::color("#000000");
        assert_eq!(f.validate("c", &json!("#FFF")).unwrap(), json!("#ffffff"));
        assert_eq!(f.validate("c", &json!(0xff0000)).unwrap(), json!("#ff0000"));
        assert!(f.validate("c", &json!("red")).is_err());
        assert!(f.validate("c", &json!(0x1000000)).is_err());
    }

    #[test]
    fn coerce_or_default_falls_back() {
        let schema = light_schema();
        let (v, err) = schema.coerce_or_default("intensity", &json!("bright")).unwrap();
        assert_eq!(v, json!(1.0));
        assert!(err.is_some());

        let (v, err) = schema.coerce_or_default("intensity", &json!(4)).unwrap();
        assert_eq!(v, json!(4.0));
        assert!(err.is_none());

        assert!(schema.coerce_or_default("missing", &json!(1)).is_none());
    }

    #[test]
    fn registry_lookup_and_names() {
        let reg = SchemaRegistry::new()
            .with(light_schema())
            .with(ComponentSchema::new("mesh"));
        assert!(reg.schema_for("light").is_some());
        assert!(reg.schema_for("camera").is_none());
        assert_eq!(reg.registered_names(), vec!["light", "mesh"]);
    }

    #[test]
    fn schema_deserializes_from_json() {
        let schema: ComponentSchema = serde_json::from_value(json!({
            "name": "light",
            "fields": {
                "intensity": {"kind": "number", "default": 1.0, "min": 0.0}
            }
        }))
        .unwrap();
        let field = schema.field_schema("intensity").unwrap();
        assert_eq!(field.kind, FieldKind::Number);
        assert_eq!(field.min, Some(0.0));
        assert_eq!(field.max, None);
    }
}
