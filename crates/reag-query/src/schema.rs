//! Caller-declared output fields and their JSON Schema rendering

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};
use std::collections::HashSet;
use std::fmt;

/// Fields every judgment carries
pub const BASELINE_FIELDS: [&str; 3] = ["content", "reasoning", "is_irrelevant"];

/// Declared type of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Text
    String,
    /// Any number
    Number,
    /// Whole number
    Integer,
    /// `true` or `false`
    Boolean,
    /// JSON array
    Array,
    /// JSON object
    Object,
}

impl FieldType {
    /// JSON Schema type name
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    /// Coerce a model-produced value to this type
    ///
    /// Numbers and booleans stringify into `String`; numeric strings parse
    /// into `Number` and `Integer`; `"true"`/`"false"` in any case parse into
    /// `Boolean`. Arrays and objects must already have their kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use reag_query::FieldType;
    /// use serde_json::json;
    ///
    /// assert_eq!(FieldType::Integer.coerce(&json!("42")), Ok(json!(42)));
    /// assert_eq!(FieldType::Boolean.coerce(&json!("FALSE")), Ok(json!(false)));
    /// assert!(FieldType::Number.coerce(&json!("high")).is_err());
    /// ```
    pub fn coerce(self, value: &Value) -> Result<Value, String> {
        let coerced = match (self, value) {
            (FieldType::String, Value::String(_)) => Some(value.clone()),
            (FieldType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (FieldType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),

            (FieldType::Number, Value::Number(_)) => Some(value.clone()),
            (FieldType::Number, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),

            (FieldType::Integer, Value::Number(n)) => integral(n),
            (FieldType::Integer, Value::String(s)) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(i) => Some(Value::from(i)),
                    Err(_) => s.parse::<f64>().ok().and_then(Number::from_f64).and_then(|n| integral(&n)),
                }
            }

            (FieldType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (FieldType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },

            (FieldType::Array, Value::Array(_)) | (FieldType::Object, Value::Object(_)) => {
                Some(value.clone())
            }
            _ => None,
        };

        coerced.ok_or_else(|| format!("expected {}, got {}", self, kind_of(value)))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn integral(n: &Number) -> Option<Value> {
    if let Some(i) = n.as_i64() {
        return Some(Value::from(i));
    }
    if let Some(u) = n.as_u64() {
        return Some(Value::from(u));
    }
    let x = n.as_f64()?;
    if x.fract() == 0.0 && x >= i64::MIN as f64 && x <= i64::MAX as f64 {
        Some(Value::from(x as i64))
    } else {
        None
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One caller-declared field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Field name in each judgment
    pub name: String,

    /// Declared type
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Whether every judgment must carry the field
    #[serde(default = "default_required")]
    pub required: bool,

    /// Shown to the model in the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_required() -> bool {
    true
}

impl SchemaField {
    /// A required field
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            description: None,
        }
    }

    /// An optional field
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type)
        }
    }

    /// Attach a description
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Additional judgment fields beyond the baseline
///
/// # Examples
///
/// ```
/// use reag_query::{FieldType, OutputSchema, SchemaField};
///
/// let schema = OutputSchema::new()
///     .with_field(SchemaField::required("score", FieldType::Number).describe("0 to 1"));
/// let json = schema.response_schema(2);
/// assert_eq!(json["properties"]["judgments"]["minItems"], 2);
/// assert!(schema.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    /// Declared fields, in prompt order
    #[serde(default)]
    pub fields: Vec<SchemaField>,
}

impl OutputSchema {
    /// Baseline fields only
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field
    pub fn with_field(mut self, field: SchemaField) -> Self {
        self.fields.push(field);
        self
    }

    /// Whether only the baseline fields apply
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check names are non-empty, unique and do not shadow baseline fields
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            let name = field.name.trim();
            if name.is_empty() {
                return Err("schema field names must not be empty".to_string());
            }
            if BASELINE_FIELDS.contains(&name) {
                return Err(format!("schema field '{}' shadows a baseline field", name));
            }
            if !seen.insert(name) {
                return Err(format!("schema field '{}' is declared twice", name));
            }
        }
        Ok(())
    }

    /// JSON Schema for one judgment
    pub fn item_schema(&self) -> Value {
        let mut properties = Map::new();
        properties.insert("content".to_string(), json!({"type": "string"}));
        properties.insert("reasoning".to_string(), json!({"type": "string"}));
        properties.insert("is_irrelevant".to_string(), json!({"type": "boolean"}));

        let mut required = vec![json!("content"), json!("is_irrelevant")];
        for field in &self.fields {
            let mut property = json!({"type": field.field_type.as_str()});
            if let Some(description) = &field.description {
                property["description"] = json!(description);
            }
            properties.insert(field.name.clone(), property);
            if field.required {
                required.push(json!(field.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// JSON Schema for a response judging exactly `count` documents
    pub fn response_schema(&self, count: usize) -> Value {
        json!({
            "type": "object",
            "properties": {
                "judgments": {
                    "type": "array",
                    "items": self.item_schema(),
                    "minItems": count,
                    "maxItems": count,
                },
            },
            "required": ["judgments"],
        })
    }
}
