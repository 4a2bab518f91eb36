//! Document module - the unit of context handed to the model

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// A scalar metadata value
///
/// Metadata is provider-agnostic and dynamically typed on the wire, so it is
/// modelled as a tagged union. Each filter operator decides explicitly how to
/// coerce it (see [`crate::filter`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag
    Bool(bool),
    /// Whole number
    Integer(i64),
    /// Floating point number
    Float(f64),
    /// Free text
    String(String),
}

impl MetadataValue {
    /// Numeric view of the value
    ///
    /// Numbers convert directly and strings are parsed after trimming.
    /// Booleans are never numeric.
    ///
    /// # Examples
    ///
    /// ```
    /// use reag_domain::MetadataValue;
    ///
    /// assert_eq!(MetadataValue::from(2).as_f64(), Some(2.0));
    /// assert_eq!(MetadataValue::from(" 2.5 ").as_f64(), Some(2.5));
    /// assert_eq!(MetadataValue::from(true).as_f64(), None);
    /// ```
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Integer(i) => Some(*i as f64),
            MetadataValue::Float(f) => Some(*f),
            MetadataValue::String(s) => s.trim().parse::<f64>().ok(),
            MetadataValue::Bool(_) => None,
        }
    }

    /// String view of the value, used by the text operators
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            MetadataValue::String(s) => Cow::Borrowed(s.as_str()),
            other => Cow::Owned(other.to_string()),
        }
    }

    /// Whether the value is stored as a number
    pub fn is_numeric(&self) -> bool {
        matches!(self, MetadataValue::Integer(_) | MetadataValue::Float(_))
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Integer(i) => write!(f, "{}", i),
            MetadataValue::Float(x) => write!(f, "{}", x),
            MetadataValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

impl From<i32> for MetadataValue {
    fn from(value: i32) -> Self {
        MetadataValue::Integer(i64::from(value))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

/// A context document supplied by the caller
///
/// Documents are immutable once built; the query call owns them for its
/// duration and never persists them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Display name, must be non-empty
    pub name: String,

    /// Full text handed to the model
    pub content: String,

    /// Scalar metadata used by filters
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl Document {
    /// Create a document without metadata
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add one metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Look up a metadata value
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    /// Check the required fields
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("document name is empty".to_string());
        }
        Ok(())
    }
}
