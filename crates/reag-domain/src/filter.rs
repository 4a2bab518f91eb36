//! Metadata filtering - the Predicate Evaluator and Filter Engine
//!
//! A [`FilterSpec`] is an ordered list of [`FilterCondition`]s combined with
//! AND. Compiling a spec validates it once (regex patterns included) so that
//! evaluation itself can never fail: an incomparable pair is a non-match.

use crate::document::{Document, MetadataValue};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while building a filter spec
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    /// Operator name is not one of the supported operators
    #[error("Unknown filter operator: {0}")]
    UnknownOperator(String),

    /// `regex` condition whose value does not compile
    #[error("Invalid regex pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The offending pattern
        pattern: String,
        /// Compiler message
        message: String,
    },

    /// Condition does not have the `{key, value, operator}` shape
    #[error("Invalid filter condition: {0}")]
    InvalidCondition(String),
}

/// Comparison operator of a filter condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    /// Type-aware equality
    #[default]
    Equals,
    /// Negated equality; satisfied by a missing key
    NotEquals,
    /// Substring match on the stringified value
    Contains,
    /// Prefix match on the stringified value
    StartsWith,
    /// Suffix match on the stringified value
    EndsWith,
    /// Pattern match anchored at the start of the stringified value
    Regex,
    /// Numeric `>`
    GreaterThan,
    /// Numeric `<`
    LessThan,
    /// Numeric `>=`
    GreaterThanOrEqual,
    /// Numeric `<=`
    LessThanOrEqual,
}

impl FilterOperator {
    /// Every supported operator
    pub const ALL: [FilterOperator; 10] = [
        FilterOperator::Equals,
        FilterOperator::NotEquals,
        FilterOperator::Contains,
        FilterOperator::StartsWith,
        FilterOperator::EndsWith,
        FilterOperator::Regex,
        FilterOperator::GreaterThan,
        FilterOperator::LessThan,
        FilterOperator::GreaterThanOrEqual,
        FilterOperator::LessThanOrEqual,
    ];

    /// Wire name of the operator
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "notEquals",
            FilterOperator::Contains => "contains",
            FilterOperator::StartsWith => "startsWith",
            FilterOperator::EndsWith => "endsWith",
            FilterOperator::Regex => "regex",
            FilterOperator::GreaterThan => "greaterThan",
            FilterOperator::LessThan => "lessThan",
            FilterOperator::GreaterThanOrEqual => "greaterThanOrEqual",
            FilterOperator::LessThanOrEqual => "lessThanOrEqual",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterOperator::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| FilterError::UnknownOperator(s.to_string()))
    }
}

/// One metadata condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition")]
pub struct FilterCondition {
    /// Metadata key to inspect
    pub key: String,

    /// Value to compare against
    pub value: MetadataValue,

    /// How to compare
    pub operator: FilterOperator,
}

/// Wire shape before the operator name is checked
#[derive(Deserialize)]
struct RawCondition {
    key: String,
    value: MetadataValue,
    #[serde(default)]
    operator: Option<String>,
}

impl TryFrom<RawCondition> for FilterCondition {
    type Error = FilterError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        let operator = match raw.operator.as_deref() {
            None => FilterOperator::default(),
            Some(name) => name.parse()?,
        };
        Ok(FilterCondition {
            key: raw.key,
            value: raw.value,
            operator,
        })
    }
}

impl FilterCondition {
    /// Create a condition
    pub fn new(
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
        operator: FilterOperator,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            operator,
        }
    }

    /// Parse a condition from its JSON wire shape
    ///
    /// A missing `operator` means `equals`.
    ///
    /// # Examples
    ///
    /// ```
    /// use reag_domain::{FilterCondition, FilterOperator};
    /// use serde_json::json;
    ///
    /// let cond = FilterCondition::from_json(&json!({"key": "version", "value": 2})).unwrap();
    /// assert_eq!(cond.operator, FilterOperator::Equals);
    ///
    /// let bad = FilterCondition::from_json(&json!({"key": "k", "value": 1, "operator": "like"}));
    /// assert!(bad.is_err());
    /// ```
    pub fn from_json(value: &serde_json::Value) -> Result<Self, FilterError> {
        let raw: RawCondition = serde_json::from_value(value.clone())
            .map_err(|e| FilterError::InvalidCondition(e.to_string()))?;
        FilterCondition::try_from(raw)
    }
}

/// AND-combined list of conditions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSpec {
    /// Conditions, all of which must hold
    pub conditions: Vec<FilterCondition>,
}

impl FilterSpec {
    /// Create a spec from conditions
    pub fn new(conditions: Vec<FilterCondition>) -> Self {
        Self { conditions }
    }

    /// Whether the spec keeps every document
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Validate the spec and precompile its patterns
    pub fn compile(&self) -> Result<CompiledFilter, FilterError> {
        let conditions = self
            .conditions
            .iter()
            .map(|condition| {
                let pattern = match condition.operator {
                    FilterOperator::Regex => Some(anchored_pattern(&condition.value.as_text())?),
                    _ => None,
                };
                Ok(CompiledCondition {
                    condition: condition.clone(),
                    pattern,
                })
            })
            .collect::<Result<Vec<_>, FilterError>>()?;

        Ok(CompiledFilter { conditions })
    }
}

impl From<Vec<FilterCondition>> for FilterSpec {
    fn from(conditions: Vec<FilterCondition>) -> Self {
        Self::new(conditions)
    }
}

#[derive(Debug, Clone)]
struct CompiledCondition {
    condition: FilterCondition,
    pattern: Option<Regex>,
}

/// A validated filter spec, ready to apply
#[derive(Debug, Clone, Default)]
pub struct CompiledFilter {
    conditions: Vec<CompiledCondition>,
}

impl CompiledFilter {
    /// Whether a document satisfies every condition
    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|compiled| {
            evaluate_with(
                document.get(&compiled.condition.key),
                &compiled.condition,
                compiled.pattern.as_ref(),
            )
        })
    }

    /// Keep the matching documents, preserving order
    pub fn apply(&self, documents: Vec<Document>) -> Vec<Document> {
        if self.conditions.is_empty() {
            return documents;
        }
        documents.into_iter().filter(|d| self.matches(d)).collect()
    }
}

/// Filter documents with a spec
///
/// Fails only when the spec itself is malformed.
pub fn filter_documents(
    documents: Vec<Document>,
    spec: &FilterSpec,
) -> Result<Vec<Document>, FilterError> {
    Ok(spec.compile()?.apply(documents))
}

/// Evaluate one condition against one metadata value
///
/// `value` is `None` when the document has no entry for the condition's key.
/// A `regex` condition with an invalid pattern evaluates to `false`; use
/// [`FilterSpec::compile`] to reject such patterns up front.
pub fn evaluate(value: Option<&MetadataValue>, condition: &FilterCondition) -> bool {
    match condition.operator {
        FilterOperator::Regex => match anchored_pattern(&condition.value.as_text()) {
            Ok(re) => evaluate_with(value, condition, Some(&re)),
            Err(_) => false,
        },
        _ => evaluate_with(value, condition, None),
    }
}

fn evaluate_with(
    value: Option<&MetadataValue>,
    condition: &FilterCondition,
    pattern: Option<&Regex>,
) -> bool {
    let Some(actual) = value else {
        return condition.operator == FilterOperator::NotEquals;
    };
    let expected = &condition.value;

    match condition.operator {
        FilterOperator::Equals => values_equal(actual, expected),
        FilterOperator::NotEquals => !values_equal(actual, expected),
        FilterOperator::Contains => actual.as_text().contains(expected.as_text().as_ref()),
        FilterOperator::StartsWith => actual.as_text().starts_with(expected.as_text().as_ref()),
        FilterOperator::EndsWith => actual.as_text().ends_with(expected.as_text().as_ref()),
        FilterOperator::Regex => pattern.is_some_and(|re| re.is_match(&actual.as_text())),
        FilterOperator::GreaterThan => numeric_cmp(actual, expected) == Some(Ordering::Greater),
        FilterOperator::LessThan => numeric_cmp(actual, expected) == Some(Ordering::Less),
        FilterOperator::GreaterThanOrEqual => matches!(
            numeric_cmp(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOperator::LessThanOrEqual => matches!(
            numeric_cmp(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

fn values_equal(actual: &MetadataValue, expected: &MetadataValue) -> bool {
    match (actual, expected) {
        (MetadataValue::String(a), MetadataValue::String(b)) => a == b,
        (MetadataValue::Bool(a), MetadataValue::Bool(b)) => a == b,
        (MetadataValue::Integer(a), MetadataValue::Integer(b)) => a == b,
        (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64() == b.as_f64(),
        _ => false,
    }
}

fn numeric_cmp(actual: &MetadataValue, expected: &MetadataValue) -> Option<Ordering> {
    actual.as_f64()?.partial_cmp(&expected.as_f64()?)
}

fn anchored_pattern(pattern: &str) -> Result<Regex, FilterError> {
    let invalid = |e: regex::Error| FilterError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    };
    // The bare pattern must parse on its own, or a stray `)` escapes the group
    Regex::new(pattern).map_err(invalid)?;
    Regex::new(&format!("^(?:{})", pattern)).map_err(invalid)
}
