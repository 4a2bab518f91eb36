//! Judgments and query results

use crate::document::Document;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The model's verdict on one document, before it is re-attached to it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Judgment {
    /// Relevant excerpt or answer, empty when irrelevant
    pub content: String,

    /// Why the model reached its verdict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Whether the document is irrelevant to the query
    pub is_irrelevant: bool,

    /// Additional fields declared by a caller-supplied output schema
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

/// One result per document that survived filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Relevant excerpt or answer, empty when irrelevant
    pub content: String,

    /// Why the model reached its verdict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Whether the document is irrelevant to the query
    pub is_irrelevant: bool,

    /// Additional fields declared by a caller-supplied output schema
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,

    /// The judged document
    pub document: Document,
}

impl QueryResult {
    /// Attach a judgment to the document it was made for
    pub fn from_judgment(judgment: Judgment, document: Document) -> Self {
        Self {
            content: judgment.content,
            reasoning: judgment.reasoning,
            is_irrelevant: judgment.is_irrelevant,
            fields: judgment.fields,
            document,
        }
    }

    /// Negation of `is_irrelevant`
    pub fn is_relevant(&self) -> bool {
        !self.is_irrelevant
    }

    /// Look up a schema field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
