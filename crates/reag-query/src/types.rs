//! Request and response types for queries

use crate::error::BatchError;
use futures::stream::BoxStream;
use reag_domain::{Document, FilterCondition, FilterError, FilterSpec, QueryResult};
use serde_json::Value;
use std::fmt;

/// Per-query options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Metadata conditions every document must satisfy
    pub filter: FilterSpec,
}

impl QueryOptions {
    /// No filtering
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filter
    pub fn with_filter(mut self, filter: impl Into<FilterSpec>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Parse options from their JSON wire shape
    ///
    /// `filter` may be a list of conditions or a single condition object.
    ///
    /// # Examples
    ///
    /// ```
    /// use reag_query::QueryOptions;
    /// use serde_json::json;
    ///
    /// let single = QueryOptions::from_json(&json!({
    ///     "filter": {"key": "source", "value": "web"}
    /// })).unwrap();
    /// assert_eq!(single.filter.conditions.len(), 1);
    ///
    /// let many = QueryOptions::from_json(&json!({
    ///     "filter": [
    ///         {"key": "source", "value": "web"},
    ///         {"key": "year", "value": 2020, "operator": "greaterThan"}
    ///     ]
    /// })).unwrap();
    /// assert_eq!(many.filter.conditions.len(), 2);
    /// ```
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        let raw_filter = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map.get("filter"),
            _ => {
                return Err(FilterError::InvalidCondition(
                    "options must be an object".to_string(),
                ))
            }
        };

        let conditions = match raw_filter {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(FilterCondition::from_json)
                .collect::<Result<Vec<_>, _>>()?,
            Some(single @ Value::Object(_)) => vec![FilterCondition::from_json(single)?],
            Some(_) => {
                return Err(FilterError::InvalidCondition(
                    "filter must be a condition or a list of conditions".to_string(),
                ))
            }
        };

        Ok(Self {
            filter: FilterSpec::new(conditions),
        })
    }
}

/// A query to run
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// The user prompt
    pub prompt: String,

    /// Candidate documents, in caller order
    pub documents: Vec<Document>,

    /// Filtering options
    pub options: QueryOptions,

    /// Yield results per batch as they complete
    pub stream: bool,
}

impl QueryRequest {
    /// Non-streaming query without filters
    pub fn new(prompt: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            prompt: prompt.into(),
            documents,
            options: QueryOptions::default(),
            stream: false,
        }
    }

    /// Set the options
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Request streaming output
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// One element of a streamed query
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    /// A document was judged
    Judged {
        /// Index of the document among those that passed filtering
        position: usize,
        /// Its result
        result: QueryResult,
    },

    /// The document's batch failed
    Failed {
        /// Index of the document among those that passed filtering
        position: usize,
        /// 0-based batch index
        batch_index: usize,
        /// The document that could not be judged
        document: Document,
        /// Why its batch failed
        error: BatchError,
    },
}

impl StreamItem {
    /// Index of the document among those that passed filtering
    pub fn position(&self) -> usize {
        match self {
            StreamItem::Judged { position, .. } | StreamItem::Failed { position, .. } => *position,
        }
    }

    /// The result, if the document was judged
    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            StreamItem::Judged { result, .. } => Some(result),
            StreamItem::Failed { .. } => None,
        }
    }

    /// Whether the document's batch failed
    pub fn is_failed(&self) -> bool {
        matches!(self, StreamItem::Failed { .. })
    }
}

/// Output of [`ReagClient::execute`](crate::ReagClient::execute)
pub enum QueryOutput {
    /// All results, in document order
    Complete(Vec<QueryResult>),
    /// Results per batch as batches complete
    Streaming(BoxStream<'static, StreamItem>),
}

impl QueryOutput {
    /// The results of a non-streaming query
    pub fn into_results(self) -> Option<Vec<QueryResult>> {
        match self {
            QueryOutput::Complete(results) => Some(results),
            QueryOutput::Streaming(_) => None,
        }
    }

    /// The stream of a streaming query
    pub fn into_stream(self) -> Option<BoxStream<'static, StreamItem>> {
        match self {
            QueryOutput::Complete(_) => None,
            QueryOutput::Streaming(stream) => Some(stream),
        }
    }
}

impl fmt::Debug for QueryOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOutput::Complete(results) => f.debug_tuple("Complete").field(results).finish(),
            QueryOutput::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}
