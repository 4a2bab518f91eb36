//! Error types for the query pipeline

use reag_domain::FilterError;
use reag_llm::LlmError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why one batch produced no results
///
/// Cloned onto every document of a failed batch in streaming mode.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    /// The model call itself failed
    #[error("Invocation failed: {0}")]
    Invocation(String),

    /// The output was not well-formed structured text
    #[error("Malformed model output: {message}")]
    Parse {
        /// What went wrong
        message: String,
        /// The raw output, for diagnosis
        raw: String,
    },

    /// An item violated the baseline or the output schema
    #[error("Item {index}: field '{field}' {message}")]
    Validation {
        /// Position of the item within its batch
        index: usize,
        /// Offending field
        field: String,
        /// What is wrong with it
        message: String,
    },

    /// The model returned the wrong number of judgments
    #[error("Expected {expected} judgments, got {actual}")]
    CountMismatch {
        /// Documents in the batch
        expected: usize,
        /// Judgments returned
        actual: usize,
    },

    /// The query deadline passed before the batch completed
    #[error("Query deadline elapsed before the batch completed")]
    DeadlineElapsed,
}

impl From<LlmError> for BatchError {
    fn from(e: LlmError) -> Self {
        BatchError::Invocation(e.to_string())
    }
}

/// A failed batch within an aggregated error
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    /// 0-based batch index
    pub batch_index: usize,
    /// Number of batches in the query
    pub total_batches: usize,
    /// Names of the batch's documents
    pub document_names: Vec<String>,
    /// What went wrong
    pub error: BatchError,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch {}/{}: {}",
            self.batch_index + 1,
            self.total_batches,
            self.error
        )
    }
}

/// Errors that can occur during a query
#[derive(Error, Debug)]
pub enum QueryError {
    /// Invalid configuration or input, raised before dispatch
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid filter, raised before dispatch
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Model adapter error outside any batch
    #[error("Model error: {0}")]
    Model(#[from] LlmError),

    /// At least one batch failed; every batch ran to completion
    #[error(
        "{} of {total} batches failed: {}",
        .failures.len(),
        join_failures(.failures)
    )]
    BatchesFailed {
        /// Number of batches dispatched
        total: usize,
        /// Failures, by ascending batch index
        failures: Vec<BatchFailure>,
    },

    /// The query deadline elapsed
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
}

impl QueryError {
    /// Per-batch failures, empty unless `BatchesFailed`
    pub fn failures(&self) -> &[BatchFailure] {
        match self {
            QueryError::BatchesFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}

fn join_failures(failures: &[BatchFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
