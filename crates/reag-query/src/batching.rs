//! Partitioning filtered documents into model-call batches

use crate::error::QueryError;
use reag_domain::Document;

/// Contiguous run of documents judged by one model call
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 0-based batch index
    pub index: usize,
    /// Position of the first document among the filtered documents
    pub offset: usize,
    /// The documents, in order
    pub documents: Vec<Document>,
}

impl Batch {
    /// Number of documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Whether the batch has no documents
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Document names, in order
    pub fn document_names(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.name.clone()).collect()
    }
}

/// Split documents into batches of at most `batch_size`
///
/// The partition is contiguous and exhaustive: `ceil(n / batch_size)`
/// batches, only the last of which may be smaller. No documents means no
/// batches.
///
/// # Errors
///
/// [`QueryError::Config`] when `batch_size` is zero.
pub fn batch_documents(documents: Vec<Document>, batch_size: usize) -> Result<Vec<Batch>, QueryError> {
    if batch_size == 0 {
        return Err(QueryError::Config(
            "batch_size must be greater than 0".to_string(),
        ));
    }

    let mut batches = Vec::with_capacity(documents.len().div_ceil(batch_size));
    let mut remaining = documents.into_iter().peekable();
    let mut offset = 0;

    while remaining.peek().is_some() {
        let documents: Vec<Document> = remaining.by_ref().take(batch_size).collect();
        let len = documents.len();
        batches.push(Batch {
            index: batches.len(),
            offset,
            documents,
        });
        offset += len;
    }

    Ok(batches)
}
