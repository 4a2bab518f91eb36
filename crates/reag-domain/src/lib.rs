//! ReAG Domain Layer
//!
//! This crate contains the value types and pure logic the query pipeline is
//! built on. It performs no I/O: model invocation lives in `reag-llm` and the
//! orchestration in `reag-query`.
//!
//! ## Key Concepts
//!
//! - **Document**: a named piece of context with scalar metadata
//! - **Filter Spec**: AND-combined metadata conditions restricting which
//!   documents reach the model
//! - **Judgment**: the model's per-document verdict (relevant excerpt,
//!   reasoning, irrelevance flag)
//! - **Prompt Payload**: what one model invocation receives for one batch
//! - **Conversation Memory**: append-only log of prior queries
//!
//! ## Example
//!
//! ```
//! use reag_domain::{Document, FilterCondition, FilterOperator, FilterSpec, filter_documents};
//!
//! let docs = vec![
//!     Document::new("A", "web page").with_metadata("source", "web"),
//!     Document::new("B", "a pdf").with_metadata("source", "pdf"),
//! ];
//! let spec = FilterSpec::new(vec![
//!     FilterCondition::new("source", "web", FilterOperator::Equals),
//! ]);
//!
//! let kept = filter_documents(docs, &spec).unwrap();
//! assert_eq!(kept.len(), 1);
//! assert_eq!(kept[0].name, "A");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod filter;
pub mod judgment;
pub mod memory;
pub mod payload;
pub mod traits;

// Re-exports for convenience
pub use document::{Document, MetadataValue};
pub use filter::{
    filter_documents, CompiledFilter, FilterCondition, FilterError, FilterOperator, FilterSpec,
};
pub use judgment::{Judgment, QueryResult};
pub use memory::{ConversationLog, MemoryEntry};
pub use payload::{ChatMessage, ModelOutput, PromptPayload, Role};
pub use traits::ConversationMemory;
