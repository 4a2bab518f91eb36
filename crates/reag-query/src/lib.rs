//! ReAG Query
//!
//! Reasoning-augmented retrieval: instead of ranking documents by embedding
//! similarity, every candidate document is read by a language model which
//! judges whether it helps answer the question.
//!
//! # Overview
//!
//! A query carries a prompt, a set of documents and optional metadata
//! filters. Documents that pass the filters are split into batches, each
//! batch is judged by one model call, and all batches run concurrently.
//! Results come back in document order, either all at once or as a stream
//! that yields each batch's judgments as soon as that batch completes.
//!
//! # Architecture
//!
//! ```text
//! Documents → Filter → Batches → Prompt → Model ─┐
//!                                  ↑             │ (one call per batch,
//!                          Memory history        │  concurrent)
//!                                                ↓
//!                       Results ← Assemble ← Parse & validate
//! ```
//!
//! # Example Usage
//!
//! ```
//! use reag_domain::{ConversationLog, Document};
//! use reag_llm::MockModel;
//! use reag_query::{ClientConfig, QueryOptions, ReagClient};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let memory = ConversationLog::new();
//! let client = ReagClient::builder(ClientConfig::default().with_batch_size(2))
//!     .invoker(MockModel::echo())
//!     .memory(memory.clone())
//!     .build()?;
//!
//! let documents = vec![
//!     Document::new("Superagent", "Superagent is an AI agent framework."),
//!     Document::new("Recipes", "Add salt to taste."),
//!     Document::new("Changelog", "v0.2 adds streaming."),
//! ];
//!
//! let results = client
//!     .query("What is Superagent?", documents, QueryOptions::new())
//!     .await?;
//!
//! assert_eq!(results.len(), 3);
//! assert_eq!(results[0].document.name, "Superagent");
//! assert_eq!(memory.len(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod batching;
mod client;
mod config;
mod dispatch;
mod error;
mod parser;
mod prompt;
mod schema;
mod types;

#[cfg(test)]
mod tests;

pub use batching::{batch_documents, Batch};
pub use client::{ReagClient, ReagClientBuilder};
pub use config::{ClientConfig, DEFAULT_BATCH_SIZE, DEFAULT_MODEL};
pub use error::{BatchError, BatchFailure, QueryError};
pub use parser::parse_response;
pub use prompt::{PromptBuilder, DEFAULT_SYSTEM_PROMPT};
pub use schema::{FieldType, OutputSchema, SchemaField, BASELINE_FIELDS};
pub use types::{QueryOptions, QueryOutput, QueryRequest, StreamItem};

// Types that appear in this crate's API
pub use reag_domain::{
    ConversationLog, ConversationMemory, Document, FilterCondition, FilterOperator, FilterSpec,
    Judgment, MemoryEntry, MetadataValue, QueryResult,
};
pub use reag_llm::{LlmError, ModelInvoker};
