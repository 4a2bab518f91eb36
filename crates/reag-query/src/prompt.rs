//! Prompt composition for one batch

use crate::batching::Batch;
use crate::schema::OutputSchema;
use reag_domain::{ChatMessage, Document, MemoryEntry, PromptPayload};
use std::fmt::Write as _;

/// Preamble used when the configuration supplies none
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a retrieval assistant. You receive a question and a set of source documents.
Read every source in full and decide, for each one independently, whether it helps answer the question.

For a relevant source, put the passage or the answer it supports in `content` and explain in `reasoning` how it relates to the question.
For an irrelevant source, set `is_irrelevant` to true and leave `content` empty.

Judge each source only by its own text and metadata. Do not merge sources and do not invent facts they do not contain."#;

/// Builds the payload for each batch of one query
///
/// Everything except the batch is fixed per query, so one builder serves
/// all of its batches.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    query: String,
    preamble: String,
    schema: OutputSchema,
    history: Vec<MemoryEntry>,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new(query: impl Into<String>, preamble: Option<&str>, schema: OutputSchema) -> Self {
        Self {
            query: query.into(),
            preamble: preamble.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string(),
            schema,
            history: Vec::new(),
        }
    }

    /// Add prior exchanges as conversation context
    pub fn with_history(mut self, history: Vec<MemoryEntry>) -> Self {
        self.history = history;
        self
    }

    /// Compose the payload for one batch
    pub fn build(&self, batch: &Batch) -> PromptPayload {
        let mut messages = Vec::with_capacity(2 + self.history.len() * 2);
        messages.push(ChatMessage::system(self.system_message(batch)));
        for entry in &self.history {
            messages.push(ChatMessage::user(entry.query.clone()));
            messages.push(ChatMessage::assistant(entry.response.clone()));
        }
        messages.push(ChatMessage::user(self.query.clone()));

        PromptPayload {
            messages,
            response_schema: self.schema.response_schema(batch.len()),
            batch_index: batch.index,
            expected_count: batch.len(),
            document_names: batch.document_names(),
        }
    }

    fn system_message(&self, batch: &Batch) -> String {
        let mut text = String::new();

        // 1. Preamble
        text.push_str(self.preamble.trim_end());
        text.push_str("\n\n");

        // 2. Output shape
        text.push_str(&self.output_instructions(batch.len()));
        text.push_str("\n\n");

        // 3. The sources
        text.push_str("# Available sources\n");
        for (i, document) in batch.documents.iter().enumerate() {
            let _ = write!(text, "\n## Source {} of {}\n", i + 1, batch.len());
            text.push_str(&format_document(document));
            text.push('\n');
        }

        text.truncate(text.trim_end().len());
        text
    }

    fn output_instructions(&self, count: usize) -> String {
        let mut text = String::from("# Output format\n");
        let _ = writeln!(
            text,
            "Return a JSON object with a \"judgments\" array containing exactly {} item{}, one per source, in the order the sources are listed.",
            count,
            if count == 1 { "" } else { "s" }
        );
        text.push_str("Each item has these fields:\n");
        text.push_str("- content (string): the relevant passage or answer; empty when irrelevant\n");
        text.push_str("- reasoning (string, optional): why the source is or is not relevant\n");
        text.push_str("- is_irrelevant (boolean): true when the source does not help answer the question\n");
        for field in &self.schema.fields {
            let _ = write!(
                text,
                "- {} ({}{})",
                field.name,
                field.field_type,
                if field.required { "" } else { ", optional" }
            );
            if let Some(description) = &field.description {
                let _ = write!(text, ": {}", description);
            }
            text.push('\n');
        }
        text.push_str("Return only the JSON object, with no markdown and no commentary.");
        text
    }
}

/// Render a document as name, metadata and content
fn format_document(document: &Document) -> String {
    let metadata = if document.metadata.is_empty() {
        "(none)".to_string()
    } else {
        document
            .metadata
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "Name: {}\nMetadata: {}\nContent:\n{}",
        document.name, metadata, document.content
    )
}
