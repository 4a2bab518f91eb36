//! What goes to the model and what comes back

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions and context
    System,
    /// The caller
    User,
    /// The model
    Assistant,
}

/// Chat message for completion requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message
    pub role: Role,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Everything one model invocation receives for one batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptPayload {
    /// System message, prior history, then the user query
    pub messages: Vec<ChatMessage>,

    /// JSON Schema the response must conform to
    pub response_schema: Value,

    /// Index of the batch this payload was composed for
    pub batch_index: usize,

    /// Number of judgments the response must contain
    pub expected_count: usize,

    /// Names of the batch's documents, in order
    pub document_names: Vec<String>,
}

impl PromptPayload {
    /// Render every message into one prompt text
    ///
    /// For adapters whose API takes a single prompt string.
    pub fn flatten(&self) -> String {
        let mut text = String::new();
        for message in &self.messages {
            let label = match message.role {
                Role::System => "System",
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            text.push_str(label);
            text.push_str(":\n");
            text.push_str(&message.content);
            text.push_str("\n\n");
        }
        text.truncate(text.trim_end().len());
        text
    }

    /// The last user message, which carries the query
    pub fn query(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Raw output of one model invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutput {
    /// Free text, expected to contain JSON
    Text(String),
    /// Already-parsed structured output
    Structured(Value),
}

impl ModelOutput {
    /// Text view, serializing structured output
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            ModelOutput::Text(text) => Cow::Borrowed(text.as_str()),
            ModelOutput::Structured(value) => Cow::Owned(value.to_string()),
        }
    }
}

impl From<String> for ModelOutput {
    fn from(text: String) -> Self {
        ModelOutput::Text(text)
    }
}

impl From<&str> for ModelOutput {
    fn from(text: &str) -> Self {
        ModelOutput::Text(text.to_string())
    }
}

impl From<Value> for ModelOutput {
    fn from(value: Value) -> Self {
        ModelOutput::Structured(value)
    }
}
