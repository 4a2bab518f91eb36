//! ReAG Model Invocation Layer
//!
//! The query pipeline treats the model as an opaque async call: a prompt
//! payload with its response schema goes in, raw text or a structured value
//! comes out. This crate defines that seam and the adapters behind it.
//!
//! # Adapters
//!
//! - `MockModel`: Deterministic mock for testing
//! - `OllamaModel`: Local Ollama chat API
//! - `OpenAiModel`: OpenAI-compatible chat completions (OpenAI, OpenRouter, Groq, Together)
//!
//! Adapters are selected from a `provider/model` identifier by
//! [`build_invoker`].
//!
//! # Examples
//!
//! ```
//! use reag_llm::{MockModel, ModelInvoker};
//! use reag_domain::{ChatMessage, PromptPayload};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let model = MockModel::new(r#"{"judgments": []}"#);
//! let payload = PromptPayload {
//!     messages: vec![ChatMessage::user("What is Superagent?")],
//!     response_schema: serde_json::json!({}),
//!     batch_index: 0,
//!     expected_count: 0,
//!     document_names: vec![],
//! };
//! let output = model.invoke(&payload).await.unwrap();
//! assert_eq!(output.as_text(), r#"{"judgments": []}"#);
//! assert_eq!(model.call_count(), 1);
//! # }
//! ```

#![warn(missing_docs)]

mod http;
pub mod ollama;
pub mod openai;
pub mod provider;

use async_trait::async_trait;
use futures::stream::BoxStream;
use reag_domain::{ModelOutput, PromptPayload};
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

pub use ollama::OllamaModel;
pub use openai::OpenAiModel;
pub use provider::{build_invoker, Provider, ProviderSettings};

/// Errors that can occur during LLM operations
#[derive(Error, Debug)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Invalid response from LLM
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Adapter could not be configured
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("LLM error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::InvalidResponse(err.to_string())
    }
}

/// Incremental text chunks of one streamed invocation
pub type ChunkStream = BoxStream<'static, Result<String, LlmError>>;

/// Capability to invoke a model for one batch
///
/// Implementations handle provider auth and retries internally. The query
/// pipeline never retries on its own.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Run one completion and return its raw output
    async fn invoke(&self, payload: &PromptPayload) -> Result<ModelOutput, LlmError>;

    /// Run one completion, yielding the text as it is produced
    ///
    /// The default yields the whole `invoke` output as a single chunk.
    async fn invoke_stream(&self, payload: &PromptPayload) -> Result<ChunkStream, LlmError> {
        let text = self.invoke(payload).await?.as_text().into_owned();
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }

    /// Model identifier, for logging
    fn model_name(&self) -> &str;

    /// Release transport resources
    async fn close(&self) -> Result<(), LlmError> {
        Ok(())
    }
}

type Handler = dyn Fn(&PromptPayload) -> Result<ModelOutput, LlmError> + Send + Sync;

#[derive(Debug, Clone)]
enum Scripted {
    Respond(String),
    Fail(String),
}

/// Mock model for deterministic testing
///
/// Returns pre-configured responses without making any network calls.
/// Scripted responses, errors and delays are keyed by a needle that is
/// searched for in the flattened prompt; the first registered match wins. Clones share scripts and counters.
///
/// # Examples
///
/// ```
/// use reag_llm::MockModel;
///
/// let model = MockModel::default();
/// model.add_response("Name: A", r#"[{"content": "a", "is_irrelevant": false}]"#);
/// model.add_error("Name: B", "upstream timeout");
/// assert_eq!(model.call_count(), 0);
/// ```
#[derive(Clone)]
pub struct MockModel {
    name: String,
    default_response: String,
    handler: Option<Arc<Handler>>,
    scripted: Arc<Mutex<Vec<(String, Scripted)>>>,
    delays: Arc<Mutex<Vec<(String, Duration)>>>,
    stream_chunk_size: Option<usize>,
    call_count: Arc<AtomicUsize>,
    payloads: Arc<Mutex<Vec<PromptPayload>>>,
    closed: Arc<AtomicBool>,
}

impl MockModel {
    /// Create a new MockModel with a fixed response for all prompts
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            name: "mock/fixed".to_string(),
            default_response: response.into(),
            handler: None,
            scripted: Arc::new(Mutex::new(Vec::new())),
            delays: Arc::new(Mutex::new(Vec::new())),
            stream_chunk_size: None,
            call_count: Arc::new(AtomicUsize::new(0)),
            payloads: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a MockModel that computes every response from the payload
    pub fn from_fn<F>(handler: F) -> Self
    where
        F: Fn(&PromptPayload) -> Result<ModelOutput, LlmError> + Send + Sync + 'static,
    {
        let mut model = Self::new(String::new());
        model.name = "mock/fn".to_string();
        model.handler = Some(Arc::new(handler));
        model
    }

    /// Create a MockModel that judges every document relevant
    ///
    /// Each judgment's `content` is the document name, so tests can check
    /// that results line up with their documents.
    pub fn echo() -> Self {
        let mut model = Self::from_fn(|payload| {
            let judgments: Vec<_> = payload
                .document_names
                .iter()
                .map(|name| {
                    json!({
                        "content": name,
                        "reasoning": format!("batch {}", payload.batch_index),
                        "is_irrelevant": false,
                    })
                })
                .collect();
            Ok(ModelOutput::Structured(json!({ "judgments": judgments })))
        });
        model.name = "mock/echo".to_string();
        model
    }

    /// Split streamed output into chunks of at most `size` characters
    pub fn with_stream_chunk_size(mut self, size: usize) -> Self {
        self.stream_chunk_size = Some(size.max(1));
        self
    }

    /// Add a specific response for prompts containing `needle`
    pub fn add_response(&self, needle: impl Into<String>, response: impl Into<String>) {
        lock(&self.scripted).push((needle.into(), Scripted::Respond(response.into())));
    }

    /// Configure to return an error for prompts containing `needle`
    pub fn add_error(&self, needle: impl Into<String>, message: impl Into<String>) {
        lock(&self.scripted).push((needle.into(), Scripted::Fail(message.into())));
    }

    /// Delay responses to prompts containing `needle`
    pub fn add_delay(&self, needle: impl Into<String>, delay: Duration) {
        lock(&self.delays).push((needle.into(), delay));
    }

    /// Get the number of times invoke was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Reset the call count
    pub fn reset_call_count(&self) {
        self.call_count.store(0, Ordering::SeqCst);
    }

    /// Payloads received so far, in call order
    pub fn payloads(&self) -> Vec<PromptPayload> {
        lock(&self.payloads).clone()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new("Default mock response")
    }
}

impl fmt::Debug for MockModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockModel")
            .field("name", &self.name)
            .field("call_count", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ModelInvoker for MockModel {
    async fn invoke(&self, payload: &PromptPayload) -> Result<ModelOutput, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.payloads).push(payload.clone());

        let haystack = payload.flatten();
        let delay = find_match(&self.delays, &haystack);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match find_match(&self.scripted, &haystack) {
            Some(Scripted::Respond(response)) => Ok(ModelOutput::Text(response)),
            Some(Scripted::Fail(message)) => Err(LlmError::Other(message)),
            None => match &self.handler {
                Some(handler) => handler(payload),
                None => Ok(ModelOutput::Text(self.default_response.clone())),
            },
        }
    }

    async fn invoke_stream(&self, payload: &PromptPayload) -> Result<ChunkStream, LlmError> {
        let text = self.invoke(payload).await?.as_text().into_owned();
        let chunks: Vec<Result<String, LlmError>> = match self.stream_chunk_size {
            Some(size) => {
                let chars: Vec<char> = text.chars().collect();
                chars
                    .chunks(size)
                    .map(|chunk| Ok(chunk.iter().collect()))
                    .collect()
            }
            None => vec![Ok(text)],
        };
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    async fn close(&self) -> Result<(), LlmError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn find_match<T: Clone>(entries: &Mutex<Vec<(String, T)>>, haystack: &str) -> Option<T> {
    lock(entries)
        .iter()
        .find(|(needle, _)| haystack.contains(needle.as_str()))
        .map(|(_, value)| value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use reag_domain::ChatMessage;

    fn payload(query: &str, names: &[&str]) -> PromptPayload {
        PromptPayload {
            messages: vec![ChatMessage::system("sys"), ChatMessage::user(query)],
            response_schema: json!({}),
            batch_index: 3,
            expected_count: names.len(),
            document_names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_mock_model_default() {
        let model = MockModel::new("Test response");
        let output = model.invoke(&payload("any prompt", &[])).await.unwrap();
        assert_eq!(output, ModelOutput::Text("Test response".to_string()));
    }

    #[tokio::test]
    async fn test_mock_model_specific_responses() {
        let model = MockModel::default();
        model.add_response("hello", "world");
        model.add_response("foo", "bar");

        let hello = model.invoke(&payload("say hello", &[])).await.unwrap();
        let foo = model.invoke(&payload("foo?", &[])).await.unwrap();
        let other = model.invoke(&payload("unknown", &[])).await.unwrap();
        assert_eq!(hello.as_text(), "world");
        assert_eq!(foo.as_text(), "bar");
        assert_eq!(other.as_text(), "Default mock response");
    }

    #[tokio::test]
    async fn test_mock_model_error() {
        let model = MockModel::default();
        model.add_error("bad prompt", "boom");

        let result = model.invoke(&payload("a bad prompt", &[])).await;
        assert!(matches!(result, Err(LlmError::Other(message)) if message == "boom"));
    }

    #[tokio::test]
    async fn test_mock_model_call_count_shared_by_clones() {
        let model = MockModel::new("test");
        let clone = model.clone();

        model.invoke(&payload("one", &[])).await.unwrap();
        clone.invoke(&payload("two", &[])).await.unwrap();
        assert_eq!(model.call_count(), 2);
        assert_eq!(clone.payloads().len(), 2);

        model.reset_call_count();
        assert_eq!(clone.call_count(), 0);
    }

    #[tokio::test]
    async fn test_echo_judges_each_document() {
        let model = MockModel::echo();
        let output = model.invoke(&payload("q", &["A", "B"])).await.unwrap();
        let ModelOutput::Structured(value) = output else {
            panic!("expected structured output");
        };
        assert_eq!(value["judgments"][0]["content"], "A");
        assert_eq!(value["judgments"][1]["content"], "B");
        assert_eq!(value["judgments"][1]["reasoning"], "batch 3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applies_to_matching_prompt() {
        let model = MockModel::new("late");
        model.add_delay("slow", Duration::from_secs(5));

        let start = tokio::time::Instant::now();
        model.invoke(&payload("slow one", &[])).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));

        let start = tokio::time::Instant::now();
        model.invoke(&payload("fast one", &[])).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_stream_chunks_reassemble() {
        let model = MockModel::new("abcdefg").with_stream_chunk_size(3);
        let chunks: Vec<String> = model
            .invoke_stream(&payload("q", &[]))
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec!["abc", "def", "g"]);
    }

    #[tokio::test]
    async fn test_close_marks_model_closed() {
        let model = MockModel::default();
        assert!(!model.is_closed());
        model.close().await.unwrap();
        assert!(model.is_closed());
    }

    #[test]
    fn test_serde_error_maps_to_invalid_response() {
        let err: LlmError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }
}
