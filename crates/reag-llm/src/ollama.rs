//! Ollama Adapter
//!
//! Talks to a local Ollama instance through its chat API.
//!
//! # Features
//!
//! - Chat messages sent as-is, response schema passed as the `format` constraint
//! - `model_kwargs` forwarded as Ollama `options`
//! - Retry logic with exponential backoff
//! - NDJSON streaming
//!
//! # Examples
//!
//! ```no_run
//! use reag_llm::OllamaModel;
//!
//! let model = OllamaModel::new("http://localhost:11434", "deepseek-r1:7b").unwrap();
//! ```

use crate::http::{body_lines, client, send_with_retry};
use crate::{ChunkStream, LlmError, ModelInvoker};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reag_domain::{ModelOutput, PromptPayload};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Default timeout for one request
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default number of retry attempts
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Ollama chat adapter
pub struct OllamaModel {
    endpoint: String,
    model: String,
    name: String,
    client: reqwest::Client,
    max_retries: u32,
    options: Map<String, Value>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

/// One `/api/chat` response object, or one line of a streamed response
#[derive(Deserialize)]
struct OllamaChatChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaModel {
    /// Create an adapter for `model` served at `endpoint`
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        let model = model.into();
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            name: format!("ollama/{}", model),
            model,
            client: client(Duration::from_secs(DEFAULT_TIMEOUT_SECS))?,
            max_retries: DEFAULT_MAX_RETRIES,
            options: Map::new(),
        })
    }

    /// Create an adapter against `http://localhost:11434`
    pub fn default_endpoint(model: impl Into<String>) -> Result<Self, LlmError> {
        Self::new(DEFAULT_ENDPOINT, model)
    }

    /// Set the maximum number of retry attempts
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set model options such as `temperature` or `num_ctx`
    pub fn with_options(mut self, options: Map<String, Value>) -> Self {
        self.options = options;
        self
    }

    fn request_body(&self, payload: &PromptPayload, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": payload.messages,
            "stream": stream,
        });
        if !payload.response_schema.is_null() {
            body["format"] = payload.response_schema.clone();
        }
        if !self.options.is_empty() {
            body["options"] = Value::Object(self.options.clone());
        }
        body
    }

    async fn send(&self, payload: &PromptPayload, stream: bool) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/api/chat", self.endpoint);
        let body = self.request_body(payload, stream);
        tracing::debug!(
            model = %self.name,
            batch = payload.batch_index,
            stream,
            "Sending Ollama chat request"
        );
        send_with_retry(
            || self.client.post(&url).json(&body),
            self.max_retries,
            &self.model,
        )
        .await
    }
}

#[async_trait]
impl ModelInvoker for OllamaModel {
    async fn invoke(&self, payload: &PromptPayload) -> Result<ModelOutput, LlmError> {
        let response = self.send(payload, false).await?;
        let chunk = response
            .json::<OllamaChatChunk>()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        if let Some(error) = chunk.error {
            return Err(LlmError::Communication(error));
        }
        let message = chunk
            .message
            .ok_or_else(|| LlmError::InvalidResponse("Response has no message".to_string()))?;
        Ok(ModelOutput::Text(message.content))
    }

    async fn invoke_stream(&self, payload: &PromptPayload) -> Result<ChunkStream, LlmError> {
        let response = self.send(payload, true).await?;
        Ok(Box::pin(ndjson_chunks(response)))
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Message text of each NDJSON line until `done`
fn ndjson_chunks(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, LlmError>> + Send + 'static {
    async_stream::try_stream! {
        let mut lines = Box::pin(body_lines(response));
        while let Some(line) = lines.next().await {
            let line = line?;
            let chunk: OllamaChatChunk = serde_json::from_str(&line)?;
            if let Some(error) = chunk.error {
                Err::<(), LlmError>(LlmError::Communication(error))?;
            }
            if let Some(message) = chunk.message {
                if !message.content.is_empty() {
                    yield message.content;
                }
            }
            if chunk.done {
                break;
            }
        }
    }
}
