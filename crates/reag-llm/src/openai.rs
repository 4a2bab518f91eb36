//! OpenAI-compatible chat completions adapter
//!
//! Serves every provider that exposes `POST {base}/chat/completions`:
//! OpenAI itself, OpenRouter, Groq and Together.

use crate::http::{body_lines, client, send_with_retry};
use crate::{ChunkStream, LlmError, ModelInvoker};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reag_domain::{ModelOutput, PromptPayload};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Default timeout for one request
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default number of retry attempts
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Request keys that `model_kwargs` may not override
const RESERVED_KEYS: [&str; 4] = ["model", "messages", "stream", "response_format"];

/// OpenAI-compatible chat completions adapter
pub struct OpenAiModel {
    base_url: String,
    model: String,
    name: String,
    api_key: Option<String>,
    client: reqwest::Client,
    max_retries: u32,
    extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiModel {
    /// Create an adapter for `model` at `base_url`
    ///
    /// `name` is the full identifier reported by `model_name`, e.g.
    /// `openrouter/deepseek/deepseek-r1`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            name: name.into(),
            api_key: None,
            client: client(Duration::from_secs(DEFAULT_TIMEOUT_SECS))?,
            max_retries: DEFAULT_MAX_RETRIES,
            extra: Map::new(),
        })
    }

    /// Send `Authorization: Bearer <key>` with every request
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Set the maximum number of retry attempts
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Extra top-level request parameters such as `temperature`
    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra = extra;
        self
    }

    fn request_body(&self, payload: &PromptPayload, stream: bool) -> Value {
        let mut body = Map::new();
        for (key, value) in &self.extra {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                body.insert(key.clone(), value.clone());
            }
        }
        body.insert("model".to_string(), json!(self.model));
        body.insert("messages".to_string(), json!(payload.messages));
        body.insert("stream".to_string(), json!(stream));
        if !payload.response_schema.is_null() {
            body.insert(
                "response_format".to_string(),
                json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": "judgments",
                        "schema": payload.response_schema,
                    },
                }),
            );
        }
        Value::Object(body)
    }

    async fn send(&self, payload: &PromptPayload, stream: bool) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(payload, stream);
        tracing::debug!(
            model = %self.name,
            batch = payload.batch_index,
            stream,
            "Sending chat completion request"
        );
        send_with_retry(
            || {
                let request = self.client.post(&url).json(&body);
                match &self.api_key {
                    Some(key) => request.bearer_auth(key),
                    None => request,
                }
            },
            self.max_retries,
            &self.model,
        )
        .await
    }
}

/// Content of one server-sent event line, `None` for non-data lines
fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim)
}

#[async_trait]
impl ModelInvoker for OpenAiModel {
    async fn invoke(&self, payload: &PromptPayload) -> Result<ModelOutput, LlmError> {
        let response = self.send(payload, false).await?;
        let chat = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("No response from LLM".to_string()))?;
        Ok(ModelOutput::Text(content))
    }

    async fn invoke_stream(&self, payload: &PromptPayload) -> Result<ChunkStream, LlmError> {
        let response = self.send(payload, true).await?;
        Ok(Box::pin(sse_chunks(response)))
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Delta content of each server-sent event until `[DONE]`
fn sse_chunks(
    response: reqwest::Response,
) -> impl Stream<Item = Result<String, LlmError>> + Send + 'static {
    async_stream::try_stream! {
        let mut lines = Box::pin(body_lines(response));
        while let Some(line) = lines.next().await {
            let line = line?;
            let Some(data) = sse_data(&line) else {
                continue;
            };
            if data == "[DONE]" {
                break;
            }
            let chunk: StreamChunk = serde_json::from_str(data)?;
            for choice in chunk.choices {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        yield content;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reag_domain::ChatMessage;

    fn payload() -> PromptPayload {
        PromptPayload {
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("question")],
            response_schema: json!({"type": "object"}),
            batch_index: 0,
            expected_count: 1,
            document_names: vec!["A".to_string()],
        }
    }

    fn model() -> OpenAiModel {
        OpenAiModel::new("https://api.openai.com/v1/", "gpt-4o-mini", "openai/gpt-4o-mini").unwrap()
    }

    #[test]
    fn test_creation_trims_base_url() {
        let model = model();
        assert_eq!(model.base_url, "https://api.openai.com/v1");
        assert_eq!(model.model_name(), "openai/gpt-4o-mini");
        assert!(model.api_key.is_none());
    }

    #[test]
    fn test_request_body_uses_json_schema_format() {
        let body = model().request_body(&payload(), false);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["stream"], false);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(
            body["response_format"]["json_schema"]["schema"],
            json!({"type": "object"})
        );
    }

    #[test]
    fn test_extra_params_cannot_override_reserved_keys() {
        let mut extra = Map::new();
        extra.insert("temperature".to_string(), json!(0.2));
        extra.insert("model".to_string(), json!("other"));
        let body = model().with_extra(extra).request_body(&payload(), true);
        assert_eq!(body["temperature"], json!(0.2));
        assert_eq!(body["model"], "gpt-4o-mini");
    }

    #[test]
    fn test_sse_data_lines() {
        assert_eq!(sse_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(sse_data("data: [DONE]"), Some("[DONE]"));
        assert_eq!(sse_data(": keep-alive"), None);
    }

    #[test]
    fn test_stream_chunk_deserializes() {
        let chunk: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"index":0,"delta":{"content":"[{"}}]}"#).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("[{"));

        let role_only: StreamChunk =
            serde_json::from_str(r#"{"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#).unwrap();
        assert!(role_only.choices[0].delta.content.is_none());
    }

    #[tokio::test]
    async fn test_connection_error_is_communication() {
        let model = OpenAiModel::new("http://localhost:99999/v1", "m", "openai/m")
            .unwrap()
            .with_max_retries(1);
        let result = model.invoke(&payload()).await;
        assert!(matches!(result, Err(LlmError::Communication(_))));
    }
}
