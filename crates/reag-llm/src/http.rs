//! HTTP plumbing shared by the network adapters

use crate::LlmError;
use futures::{Stream, StreamExt};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;

/// Send a request, retrying transient failures with exponential backoff
///
/// `build` is called once per attempt. 404 means the model is unknown to
/// the server and 4xx other than 429 are returned without retrying.
pub(crate) async fn send_with_retry<F>(
    build: F,
    max_retries: u32,
    model: &str,
) -> Result<Response, LlmError>
where
    F: Fn() -> RequestBuilder,
{
    let max_retries = max_retries.max(1);
    let mut attempts = 0;
    let mut last_error = None;

    while attempts < max_retries {
        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                } else if status == StatusCode::NOT_FOUND {
                    return Err(LlmError::ModelNotAvailable(model.to_string()));
                } else if status == StatusCode::TOO_MANY_REQUESTS {
                    last_error = Some(LlmError::RateLimitExceeded);
                } else {
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    let error =
                        LlmError::Communication(format!("HTTP {}: {}", status, error_text));
                    if status.is_client_error() {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }
            Err(e) => {
                last_error = Some(LlmError::Communication(format!("Request failed: {}", e)));
            }
        }

        attempts += 1;
        if attempts < max_retries {
            // 1s, 2s, 4s, ...
            let delay = Duration::from_secs(2u64.pow(attempts - 1));
            tracing::warn!(model, attempt = attempts, ?delay, "Retrying model request");
            tokio::time::sleep(delay).await;
        }
    }

    Err(last_error
        .unwrap_or_else(|| LlmError::Communication("Max retries exceeded".to_string())))
}

/// Split a response body into trimmed, non-empty lines as bytes arrive
pub(crate) fn body_lines(
    response: Response,
) -> impl Stream<Item = Result<String, LlmError>> + Send + 'static {
    async_stream::try_stream! {
        let mut bytes = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk
                .map_err(|e| LlmError::Communication(format!("Stream interrupted: {}", e)))?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line).trim().to_string();
                if !line.is_empty() {
                    yield line;
                }
            }
        }

        let rest = String::from_utf8_lossy(&buffer).trim().to_string();
        if !rest.is_empty() {
            yield rest;
        }
    }
}

/// Build the shared HTTP client
pub(crate) fn client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Config(format!("Failed to build HTTP client: {}", e)))
}
