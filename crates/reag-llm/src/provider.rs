//! Adapter selection from `provider/model` identifiers

use crate::{LlmError, ModelInvoker, OllamaModel, OpenAiModel};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Model providers with a built-in adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Local Ollama server
    Ollama,
    /// OpenAI
    OpenAi,
    /// OpenRouter
    OpenRouter,
    /// Groq
    Groq,
    /// Together AI
    Together,
}

impl Provider {
    /// Split a model identifier into its provider and provider-side model name
    ///
    /// An identifier without a prefix is an OpenAI model. Everything after
    /// the first `/` belongs to the model name, so `openrouter/deepseek/deepseek-r1`
    /// selects OpenRouter with model `deepseek/deepseek-r1`.
    ///
    /// # Examples
    ///
    /// ```
    /// use reag_llm::Provider;
    ///
    /// assert_eq!(Provider::parse("ollama/llama3").unwrap(), (Provider::Ollama, "llama3"));
    /// assert_eq!(Provider::parse("gpt-4o-mini").unwrap(), (Provider::OpenAi, "gpt-4o-mini"));
    /// assert!(Provider::parse("acme/model").is_err());
    /// ```
    pub fn parse(model_id: &str) -> Result<(Provider, &str), LlmError> {
        let model_id = model_id.trim();
        if model_id.is_empty() {
            return Err(LlmError::Config("Model identifier is empty".to_string()));
        }

        let Some((prefix, model)) = model_id.split_once('/') else {
            return Ok((Provider::OpenAi, model_id));
        };

        let provider = match prefix {
            "ollama" => Provider::Ollama,
            "openai" => Provider::OpenAi,
            "openrouter" => Provider::OpenRouter,
            "groq" => Provider::Groq,
            "together" => Provider::Together,
            "mock" => {
                return Err(LlmError::Config(
                    "Mock models are injected through the client builder".to_string(),
                ))
            }
            other => {
                return Err(LlmError::Config(format!("Unknown model provider: {}", other)));
            }
        };

        if model.is_empty() {
            return Err(LlmError::Config(format!(
                "Model identifier '{}' names no model",
                model_id
            )));
        }
        Ok((provider, model))
    }

    /// Prefix used in model identifiers
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
            Provider::Groq => "groq",
            Provider::Together => "together",
        }
    }

    /// Base URL used when no endpoint is configured
    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::Ollama => crate::ollama::DEFAULT_ENDPOINT,
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::Together => "https://api.together.xyz/v1",
        }
    }

    /// Environment variable holding the API key, if the provider needs one
    pub fn default_api_key_env(self) -> Option<&'static str> {
        match self {
            Provider::Ollama => None,
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::OpenRouter => Some("OPENROUTER_API_KEY"),
            Provider::Groq => Some("GROQ_API_KEY"),
            Provider::Together => Some("TOGETHER_API_KEY"),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to construct an adapter
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    /// Full `provider/model` identifier
    pub model: String,

    /// Base URL overriding the provider default
    pub endpoint: Option<String>,

    /// Environment variable holding the API key, overriding the provider default
    pub api_key_env: Option<String>,

    /// Provider-specific generation parameters
    pub model_kwargs: Map<String, Value>,
}

impl ProviderSettings {
    /// Settings for `model` with provider defaults
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

/// Construct the adapter selected by `settings.model`
///
/// # Errors
///
/// Returns [`LlmError::Config`] for an empty, unknown or `mock/` identifier,
/// or when the HTTP client cannot be built.
pub fn build_invoker(settings: &ProviderSettings) -> Result<Arc<dyn ModelInvoker>, LlmError> {
    let (provider, model) = Provider::parse(&settings.model)?;
    let base_url = settings
        .endpoint
        .clone()
        .unwrap_or_else(|| provider.default_base_url().to_string());

    tracing::info!(provider = %provider, model, base_url = %base_url, "Selected model adapter");

    match provider {
        Provider::Ollama => {
            let adapter = OllamaModel::new(base_url, model)?.with_options(settings.model_kwargs.clone());
            Ok(Arc::new(adapter))
        }
        _ => {
            let key_env = settings
                .api_key_env
                .as_deref()
                .or_else(|| provider.default_api_key_env());
            let api_key = key_env.and_then(|name| std::env::var(name).ok());
            if api_key.is_none() {
                tracing::warn!(provider = %provider, env = ?key_env, "No API key found; requests will be unauthenticated");
            }

            let adapter = OpenAiModel::new(base_url, model, format!("{}/{}", provider, model))?
                .with_api_key(api_key)
                .with_extra(settings.model_kwargs.clone());
            Ok(Arc::new(adapter))
        }
    }
}
