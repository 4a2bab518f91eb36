//! Configuration for the query client

use crate::schema::OutputSchema;
use reag_llm::ProviderSettings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

/// Default number of documents per model call
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Default model identifier
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Configuration for the query client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `provider/model` identifier selecting the adapter
    pub model: String,

    /// System preamble replacing the built-in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Maximum documents per model call
    pub batch_size: usize,

    /// Extra judgment fields
    #[serde(skip_serializing_if = "OutputSchema::is_empty")]
    pub schema: OutputSchema,

    /// Provider-specific generation parameters, passed through untouched
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub model_kwargs: Map<String, Value>,

    /// Base URL overriding the provider default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Deadline for a whole query (seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_timeout_secs: Option<u64>,
}

impl ClientConfig {
    /// Default configuration for `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the system preamble
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set the output schema
    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Set the query deadline
    pub fn with_query_timeout_secs(mut self, secs: u64) -> Self {
        self.query_timeout_secs = Some(secs);
        self
    }

    /// Get the query deadline as a Duration
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_secs.map(Duration::from_secs)
    }

    /// Settings for constructing the model adapter
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
            api_key_env: self.api_key_env.clone(),
            model_kwargs: self.model_kwargs.clone(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("model must not be empty".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }
        if self.query_timeout_secs == Some(0) {
            return Err("query_timeout_secs must be greater than 0".to_string());
        }
        self.schema.validate()
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::from_toml(&contents)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system: None,
            batch_size: DEFAULT_BATCH_SIZE,
            schema: OutputSchema::default(),
            model_kwargs: Map::new(),
            endpoint: None,
            api_key_env: None,
            query_timeout_secs: None,
        }
    }
}
