//! The query entry point

use crate::batching::batch_documents;
use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::error::QueryError;
use crate::prompt::PromptBuilder;
use crate::types::{QueryOptions, QueryOutput, QueryRequest, StreamItem};
use futures::stream::BoxStream;
use reag_domain::{ConversationMemory, Document, QueryResult};
use reag_llm::{build_invoker, ModelInvoker};
use std::fmt;
use std::sync::Arc;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Client that judges documents against a prompt
///
/// Holds the model adapter and the optional conversation memory for its
/// lifetime. Independent queries may run concurrently on one client; the
/// transport is released when the client is dropped or [`close`](Self::close)d.
pub struct ReagClient {
    config: ClientConfig,
    invoker: Arc<dyn ModelInvoker>,
    memory: Option<Arc<dyn ConversationMemory>>,
}

/// Builder for [`ReagClient`]
pub struct ReagClientBuilder {
    config: ClientConfig,
    invoker: Option<Arc<dyn ModelInvoker>>,
    memory: Option<Arc<dyn ConversationMemory>>,
}

impl ReagClientBuilder {
    /// Use this adapter instead of the one `config.model` selects
    pub fn invoker(mut self, invoker: impl ModelInvoker + 'static) -> Self {
        self.invoker = Some(Arc::new(invoker));
        self
    }

    /// Use a shared adapter
    pub fn shared_invoker(mut self, invoker: Arc<dyn ModelInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Record successful queries in `memory` and replay them as context
    pub fn memory(mut self, memory: impl ConversationMemory + 'static) -> Self {
        self.memory = Some(Arc::new(memory));
        self
    }

    /// Validate the configuration and construct the client
    ///
    /// # Errors
    ///
    /// [`QueryError::Config`] for an invalid configuration or a model
    /// identifier no adapter serves.
    pub fn build(self) -> Result<ReagClient, QueryError> {
        self.config.validate().map_err(QueryError::Config)?;

        let invoker = match self.invoker {
            Some(invoker) => invoker,
            None => build_invoker(&self.config.provider_settings())
                .map_err(|e| QueryError::Config(e.to_string()))?,
        };

        info!(
            model = %invoker.model_name(),
            batch_size = self.config.batch_size,
            memory = self.memory.is_some(),
            "ReAG client ready"
        );

        Ok(ReagClient {
            config: self.config,
            invoker,
            memory: self.memory,
        })
    }
}

impl ReagClient {
    /// Start building a client
    pub fn builder(config: ClientConfig) -> ReagClientBuilder {
        ReagClientBuilder {
            config,
            invoker: None,
            memory: None,
        }
    }

    /// Client for `config` with the adapter its model selects and no memory
    pub fn new(config: ClientConfig) -> Result<Self, QueryError> {
        Self::builder(config).build()
    }

    /// The configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Model identifier of the adapter
    pub fn model_name(&self) -> &str {
        self.invoker.model_name()
    }

    /// Run a query
    ///
    /// Documents are checked, filtered and batched before any model call;
    /// configuration and filter errors surface here. A non-streaming query
    /// resolves once every batch has settled. A streaming query returns
    /// immediately and yields items as batches complete.
    pub async fn execute(&self, request: QueryRequest) -> Result<QueryOutput, QueryError> {
        let QueryRequest {
            prompt,
            documents,
            options,
            stream,
        } = request;

        for (index, document) in documents.iter().enumerate() {
            document
                .validate()
                .map_err(|e| QueryError::Config(format!("document {}: {}", index, e)))?;
        }

        let filter = options.filter.compile()?;
        let received = documents.len();
        let filtered = filter.apply(documents);
        let batches = batch_documents(filtered, self.config.batch_size)?;

        let query_id = Uuid::now_v7().to_string();
        let span = info_span!("query", query_id = %query_id, model = %self.invoker.model_name());
        span.in_scope(|| {
            info!(
                received,
                filtered = batches.iter().map(|b| b.len()).sum::<usize>(),
                batches = batches.len(),
                stream,
                "Starting query"
            );
        });

        let history = self
            .memory
            .as_ref()
            .map(|memory| memory.history())
            .unwrap_or_default();
        debug!(query_id = %query_id, history = history.len(), "Loaded conversation history");

        let builder = PromptBuilder::new(
            prompt.clone(),
            self.config.system.as_deref(),
            self.config.schema.clone(),
        )
        .with_history(history);
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.invoker),
            self.memory.clone(),
            self.config.schema.clone(),
            query_id,
        );

        if stream {
            let deadline = self.config.query_timeout().map(|limit| Instant::now() + limit);
            let items = dispatcher.dispatch_stream(prompt, batches, builder, deadline, span);
            return Ok(QueryOutput::Streaming(items));
        }

        let run = dispatcher.dispatch(&prompt, batches, &builder).instrument(span);
        let results = match self.config.query_timeout() {
            Some(limit) => timeout(limit, run)
                .await
                .map_err(|_| QueryError::Timeout(limit))??,
            None => run.await?,
        };
        Ok(QueryOutput::Complete(results))
    }

    /// Run a non-streaming query
    ///
    /// # Examples
    ///
    /// ```
    /// use reag_domain::Document;
    /// use reag_llm::MockModel;
    /// use reag_query::{ClientConfig, QueryOptions, ReagClient};
    /// use serde_json::json;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = ReagClient::builder(ClientConfig::default())
    ///     .invoker(MockModel::echo())
    ///     .build()?;
    ///
    /// let documents = vec![
    ///     Document::new("A", "Superagent is a framework.").with_metadata("source", "web"),
    ///     Document::new("B", "Quarterly report.").with_metadata("source", "pdf"),
    /// ];
    /// let options = QueryOptions::from_json(&json!({
    ///     "filter": {"key": "source", "value": "web"}
    /// }))?;
    ///
    /// let results = client.query("What is Superagent?", documents, options).await?;
    /// assert_eq!(results.len(), 1);
    /// assert_eq!(results[0].document.name, "A");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn query(
        &self,
        prompt: impl Into<String>,
        documents: Vec<Document>,
        options: QueryOptions,
    ) -> Result<Vec<QueryResult>, QueryError> {
        let request = QueryRequest::new(prompt, documents).with_options(options);
        match self.execute(request).await? {
            QueryOutput::Complete(results) => Ok(results),
            QueryOutput::Streaming(_) => Err(QueryError::Config(
                "non-streaming query produced a stream".to_string(),
            )),
        }
    }

    /// Run a streaming query
    pub async fn query_stream(
        &self,
        prompt: impl Into<String>,
        documents: Vec<Document>,
        options: QueryOptions,
    ) -> Result<BoxStream<'static, StreamItem>, QueryError> {
        let request = QueryRequest::new(prompt, documents)
            .with_options(options)
            .streaming();
        match self.execute(request).await? {
            QueryOutput::Streaming(items) => Ok(items),
            QueryOutput::Complete(_) => Err(QueryError::Config(
                "streaming query produced complete results".to_string(),
            )),
        }
    }

    /// Release the adapter's transport
    pub async fn close(self) -> Result<(), QueryError> {
        debug!(model = %self.invoker.model_name(), "Closing ReAG client");
        self.invoker.close().await?;
        Ok(())
    }
}

impl fmt::Debug for ReagClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReagClient")
            .field("model", &self.invoker.model_name())
            .field("batch_size", &self.config.batch_size)
            .field("memory", &self.memory.is_some())
            .finish()
    }
}
