//! Concurrent per-batch dispatch and ordered result assembly

use crate::batching::Batch;
use crate::error::{BatchError, BatchFailure, QueryError};
use crate::parser::parse_response;
use crate::prompt::PromptBuilder;
use crate::schema::OutputSchema;
use crate::types::StreamItem;
use futures::future::join_all;
use futures::stream::{BoxStream, FuturesUnordered};
use futures::StreamExt;
use reag_domain::{ConversationMemory, Judgment, MemoryEntry, ModelOutput, PromptPayload, QueryResult};
use reag_llm::ModelInvoker;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument, Span};

/// Outcome of one batch: the batch back, with its judgments or its error
type BatchOutcome = (Batch, Result<Vec<Judgment>, BatchError>);

/// Runs one model call per batch and assembles the results
///
/// Batch futures are owned by the caller's future or stream, so dropping
/// it cancels every in-flight call.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    invoker: Arc<dyn ModelInvoker>,
    memory: Option<Arc<dyn ConversationMemory>>,
    schema: Arc<OutputSchema>,
    query_id: String,
}

impl Dispatcher {
    pub(crate) fn new(
        invoker: Arc<dyn ModelInvoker>,
        memory: Option<Arc<dyn ConversationMemory>>,
        schema: OutputSchema,
        query_id: String,
    ) -> Self {
        Self {
            invoker,
            memory,
            schema: Arc::new(schema),
            query_id,
        }
    }

    /// Judge every batch concurrently and return results in document order
    ///
    /// All batches run to completion. If any failed, the error lists each
    /// failure and no results are returned.
    pub(crate) async fn dispatch(
        &self,
        query: &str,
        batches: Vec<Batch>,
        builder: &PromptBuilder,
    ) -> Result<Vec<QueryResult>, QueryError> {
        let total = batches.len();
        let tasks: Vec<_> = batches
            .into_iter()
            .map(|batch| {
                let payload = builder.build(&batch);
                self.run_batch(batch, payload, false)
            })
            .collect();

        // join_all yields outcomes in input order, i.e. by batch index
        let outcomes = join_all(tasks).await;

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (batch, outcome) in outcomes {
            match outcome {
                Ok(judgments) => results.extend(attach(judgments, batch.documents)),
                Err(error) => failures.push(BatchFailure {
                    batch_index: batch.index,
                    total_batches: total,
                    document_names: batch.document_names(),
                    error,
                }),
            }
        }

        if !failures.is_empty() {
            warn!(failed = failures.len(), total, "Query failed");
            return Err(QueryError::BatchesFailed { total, failures });
        }

        info!(results = results.len(), batches = total, "Query complete");
        self.remember(query, &results);
        Ok(results)
    }

    /// Judge every batch concurrently, yielding each batch's items as it completes
    ///
    /// A failed batch yields one `Failed` item per document and the stream
    /// continues. Memory is written once, after the last batch, only if none
    /// failed. Reaching `deadline` cancels the batches still in flight and
    /// yields a `DeadlineElapsed` failure for each of their documents.
    ///
    /// Batch calls run inside `span`; the stream's own events carry the
    /// query id and model directly.
    pub(crate) fn dispatch_stream(
        self,
        query: String,
        batches: Vec<Batch>,
        builder: PromptBuilder,
        deadline: Option<Instant>,
        span: Span,
    ) -> BoxStream<'static, StreamItem> {
        let stream = async_stream::stream! {
            let total = batches.len();
            // Batches still in flight, for the deadline markers
            let mut unfinished: BTreeMap<usize, Batch> =
                batches.iter().map(|batch| (batch.index, batch.clone())).collect();
            let mut pending: FuturesUnordered<_> = batches
                .into_iter()
                .map(|batch| {
                    let payload = builder.build(&batch);
                    self.run_batch(batch, payload, true).instrument(span.clone())
                })
                .collect();

            let mut judged: Vec<(usize, QueryResult)> = Vec::new();
            let mut failed = 0usize;
            let mut timed_out = false;

            loop {
                let next = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, pending.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            timed_out = true;
                            None
                        }
                    },
                    None => pending.next().await,
                };
                let Some((batch, outcome)) = next else {
                    break;
                };

                let Batch { index, offset, documents } = batch;
                unfinished.remove(&index);
                match outcome {
                    Ok(judgments) => {
                        for (i, result) in attach(judgments, documents).into_iter().enumerate() {
                            judged.push((offset + i, result.clone()));
                            yield StreamItem::Judged { position: offset + i, result };
                        }
                    }
                    Err(error) => {
                        failed += 1;
                        for item in failure_items(index, offset, documents, &error) {
                            yield item;
                        }
                    }
                }
            }

            if timed_out {
                // Dropping the futures cancels the calls still in flight
                drop(pending);
                warn!(
                    query_id = %self.query_id,
                    model = %self.invoker.model_name(),
                    unfinished = unfinished.len(),
                    total,
                    "Query deadline elapsed; unfinished batches marked failed"
                );
                let error = BatchError::DeadlineElapsed;
                for (index, batch) in unfinished {
                    for item in failure_items(index, batch.offset, batch.documents, &error) {
                        yield item;
                    }
                }
            } else if failed > 0 {
                warn!(
                    query_id = %self.query_id,
                    model = %self.invoker.model_name(),
                    failed,
                    total,
                    "Streamed query had failed batches"
                );
            } else {
                judged.sort_by_key(|(position, _)| *position);
                let results: Vec<QueryResult> = judged.into_iter().map(|(_, r)| r).collect();
                info!(
                    query_id = %self.query_id,
                    model = %self.invoker.model_name(),
                    results = results.len(),
                    batches = total,
                    "Streamed query complete"
                );
                self.remember(&query, &results);
            }
        };
        Box::pin(stream)
    }

    /// One model call for one batch, owning everything it touches
    fn run_batch(
        &self,
        batch: Batch,
        payload: PromptPayload,
        streamed: bool,
    ) -> impl Future<Output = BatchOutcome> + Send + 'static {
        let invoker = Arc::clone(&self.invoker);
        let schema = Arc::clone(&self.schema);
        let query_id = self.query_id.clone();

        async move {
            debug!(
                query_id = %query_id,
                batch = batch.index,
                documents = batch.len(),
                prompt_chars = payload.messages.iter().map(|m| m.content.len()).sum::<usize>(),
                "Dispatching batch"
            );

            let output = if streamed {
                collect_stream(invoker.as_ref(), &payload).await
            } else {
                invoker.invoke(&payload).await
            };

            let outcome = output
                .map_err(BatchError::from)
                .and_then(|output| {
                    debug!(
                        query_id = %query_id,
                        batch = batch.index,
                        response_chars = output.as_text().len(),
                        "Batch responded"
                    );
                    parse_response(&output, batch.len(), &schema)
                });

            if let Err(error) = &outcome {
                warn!(query_id = %query_id, batch = batch.index, %error, "Batch failed");
            }
            (batch, outcome)
        }
    }

    fn remember(&self, query: &str, results: &[QueryResult]) {
        if results.is_empty() {
            return;
        }
        if let Some(memory) = &self.memory {
            memory.append(MemoryEntry::from_results(query, results));
        }
    }
}

/// Invoke in streaming mode and join the chunks into one output
async fn collect_stream(
    invoker: &dyn ModelInvoker,
    payload: &PromptPayload,
) -> Result<ModelOutput, reag_llm::LlmError> {
    let mut chunks = invoker.invoke_stream(payload).await?;
    let mut text = String::new();
    while let Some(chunk) = chunks.next().await {
        text.push_str(&chunk?);
    }
    Ok(ModelOutput::Text(text))
}

/// One `Failed` item per document of a batch that produced no judgments
fn failure_items(
    batch_index: usize,
    offset: usize,
    documents: Vec<reag_domain::Document>,
    error: &BatchError,
) -> Vec<StreamItem> {
    documents
        .into_iter()
        .enumerate()
        .map(|(i, document)| StreamItem::Failed {
            position: offset + i,
            batch_index,
            document,
            error: error.clone(),
        })
        .collect()
}

/// Pair judgments with their documents by position
fn attach(judgments: Vec<Judgment>, documents: Vec<reag_domain::Document>) -> Vec<QueryResult> {
    judgments
        .into_iter()
        .zip(documents)
        .map(|(judgment, document)| QueryResult::from_judgment(judgment, document))
        .collect()
}
