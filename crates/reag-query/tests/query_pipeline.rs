//! Integration tests for the query pipeline through the public API
//!
//! Run with `RUST_LOG=reag_query=debug cargo test -p reag-query -- --nocapture`
//! to see the per-batch log lines.

use futures::StreamExt;
use reag_llm::MockModel;
use reag_query::{
    BatchError, ClientConfig, ConversationLog, ConversationMemory, Document, QueryError,
    QueryOptions, ReagClient, StreamItem,
};
use serde_json::json;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn corpus() -> Vec<Document> {
    vec![
        Document::new("superagent-intro", "Superagent is an open-source AI agent framework.")
            .with_metadata("source", "web")
            .with_metadata("year", 2024),
        Document::new("quarterly-report", "Revenue grew eight percent.")
            .with_metadata("source", "pdf")
            .with_metadata("year", 2023),
        Document::new("superagent-changelog", "v0.2 adds streaming responses.")
            .with_metadata("source", "web")
            .with_metadata("year", 2022),
        Document::new("recipes", "Add salt to taste.")
            .with_metadata("source", "blog")
            .with_metadata("year", 2024),
    ]
}

#[tokio::test]
async fn test_filtered_query_from_json_options() {
    init_tracing();
    let model = MockModel::echo();
    let client = ReagClient::builder(ClientConfig::default())
        .invoker(model.clone())
        .build()
        .unwrap();

    let options = QueryOptions::from_json(&json!({
        "filter": [
            {"key": "source", "value": "web"},
            {"key": "year", "value": 2023, "operator": "greaterThan"}
        ]
    }))
    .unwrap();

    let results = client
        .query("What is Superagent?", corpus(), options)
        .await
        .unwrap();

    let names: Vec<&str> = results.iter().map(|r| r.document.name.as_str()).collect();
    assert_eq!(names, vec!["superagent-intro"]);
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn test_stream_yields_failures_and_successes() {
    init_tracing();
    let model = MockModel::echo();
    model.add_error("Name: quarterly-report", "model overloaded");
    let memory = ConversationLog::new();
    let client = ReagClient::builder(ClientConfig::default().with_batch_size(2))
        .invoker(model.clone())
        .memory(memory.clone())
        .build()
        .unwrap();

    let items: Vec<StreamItem> = client
        .query_stream("q", corpus(), QueryOptions::new())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(items.len(), 4);
    let mut failed: Vec<usize> = items
        .iter()
        .filter(|item| item.is_failed())
        .map(StreamItem::position)
        .collect();
    failed.sort_unstable();
    assert_eq!(failed, vec![0, 1]);

    for item in items.iter().filter(|item| !item.is_failed()) {
        let result = item.result().unwrap();
        assert_eq!(result.content, result.document.name);
    }
    // A failed batch keeps the exchange out of memory
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_streamed_query_is_remembered() {
    init_tracing();
    let model = MockModel::echo().with_stream_chunk_size(3);
    let memory = ConversationLog::new();
    let client = ReagClient::builder(ClientConfig::default().with_batch_size(3))
        .invoker(model)
        .memory(memory.clone())
        .build()
        .unwrap();

    let count = client
        .query_stream("What is Superagent?", corpus(), QueryOptions::new())
        .await
        .unwrap()
        .count()
        .await;

    assert_eq!(count, 4);
    let history = memory.history();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history[0].response,
        "superagent-intro\nquarterly-report\nsuperagent-changelog\nrecipes"
    );
}

#[tokio::test(start_paused = true)]
async fn test_stream_deadline_marks_slow_batch_failed() {
    init_tracing();
    let model = MockModel::echo();
    model.add_delay("Name: recipes", Duration::from_secs(120));
    let memory = ConversationLog::new();
    let client = ReagClient::builder(
        ClientConfig::default()
            .with_batch_size(2)
            .with_query_timeout_secs(10),
    )
    .invoker(model)
    .memory(memory.clone())
    .build()
    .unwrap();

    let mut items: Vec<StreamItem> = client
        .query_stream("q", corpus(), QueryOptions::new())
        .await
        .unwrap()
        .collect()
        .await;
    items.sort_by_key(StreamItem::position);

    // Every document is accounted for, and the cut-off batch says why
    assert_eq!(items.len(), 4);
    assert!(items[..2].iter().all(|item| !item.is_failed()));
    for item in &items[2..] {
        assert!(matches!(
            item,
            StreamItem::Failed { error: BatchError::DeadlineElapsed, .. }
        ));
    }
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_config_file_round_trip_drives_client() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reag.toml");
    std::fs::write(
        &path,
        r#"
model = "ollama/llama3"
batch_size = 1
system = "Judge each source strictly."
"#,
    )
    .unwrap();

    let config = ClientConfig::from_file(&path).unwrap();
    assert_eq!(config.batch_size, 1);

    let model = MockModel::echo();
    let client = ReagClient::builder(config)
        .invoker(model.clone())
        .build()
        .unwrap();
    client.query("q", corpus(), QueryOptions::new()).await.unwrap();

    let payloads = model.payloads();
    assert_eq!(payloads.len(), 4);
    assert!(payloads
        .iter()
        .all(|p| p.messages[0].content.starts_with("Judge each source strictly.")));
}

#[test]
fn test_zero_batch_size_rejected_at_build() {
    let result = ReagClient::builder(ClientConfig::default().with_batch_size(0))
        .invoker(MockModel::echo())
        .build();
    assert!(matches!(result, Err(QueryError::Config(_))));
}
