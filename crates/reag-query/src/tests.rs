//! End-to-end scenarios for the query client

use crate::{
    BatchError, ClientConfig, FieldType, OutputSchema, QueryError, QueryOptions, QueryOutput,
    QueryRequest, ReagClient, SchemaField,
};
use futures::StreamExt;
use reag_domain::{
    ConversationLog, ConversationMemory, Document, FilterCondition, FilterOperator, ModelOutput,
};
use reag_llm::{LlmError, MockModel};
use serde_json::json;
use std::time::Duration;

fn docs(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| Document::new(format!("doc-{:02}", i), format!("text {}", i)))
        .collect()
}

fn client(model: &MockModel, config: ClientConfig) -> ReagClient {
    ReagClient::builder(config)
        .invoker(model.clone())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_filter_applies_before_dispatch() {
    let model = MockModel::echo();
    let client = client(&model, ClientConfig::default());

    let documents = vec![
        Document::new("A", "web page").with_metadata("source", "web"),
        Document::new("B", "a pdf").with_metadata("source", "pdf"),
    ];
    let options = QueryOptions::new().with_filter(vec![FilterCondition::new(
        "source",
        "web",
        FilterOperator::Equals,
    )]);

    let results = client.query("q", documents, options).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.name, "A");
    let payloads = model.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].document_names, vec!["A"]);
    assert!(!payloads[0].messages[0].content.contains("a pdf"));
}

#[tokio::test]
async fn test_forty_five_documents_three_calls() {
    let model = MockModel::echo();
    let client = client(&model, ClientConfig::default());

    let results = client.query("q", docs(45), QueryOptions::new()).await.unwrap();

    assert_eq!(model.call_count(), 3);
    let mut sizes: Vec<usize> = model.payloads().iter().map(|p| p.expected_count).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![5, 20, 20]);

    assert_eq!(results.len(), 45);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.document.name, format!("doc-{:02}", i));
        assert_eq!(result.content, result.document.name);
    }
    assert_eq!(results[44].reasoning.as_deref(), Some("batch 2"));
}

#[tokio::test]
async fn test_one_failed_batch_fails_query_after_all_ran() {
    let model = MockModel::echo();
    model.add_error("Name: doc-20", "upstream timeout");
    let client = client(&model, ClientConfig::default());

    let err = client.query("q", docs(45), QueryOptions::new()).await.unwrap_err();

    assert_eq!(model.call_count(), 3);
    assert!(err.to_string().contains("batch 2/3"), "{}", err);
    assert!(err.to_string().contains("upstream timeout"));
    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].batch_index, 1);
    assert_eq!(failures[0].document_names.len(), 20);
    assert_eq!(failures[0].document_names[0], "doc-20");
}

#[tokio::test]
async fn test_short_response_is_count_mismatch() {
    let model = MockModel::new(r#"{"judgments": [{"content": "only one", "is_irrelevant": false}]}"#);
    let client = client(&model, ClientConfig::default());

    let err = client.query("q", docs(2), QueryOptions::new()).await.unwrap_err();

    assert_eq!(
        err.failures()[0].error,
        BatchError::CountMismatch {
            expected: 2,
            actual: 1
        }
    );
}

#[tokio::test]
async fn test_non_json_response_fails_batch() {
    let model = MockModel::new("I could not decide.");
    let client = client(&model, ClientConfig::default());

    let err = client.query("q", docs(1), QueryOptions::new()).await.unwrap_err();
    assert!(matches!(err.failures()[0].error, BatchError::Parse { .. }));
}

#[tokio::test]
async fn test_invalid_regex_fails_before_any_call() {
    let model = MockModel::echo();
    let client = client(&model, ClientConfig::default());
    let options = QueryOptions::new().with_filter(vec![FilterCondition::new(
        "source",
        "web(",
        FilterOperator::Regex,
    )]);

    let err = client.query("q", docs(3), options).await.unwrap_err();

    assert!(matches!(err, QueryError::Filter(_)));
    assert_eq!(model.call_count(), 0);
}

#[test]
fn test_unknown_operator_rejected_when_parsing_options() {
    let result = QueryOptions::from_json(&json!({
        "filter": [{"key": "source", "value": "web", "operator": "like"}]
    }));
    assert!(result.is_err());
}

#[tokio::test]
async fn test_no_documents_after_filter_makes_no_calls() {
    let model = MockModel::echo();
    let memory = ConversationLog::new();
    let client = ReagClient::builder(ClientConfig::default())
        .invoker(model.clone())
        .memory(memory.clone())
        .build()
        .unwrap();
    let options = QueryOptions::new().with_filter(vec![FilterCondition::new(
        "source",
        "nowhere",
        FilterOperator::Equals,
    )]);

    let results = client.query("q", docs(5), options).await.unwrap();

    assert!(results.is_empty());
    assert_eq!(model.call_count(), 0);
    assert!(memory.is_empty());
}

#[tokio::test]
async fn test_invalid_document_rejected() {
    let model = MockModel::echo();
    let client = client(&model, ClientConfig::default());
    let documents = vec![Document::new("A", "a"), Document::new("", "nameless")];

    let err = client.query("q", documents, QueryOptions::new()).await.unwrap_err();

    assert!(matches!(err, QueryError::Config(msg) if msg.contains("document 1")));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_memory_replayed_on_next_query() {
    let model = MockModel::from_fn(|payload| {
        let judgments: Vec<_> = payload
            .document_names
            .iter()
            .map(|name| {
                if name == "Greeting" {
                    json!({"content": "Hello John", "reasoning": "greets", "is_irrelevant": false})
                } else {
                    json!({"content": "", "reasoning": "off topic", "is_irrelevant": true})
                }
            })
            .collect();
        Ok(ModelOutput::Structured(json!({ "judgments": judgments })))
    });
    let memory = ConversationLog::new();
    let client = ReagClient::builder(ClientConfig::default())
        .invoker(model.clone())
        .memory(memory.clone())
        .build()
        .unwrap();

    let documents = vec![
        Document::new("Greeting", "Say hello to John."),
        Document::new("Recipes", "Add salt."),
    ];
    client
        .query("My name is John", documents.clone(), QueryOptions::new())
        .await
        .unwrap();

    let history = memory.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].response, "Hello John");

    client
        .query("What is my name?", documents, QueryOptions::new())
        .await
        .unwrap();

    let second = &model.payloads()[1];
    let contents: Vec<&str> = second.messages.iter().skip(1).map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["My name is John", "Hello John", "What is my name?"]);
    assert_eq!(memory.len(), 2);
}

#[tokio::test]
async fn test_custom_schema_fields_reach_results() {
    let model = MockModel::new(
        r#"{"judgments": [{"content": "x", "is_irrelevant": false, "score": "0.75"}]}"#,
    );
    let schema = OutputSchema::new().with_field(SchemaField::required("score", FieldType::Number));
    let client = client(&model, ClientConfig::default().with_schema(schema));

    let results = client.query("q", docs(1), QueryOptions::new()).await.unwrap();

    assert_eq!(results[0].field("score"), Some(&json!(0.75)));
    let schema = &model.payloads()[0].response_schema;
    assert!(schema.to_string().contains("score"));
}

#[tokio::test]
async fn test_stream_reassembles_chunked_output() {
    let model = MockModel::echo().with_stream_chunk_size(7);
    let client = client(&model, ClientConfig::default().with_batch_size(2));

    let request = QueryRequest::new("q", docs(5)).streaming();
    let output = client.execute(request).await.unwrap();
    assert!(matches!(output, QueryOutput::Streaming(_)));

    let mut items: Vec<_> = output.into_stream().unwrap().collect().await;
    items.sort_by_key(|item| item.position());

    assert_eq!(items.len(), 5);
    for (i, item) in items.iter().enumerate() {
        let result = item.result().unwrap();
        assert_eq!(result.content, format!("doc-{:02}", i));
    }
}

#[tokio::test(start_paused = true)]
async fn test_query_timeout() {
    let model = MockModel::echo();
    model.add_delay("Name: doc-00", Duration::from_secs(60));
    let client = client(&model, ClientConfig::default().with_query_timeout_secs(5));

    let err = client.query("q", docs(2), QueryOptions::new()).await.unwrap_err();

    assert!(matches!(err, QueryError::Timeout(d) if d == Duration::from_secs(5)));
}

#[tokio::test]
async fn test_model_error_detail_is_kept() {
    let model = MockModel::from_fn(|_| Err(LlmError::RateLimitExceeded));
    let client = client(&model, ClientConfig::default());

    let err = client.query("q", docs(1), QueryOptions::new()).await.unwrap_err();

    assert!(matches!(
        &err.failures()[0].error,
        BatchError::Invocation(msg) if msg.contains("Rate limit")
    ));
}

#[tokio::test]
async fn test_concurrent_queries_share_client() {
    let model = MockModel::echo();
    let client = client(&model, ClientConfig::default().with_batch_size(3));

    let (a, b) = tokio::join!(
        client.query("first", docs(7), QueryOptions::new()),
        client.query("second", docs(4), QueryOptions::new()),
    );

    assert_eq!(a.unwrap().len(), 7);
    assert_eq!(b.unwrap().len(), 4);
    assert_eq!(model.call_count(), 5);
}
