mod common;

use common::{
    services, services_with, test_config, BagOfWords, NarrowingEmbedder, RecordingSink, ScriptedChat,
    SlowChat, VOCAB,
};
use rag_sentinel::answer_log::read_entries;
use rag_sentinel::dedup::Decision;
use rag_sentinel::error::{SentinelError, Stage};
use rag_sentinel::ingest::Indexer;
use rag_sentinel::pipeline::{build_services, verify_embedding_dims, Services};
use rag_sentinel_core::identity::query_id;
use rag_sentinel_core::models::DocumentRecord;
use rag_sentinel_core::prompt::ALERT_SUFFIX;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

async fn index(services: &Services, docs: &[&str]) {
    let records: Vec<DocumentRecord> = docs
        .iter()
        .map(|d| DocumentRecord { doc: d.to_string() })
        .collect();
    let indexer = Indexer::new(
        services.embedder.clone(),
        services.index.clone(),
        2,
        services.stats.clone(),
    );
    assert_eq!(indexer.index_records(&records).await.unwrap(), docs.len());
}

#[tokio::test]
async fn test_mammals_prompt_contains_two_nearest_documents() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let chat = Arc::new(ScriptedChat::new(&["Cats and dogs are mammals."]));
    let services = services(&config, chat.clone(), Arc::new(RecordingSink::default())).await;
    index(&services, &["cats are mammals", "dogs are mammals", "the sun is a star"]).await;

    let result = services.pipeline.handle("u", "Tell me about mammals").await.unwrap();
    assert_eq!(result, "Cats and dogs are mammals.");

    let prompts = chat.answer_prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("cats are mammals\ndogs are mammals"));
    assert!(!prompts[0].contains("the sun is a star"));
    assert!(prompts[0].contains("Respond to query: 'Tell me about mammals'"));
}

#[tokio::test]
async fn test_alert_query_is_cleaned_and_marked() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let chat = Arc::new(ScriptedChat::new(&["Windows let light in."]));
    let services = services(&config, chat.clone(), Arc::new(RecordingSink::default())).await;

    let answer = services
        .pipeline
        .answer("u", "Tell me and alert about windows")
        .await
        .unwrap();
    assert!(answer.alert_enabled);
    assert_eq!(answer.query, "Tell me about windows");
    assert_eq!(answer.query_id, query_id("u", "Tell me about windows"));

    let result = services
        .pipeline
        .handle("u", "Tell me and alert about windows")
        .await
        .unwrap();
    assert!(result.ends_with(ALERT_SUFFIX));
    assert!(result.starts_with("Windows let light in."));
}

#[tokio::test]
async fn test_identical_answers_alert_once() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let chat = Arc::new(ScriptedChat::new(&["same answer"]));
    let sink = Arc::new(RecordingSink::default());
    let services = services(&config, chat.clone(), sink.clone()).await;
    let watcher = services.pipeline.watcher();

    for expected in [Decision::FirstResponse, Decision::Identical] {
        let answer = services
            .pipeline
            .answer("u", "Tell me and alert about windows")
            .await
            .unwrap();
        assert_eq!(watcher.observe(&answer).await.unwrap(), Some(expected));
    }

    assert_eq!(
        sink.messages(),
        vec!["New response for question \"Tell me about windows\":\nsame answer".to_string()]
    );
    assert_eq!(chat.oracle_calls(), 0);
}

#[tokio::test]
async fn test_background_alert_from_handle() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let sink = Arc::new(RecordingSink::default());
    let services = services(&config, Arc::new(ScriptedChat::new(&["r1"])), sink.clone()).await;

    services
        .pipeline
        .handle("u", "Tell me and alert about windows")
        .await
        .unwrap();
    assert!(common::eventually(|| sink.messages().len() == 1).await);
}

#[tokio::test]
async fn test_oracle_gates_changed_answers() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    // r2 is judged equivalent to r1, r3 deviates from r1.
    let chat = Arc::new(ScriptedChat::new(&["r1", "r2", "r3"]).with_decisions(&["No.", "Yes."]));
    let sink = Arc::new(RecordingSink::default());
    let services = services(&config, chat.clone(), sink.clone()).await;

    let mut decisions = Vec::new();
    for _ in 0..3 {
        let answer = services
            .pipeline
            .answer("u", "Tell me and alert about windows")
            .await
            .unwrap();
        decisions.push(services.pipeline.watcher().observe(&answer).await.unwrap());
    }
    assert_eq!(
        decisions,
        vec![
            Some(Decision::FirstResponse),
            Some(Decision::Equivalent),
            Some(Decision::Deviating)
        ]
    );

    let delivered: Vec<String> = sink
        .messages()
        .iter()
        .map(|m| m.rsplit('\n').next().unwrap().to_string())
        .collect();
    assert_eq!(delivered, vec!["r1", "r3"]);

    let raw = read_entries(&config.answer_log.raw_path).unwrap();
    let deduped = read_entries(&config.answer_log.deduped_path).unwrap();
    assert_eq!(raw.len(), 3);
    assert_eq!(
        deduped.iter().map(|e| e.response.as_str()).collect::<Vec<_>>(),
        vec!["r1", "r3"]
    );

    let snap = services.stats.snapshot();
    assert_eq!(snap.answers_accepted, 2);
    assert_eq!(snap.answers_suppressed, 1);
    assert_eq!(snap.alerts_delivered, 2);
}

#[tokio::test]
async fn test_dedup_history_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.dedup.store = "sqlite".to_string();

    let first_sink = Arc::new(RecordingSink::default());
    {
        let services = services(&config, Arc::new(ScriptedChat::new(&["stable"])), first_sink.clone()).await;
        let answer = services
            .pipeline
            .answer("u", "Tell me and alert about windows")
            .await
            .unwrap();
        services.pipeline.watcher().observe(&answer).await.unwrap();
    }
    assert_eq!(first_sink.messages().len(), 1);

    let second_sink = Arc::new(RecordingSink::default());
    let services = services(&config, Arc::new(ScriptedChat::new(&["stable"])), second_sink.clone()).await;
    let answer = services
        .pipeline
        .answer("u", "Tell me and alert about windows")
        .await
        .unwrap();
    assert_eq!(
        services.pipeline.watcher().observe(&answer).await.unwrap(),
        Some(Decision::Identical)
    );
    assert!(second_sink.messages().is_empty());
}

#[tokio::test]
async fn test_non_alert_answers_never_reach_sink() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let sink = Arc::new(RecordingSink::default());
    let services = services(&config, Arc::new(ScriptedChat::new(&["r"])), sink.clone()).await;

    let answer = services.pipeline.answer("u", "Tell me about windows").await.unwrap();
    assert!(!answer.alert_enabled);
    assert_eq!(services.pipeline.watcher().observe(&answer).await.unwrap(), None);
    assert!(sink.messages().is_empty());
    // Still recorded as a raw answer.
    assert_eq!(read_entries(&config.answer_log.raw_path).unwrap().len(), 1);
}

#[tokio::test]
async fn test_completion_failure_fails_query() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let services = services(
        &config,
        Arc::new(ScriptedChat::failing_answers()),
        Arc::new(RecordingSink::default()),
    )
    .await;

    let err = services
        .pipeline
        .handle("u", "Tell me about windows")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SentinelError::ExternalCall {
            stage: Stage::Completion,
            ..
        }
    ));
    assert_eq!(services.stats.snapshot().queries_failed, 1);
    assert!(!config.answer_log.raw_path.exists());
}

#[tokio::test]
async fn test_delivery_failure_is_absorbed() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let services = services(
        &config,
        Arc::new(ScriptedChat::new(&["r1"])),
        Arc::new(RecordingSink::failing()),
    )
    .await;

    let answer = services
        .pipeline
        .answer("u", "Tell me and alert about windows")
        .await
        .unwrap();
    assert_eq!(
        services.pipeline.watcher().observe(&answer).await.unwrap(),
        Some(Decision::FirstResponse)
    );
    let snap = services.stats.snapshot();
    assert_eq!(snap.delivery_failures, 1);
    assert_eq!(snap.alerts_delivered, 0);
    // The accepted answer is logged regardless of delivery.
    assert_eq!(read_entries(&config.answer_log.deduped_path).unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let chat = Arc::new(ScriptedChat::new(&["r"]));
    let services = services(&config, chat.clone(), Arc::new(RecordingSink::default())).await;

    let err = services.pipeline.handle("u", "   ").await.unwrap_err();
    assert!(matches!(err, SentinelError::BadRequest(_)));
    assert!(chat.prompts().is_empty());
}

#[tokio::test]
async fn test_wrong_embedding_dims_fails_startup() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.embedding.dims = 3;

    let Err(err) = build_services(
        &config,
        Arc::new(BagOfWords),
        Arc::new(ScriptedChat::new(&["r"])),
        Arc::new(RecordingSink::default()),
    )
    .await
    else {
        panic!("services started with mismatched embedding dims");
    };
    assert!(matches!(
        err.downcast_ref::<SentinelError>(),
        Some(SentinelError::Configuration(_))
    ));
    assert!(err.to_string().contains("embedding.dims is 3"));
}

#[tokio::test]
async fn test_verify_embedding_dims() {
    assert!(verify_embedding_dims(&BagOfWords, VOCAB.len()).await.is_ok());
    assert!(matches!(
        verify_embedding_dims(&BagOfWords, VOCAB.len() + 1).await,
        Err(SentinelError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_dims_change_on_query_path_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    // The startup check sees full vectors; every later call is narrowed.
    let services = services_with(
        &config,
        Arc::new(NarrowingEmbedder::after(1)),
        Arc::new(ScriptedChat::new(&["r"])),
    )
    .await;
    let mut fatal = services.pipeline.fatal_errors();
    assert!(fatal.borrow().is_none());

    let err = services
        .pipeline
        .answer("u", "Tell me about windows")
        .await
        .unwrap_err();
    assert!(matches!(err, SentinelError::Configuration(_)));

    let message = tokio::time::timeout(Duration::from_secs(1), fatal.wait_for(|e| e.is_some()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(message, Some(err.to_string()));
    assert_eq!(services.stats.snapshot().queries_failed, 1);
}

#[tokio::test]
async fn test_slow_intent_call_times_out() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.server.request_timeout_secs = 1;
    let services = services_with(
        &config,
        Arc::new(BagOfWords),
        Arc::new(SlowChat {
            delay: Duration::from_secs(5),
        }),
    )
    .await;

    let started = Instant::now();
    let err = services
        .pipeline
        .answer("u", "Tell me about windows")
        .await
        .unwrap_err();
    assert!(matches!(err, SentinelError::Timeout { stage: Stage::Intent }));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(services.stats.snapshot().queries_failed, 1);
    // Timeouts are per request and never stop the service.
    assert!(services.pipeline.fatal_errors().borrow().is_none());
}
