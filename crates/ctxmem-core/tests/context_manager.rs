use std::sync::Arc;

use async_trait::async_trait;
use ctxmem_core::{
    ContextConfig, ContextManager, ContextSnapshot, ConversationSummary, MemoryError, Message,
    Metadata, Role, StaticSummarizer, Summarizer,
};

fn deploy_summarizer() -> Arc<StaticSummarizer> {
    Arc::new(StaticSummarizer::new(ConversationSummary {
        content: "Deployment planning for the billing service".to_string(),
        topics: vec!["deploy".to_string(), "billing".to_string()],
        key_points: vec!["Deploy billing on Friday".to_string()],
        importance: 0.8,
    }))
}

fn config(max_messages: usize, threshold: usize) -> ContextConfig {
    ContextConfig {
        short_term_max_messages: max_messages,
        summarization_threshold: threshold,
        ..Default::default()
    }
}

fn manager(max_messages: usize, threshold: usize) -> ContextManager {
    ContextManager::new("conv-1", &config(max_messages, threshold), deploy_summarizer(), None)
}

fn contents(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.content.as_str()).collect()
}

struct OfflineSummarizer;

#[async_trait]
impl Summarizer for OfflineSummarizer {
    async fn summarize(&self, _turns: &[Message]) -> anyhow::Result<ConversationSummary> {
        anyhow::bail!("summarization backend offline")
    }
}

// ---- Buffer bounds through the manager ----

#[tokio::test]
async fn buffer_keeps_only_newest_turns() {
    let manager = manager(3, 100);
    for i in 1..=5 {
        manager
            .add_message(Role::user(), format!("t{i}"), Metadata::new())
            .await
            .unwrap();
    }

    let (messages, summaries) = manager.get_full_context().await;
    assert_eq!(contents(&messages), vec!["t3", "t4", "t5"]);
    assert!(summaries.is_empty());
}

#[tokio::test]
async fn threshold_promotes_single_summary() {
    let manager = manager(10, 2);
    manager
        .add_message(Role::user(), "when do we deploy?", Metadata::new())
        .await
        .unwrap();
    manager
        .add_message(Role::assistant(), "friday", Metadata::new())
        .await
        .unwrap();

    let (messages, summaries) = manager.get_full_context().await;
    assert_eq!(messages.len(), 2, "promoted turns stay in the buffer");
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].message_count, 2);
    assert_eq!(summaries[0].start_time, messages[0].timestamp);
    assert_eq!(summaries[0].end_time, messages[1].timestamp);
}

#[tokio::test]
async fn summarizer_failure_keeps_turn() {
    let manager = ContextManager::new("conv-1", &config(10, 1), Arc::new(OfflineSummarizer), None);
    let err = manager
        .add_message(Role::user(), "hello", Metadata::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Summarization(_)));

    let (messages, summaries) = manager.get_full_context().await;
    assert_eq!(contents(&messages), vec!["hello"]);
    assert!(summaries.is_empty());
}

// ---- Queries ----

#[tokio::test]
async fn get_context_combines_recent_turns_and_relevant_summaries() {
    let manager = manager(10, 2);
    for c in ["a", "b", "c", "d"] {
        manager.add_message(Role::user(), c, Metadata::new()).await.unwrap();
    }

    let (messages, summaries) = manager.get_context("BILLING", 2).await;
    assert_eq!(contents(&messages), vec!["c", "d"]);
    // promotion ran on the 2nd, 3rd and 4th turn
    assert_eq!(summaries.len(), 3);

    let (_, unrelated) = manager.get_context("kubernetes", 2).await;
    assert!(unrelated.is_empty());
}

#[tokio::test]
async fn get_context_caps_summaries_at_five() {
    let manager = manager(50, 1);
    for i in 0..8 {
        manager
            .add_message(Role::user(), format!("turn {i}"), Metadata::new())
            .await
            .unwrap();
    }
    let (messages, summaries) = manager.get_context("deploy", 0).await;
    assert_eq!(messages.len(), 8);
    assert_eq!(summaries.len(), 5);

    let (_, all) = manager.get_full_context().await;
    let last_five: Vec<_> = all[3..].iter().map(|s| s.id.clone()).collect();
    let got: Vec<_> = summaries.iter().map(|s| s.id.clone()).collect();
    assert_eq!(got, last_five);
}

#[tokio::test]
async fn search_is_case_insensitive() {
    let manager = manager(10, 3);
    manager
        .add_message(Role::user(), "The Billing job failed", Metadata::new())
        .await
        .unwrap();
    manager
        .add_message(Role::assistant(), "Retrying now", Metadata::new())
        .await
        .unwrap();
    manager
        .add_message(Role::user(), "billing looks fine", Metadata::new())
        .await
        .unwrap();

    let (messages, summaries) = manager.search_context("BILLING", false).await;
    assert_eq!(
        contents(&messages),
        vec!["The Billing job failed", "billing looks fine"]
    );
    assert!(summaries.is_empty());

    let (_, summaries) = manager.search_context("billing", true).await;
    assert_eq!(summaries.len(), 1);
}

// ---- Clear ----

#[tokio::test]
async fn clear_then_reuse() {
    let manager = manager(10, 2);
    for c in ["a", "b"] {
        manager.add_message(Role::user(), c, Metadata::new()).await.unwrap();
    }
    manager.clear_context().await.unwrap();

    let stats = manager.stats().await;
    assert_eq!(stats.short_term_messages, 0);
    assert_eq!(stats.long_term_summaries, 0);

    manager.add_message(Role::user(), "c", Metadata::new()).await.unwrap();
    assert_eq!(contents(&manager.get_full_context().await.0), vec!["c"]);
}

// ---- Export / import ----

#[tokio::test]
async fn export_import_round_trip_preserves_ids() {
    let source = manager(10, 2);
    let mut metadata = Metadata::new();
    metadata.insert("ticket".to_string(), serde_json::json!("OPS-12"));
    source
        .add_message(Role::user(), "deploy billing", metadata)
        .await
        .unwrap();
    source
        .add_message(Role::assistant(), "scheduled", Metadata::new())
        .await
        .unwrap();

    let data = source.export_context().await.unwrap();
    let snapshot = ContextSnapshot::decode(&data).unwrap();
    assert_eq!(snapshot.conversation_id, "conv-1");
    assert_eq!(snapshot.stats.short_term_messages, 2);

    let target = manager(10, 2);
    target.import_context(&data).await.unwrap();

    assert_eq!(target.get_full_context().await, source.get_full_context().await);
    assert_eq!(target.created_at().await, source.created_at().await);
    assert_eq!(snapshot.updated_at, source.last_activity().await);
    assert_eq!(target.last_activity().await, source.last_activity().await);
}

#[tokio::test]
async fn import_applies_buffer_bounds() {
    let source = manager(10, 100);
    for i in 1..=5 {
        source
            .add_message(Role::user(), format!("t{i}"), Metadata::new())
            .await
            .unwrap();
    }
    let data = source.export_context().await.unwrap();

    let target = manager(3, 100);
    target.import_context(&data).await.unwrap();
    assert_eq!(contents(&target.get_full_context().await.0), vec!["t3", "t4", "t5"]);
}

#[tokio::test]
async fn malformed_import_leaves_state_untouched() {
    let manager = manager(10, 100);
    manager
        .add_message(Role::user(), "keep me", Metadata::new())
        .await
        .unwrap();

    let err = manager.import_context(b"{\"messages\": 42").await.unwrap_err();
    assert!(matches!(err, MemoryError::Serialization(_)));
    assert_eq!(contents(&manager.get_full_context().await.0), vec!["keep me"]);
}

// ---- Stats ----

#[tokio::test]
async fn stats_report_pressure_and_footprint() {
    let manager = manager(4, 100);
    for c in ["a", "b", "c"] {
        manager.add_message(Role::user(), c, Metadata::new()).await.unwrap();
    }
    let stats = manager.stats().await;
    assert_eq!(stats.short_term_messages, 3);
    assert_eq!(stats.memory_pressure, 0.75);
    assert!(stats.total_memory_usage_bytes >= 300);
    assert!(stats.conversation_age_secs >= 0);
    assert_eq!(stats.last_activity, manager.last_activity().await);
    assert_eq!(stats.custom_stats["total_messages_added"], serde_json::json!(3));
}
