//! Per-conversation orchestration of the two memory tiers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ctxmem_state::ContextStore;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn, Instrument};

use super::archive::{LongTermArchive, Summary};
use super::buffer::ShortTermBuffer;
use super::error::{MemoryError, MemoryResult};
use super::message::{Message, Metadata, Role};
use super::snapshot::{ContextSnapshot, ContextStats};
use super::summarizer::Summarizer;
use crate::config::ContextConfig;
use crate::metrics::METRICS;
use crate::obs;

/// Deadline for a single background backup.
pub const BACKUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Summaries returned alongside recent turns by [`ContextManager::get_context`].
pub const CONTEXT_SUMMARY_LIMIT: usize = 5;

const MESSAGE_OVERHEAD_BYTES: usize = 100;
const SUMMARY_OVERHEAD_BYTES: usize = 200;

struct Conversation {
    created_at: DateTime<Utc>,
    buffer: ShortTermBuffer,
    archive: LongTermArchive,
    messages_added: u64,
    // Bumped by clear; a backup launched under an older value is stale.
    generation: u64,
}

struct ManagerInner {
    conversation_id: String,
    state: RwLock<Conversation>,
    store: Option<Arc<dyn ContextStore>>,
    backup_enabled: bool,
    backup_interval: Duration,
    last_backup: Mutex<Option<Instant>>,
}

impl ManagerInner {
    // Records the launch when one is due.
    fn backup_due(&self) -> bool {
        let mut last = self
            .last_backup
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let due = match *last {
            Some(at) => at.elapsed() >= self.backup_interval,
            None => true,
        };
        if due {
            *last = Some(Instant::now());
        }
        due
    }
}

/// Memory for one conversation: a short-term buffer of recent turns and a
/// long-term archive of summaries, behind one reader/writer lock.
///
/// Cloning is cheap and yields a handle to the same conversation.
#[derive(Clone)]
pub struct ContextManager {
    inner: Arc<ManagerInner>,
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("conversation_id", &self.inner.conversation_id)
            .field("has_store", &self.inner.store.is_some())
            .field("backup_enabled", &self.inner.backup_enabled)
            .finish()
    }
}

impl ContextManager {
    pub fn new(
        conversation_id: impl Into<String>,
        config: &ContextConfig,
        summarizer: Arc<dyn Summarizer>,
        store: Option<Arc<dyn ContextStore>>,
    ) -> Self {
        let conversation = Conversation {
            created_at: Utc::now(),
            buffer: ShortTermBuffer::new(
                config.short_term_max_messages,
                config.short_term_window(),
            ),
            archive: LongTermArchive::new(
                config.long_term_max_summaries,
                config.summarization_threshold,
                summarizer,
            ),
            messages_added: 0,
            generation: 0,
        };

        Self {
            inner: Arc::new(ManagerInner {
                conversation_id: conversation_id.into(),
                state: RwLock::new(conversation),
                store,
                backup_enabled: config.backup_enabled,
                backup_interval: config.backup_interval(),
                last_backup: Mutex::new(None),
            }),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.inner.conversation_id
    }

    /// Creation time, or the original one after an import.
    pub async fn created_at(&self) -> DateTime<Utc> {
        self.inner.state.read().await.created_at
    }

    /// Time of the last append or clear. After an import, the last update
    /// recorded in the snapshot.
    pub async fn last_activity(&self) -> DateTime<Utc> {
        self.inner.state.read().await.buffer.updated_at()
    }

    /// Record a turn.
    ///
    /// Once the buffer holds `summarization_threshold` turns, the oldest
    /// `summarization_threshold` of them are summarized into the archive.
    /// They stay in the buffer until evicted by its own bounds. A
    /// summarization error is returned but the turn remains recorded.
    #[instrument(skip(self, role, content, metadata), fields(conversation_id = %self.inner.conversation_id))]
    pub async fn add_message(
        &self,
        role: impl Into<Role>,
        content: impl Into<String>,
        metadata: Metadata,
    ) -> MemoryResult<Message> {
        let id = self.conversation_id();
        let message = Message::new(role, content).with_metadata(metadata);
        let generation = {
            let mut conv = self.inner.state.write().await;
            let evicted = conv.buffer.append(message.clone());
            conv.messages_added += 1;
            METRICS.inc_messages_added();
            obs::emit_message_added(id, &message.id, message.role.as_str(), evicted);

            let threshold = conv.archive.threshold();
            let current = conv.buffer.messages();
            if threshold > 0 && current.len() >= threshold {
                if let Some(summary) = conv.archive.ingest(&current[..threshold]).await? {
                    METRICS.inc_summaries_created();
                    obs::emit_promotion(id, &summary.id, summary.message_count);
                }
            }
            conv.generation
        };

        self.spawn_backup_if_due(generation);
        Ok(message)
    }

    /// The last `max_messages` turns (all when 0) and up to
    /// [`CONTEXT_SUMMARY_LIMIT`] summaries relevant to `query`.
    pub async fn get_context(
        &self,
        query: &str,
        max_messages: usize,
    ) -> (Vec<Message>, Vec<Summary>) {
        let conv = self.inner.state.read().await;
        (
            conv.buffer.recent(max_messages),
            conv.archive.relevant_summaries(query, CONTEXT_SUMMARY_LIMIT),
        )
    }

    pub async fn get_full_context(&self) -> (Vec<Message>, Vec<Summary>) {
        let conv = self.inner.state.read().await;
        (conv.buffer.messages(), conv.archive.all_summaries())
    }

    /// Buffered turns whose content contains `query` (case-insensitive),
    /// plus relevant summaries when requested.
    pub async fn search_context(
        &self,
        query: &str,
        include_summaries: bool,
    ) -> (Vec<Message>, Vec<Summary>) {
        let needle = query.to_lowercase();
        let conv = self.inner.state.read().await;
        let messages = conv
            .buffer
            .messages()
            .into_iter()
            .filter(|m| m.content.to_lowercase().contains(&needle))
            .collect();
        let summaries = if include_summaries {
            let limit = conv.archive.len();
            conv.archive.relevant_summaries(query, limit)
        } else {
            Vec::new()
        };
        (messages, summaries)
    }

    /// Occupancy, footprint estimate and pressure of both tiers.
    pub async fn stats(&self) -> ContextStats {
        let conv = self.inner.state.read().await;
        Self::stats_of(&conv, Utc::now())
    }

    /// Empty both tiers and delete any stored snapshot. A storage error is
    /// returned after the tiers have been cleared.
    ///
    /// Background backups launched before the clear never write afterwards.
    #[instrument(skip(self), fields(conversation_id = %self.inner.conversation_id))]
    pub async fn clear_context(&self) -> MemoryResult<()> {
        let mut conv = self.inner.state.write().await;
        conv.buffer.clear();
        conv.archive.clear();
        conv.generation += 1;
        obs::emit_context_cleared(self.conversation_id());

        if let Some(store) = &self.inner.store {
            store.delete(self.conversation_id()).await?;
        }
        Ok(())
    }

    /// Serialize the conversation as a pretty-printed [`ContextSnapshot`].
    pub async fn export_context(&self) -> MemoryResult<Vec<u8>> {
        let conv = self.inner.state.read().await;
        self.snapshot_of(&conv).encode()
    }

    /// Replace the conversation's memory with a snapshot.
    ///
    /// The document is decoded before anything changes, so malformed input
    /// leaves the conversation untouched. Turns go back through the buffer
    /// and are subject to its bounds; summaries beyond the archive capacity
    /// are dropped oldest first.
    #[instrument(skip(self, data), fields(conversation_id = %self.inner.conversation_id, bytes = data.len()))]
    pub async fn import_context(&self, data: &[u8]) -> MemoryResult<()> {
        let snapshot = ContextSnapshot::decode(data)?;
        if snapshot.conversation_id != self.inner.conversation_id {
            warn!(
                snapshot_id = %snapshot.conversation_id,
                "importing snapshot taken from another conversation"
            );
        }

        let mut conv = self.inner.state.write().await;
        conv.buffer.clear();
        for message in snapshot.messages {
            conv.buffer.append(message);
        }
        conv.archive.replace_all(snapshot.summaries);
        conv.buffer.set_updated_at(snapshot.updated_at);
        conv.created_at = snapshot.created_at;

        obs::emit_context_restored(
            self.conversation_id(),
            conv.buffer.len(),
            conv.archive.len(),
        );
        Ok(())
    }

    /// Export and save through the attached store, waiting for the result.
    pub async fn backup_now(&self) -> MemoryResult<()> {
        let store = self.require_store()?;
        let bytes = self.persist(store.as_ref(), None).await?.unwrap_or_default();
        METRICS.inc_backups_written();
        obs::emit_backup_written(self.conversation_id(), bytes);
        Ok(())
    }

    /// Load this conversation's snapshot from the store and import it.
    /// Returns `false` when the store has nothing for this conversation.
    pub async fn restore_from_store(&self) -> MemoryResult<bool> {
        let store = self.require_store()?;
        match store.load(self.conversation_id()).await {
            Ok(data) => {
                self.import_context(&data).await?;
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn require_store(&self) -> MemoryResult<Arc<dyn ContextStore>> {
        self.inner
            .store
            .clone()
            .ok_or_else(|| MemoryError::InvalidConfig("no context store attached".to_string()))
    }

    fn snapshot_of(&self, conv: &Conversation) -> ContextSnapshot {
        ContextSnapshot {
            conversation_id: self.inner.conversation_id.clone(),
            created_at: conv.created_at,
            updated_at: conv.buffer.updated_at(),
            messages: conv.buffer.messages(),
            summaries: conv.archive.all_summaries(),
            stats: Self::stats_of(conv, Utc::now()),
        }
    }

    // The read lock is held through the save so a concurrent clear cannot
    // slip between export and write. With `expected_generation` set, nothing
    // is written once a clear has happened; returns `None` in that case.
    async fn persist(
        &self,
        store: &dyn ContextStore,
        expected_generation: Option<u64>,
    ) -> MemoryResult<Option<usize>> {
        let conv = self.inner.state.read().await;
        if expected_generation.is_some_and(|g| g != conv.generation) {
            return Ok(None);
        }
        let data = self.snapshot_of(&conv).encode()?;
        store.save(self.conversation_id(), &data).await?;
        Ok(Some(data.len()))
    }

    fn spawn_backup_if_due(&self, generation: u64) {
        if !self.inner.backup_enabled {
            return;
        }
        let Some(store) = self.inner.store.clone() else {
            return;
        };
        if !self.inner.backup_due() {
            debug!("backup interval not elapsed, skipping");
            return;
        }

        let manager = self.clone();
        let span = obs::conversation_span(self.conversation_id());
        let backup = async move {
            let id = manager.conversation_id();
            let persist = manager.persist(store.as_ref(), Some(generation));
            match tokio::time::timeout(BACKUP_TIMEOUT, persist).await {
                Ok(Ok(Some(bytes))) => {
                    METRICS.inc_backups_written();
                    obs::emit_backup_written(id, bytes);
                }
                Ok(Ok(None)) => debug!("conversation cleared since launch, backup dropped"),
                Ok(Err(e)) => {
                    METRICS.inc_backup_failures();
                    obs::emit_backup_failed(id, &e);
                }
                Err(_) => {
                    METRICS.inc_backup_failures();
                    let reason = format!("timed out after {}s", BACKUP_TIMEOUT.as_secs());
                    obs::emit_backup_failed(id, &reason);
                }
            }
        };
        tokio::spawn(backup.instrument(span));
    }

    fn stats_of(conv: &Conversation, now: DateTime<Utc>) -> ContextStats {
        let window = conv.buffer.window_info();
        let archive = conv.archive.memory_stats();

        let message_bytes: usize = conv
            .buffer
            .messages()
            .iter()
            .map(|m| m.id.len() + m.role.as_str().len() + m.content.len() + MESSAGE_OVERHEAD_BYTES)
            .sum();
        let summary_bytes: usize = conv
            .archive
            .all_summaries()
            .iter()
            .map(|s| {
                s.id.len()
                    + s.content.len()
                    + s.topics.iter().map(String::len).sum::<usize>()
                    + s.key_points.iter().map(String::len).sum::<usize>()
                    + SUMMARY_OVERHEAD_BYTES
            })
            .sum();

        let pressure = fill_ratio(window.message_count, window.max_messages)
            .max(fill_ratio(archive.summary_count, archive.max_summaries));

        let mut custom_stats = BTreeMap::new();
        custom_stats.insert(
            "short_term_window_secs".to_string(),
            json!(window.window.as_secs()),
        );
        custom_stats.insert(
            "total_messages_processed".to_string(),
            json!(archive.total_messages),
        );
        custom_stats.insert(
            "total_messages_added".to_string(),
            json!(conv.messages_added),
        );
        custom_stats.insert(
            "average_importance".to_string(),
            json!(archive.average_importance),
        );
        custom_stats.insert("memory_span_days".to_string(), json!(archive.span_days));

        ContextStats {
            short_term_messages: window.message_count,
            short_term_max_messages: window.max_messages,
            long_term_summaries: archive.summary_count,
            long_term_max_summaries: archive.max_summaries,
            total_memory_usage_bytes: (message_bytes + summary_bytes) as u64,
            conversation_age_secs: (now - conv.created_at).num_seconds(),
            last_activity: conv.buffer.updated_at(),
            memory_pressure: pressure,
            custom_stats,
        }
    }
}

fn fill_ratio(used: usize, cap: usize) -> f64 {
    if cap == 0 {
        return 1.0;
    }
    (used as f64 / cap as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::summarizer::{ConversationSummary, StaticSummarizer};

    fn summarizer() -> Arc<StaticSummarizer> {
        Arc::new(StaticSummarizer::new(ConversationSummary {
            content: "Deployment planning".into(),
            topics: vec!["deploy".into()],
            key_points: vec!["Ship on Friday".into()],
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

    #[test]
    fn fill_ratio_bounds() {
        assert_eq!(fill_ratio(0, 10), 0.0);
        assert_eq!(fill_ratio(5, 10), 0.5);
        assert_eq!(fill_ratio(20, 10), 1.0);
        assert_eq!(fill_ratio(0, 0), 1.0);
    }

    #[tokio::test]
    async fn add_message_assigns_id_and_metadata() {
        let manager = ContextManager::new("conv", &config(10, 100), summarizer(), None);
        let mut metadata = Metadata::new();
        metadata.insert("channel".into(), json!("slack"));

        let msg = manager
            .add_message(Role::user(), "hello", metadata.clone())
            .await
            .unwrap();
        assert!(msg.id.starts_with("msg_"));
        assert_eq!(msg.metadata, metadata);

        let (messages, summaries) = manager.get_full_context().await;
        assert_eq!(messages, vec![msg]);
        assert!(summaries.is_empty());
    }

    #[tokio::test]
    async fn promotion_copies_oldest_batch() {
        let summarizer = summarizer();
        let manager = ContextManager::new("conv", &config(10, 2), summarizer.clone(), None);
        manager.add_message("user", "one", Metadata::new()).await.unwrap();
        manager.add_message("assistant", "two", Metadata::new()).await.unwrap();

        let (messages, summaries) = manager.get_full_context().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].message_count, 2);
        assert_eq!(summarizer.calls(), 1);
    }

    #[tokio::test]
    async fn stats_reflect_tiers() {
        let manager = ContextManager::new("conv", &config(4, 2), summarizer(), None);
        for i in 0..2 {
            manager
                .add_message("user", format!("turn {i}"), Metadata::new())
                .await
                .unwrap();
        }
        let stats = manager.stats().await;
        assert_eq!(stats.short_term_messages, 2);
        assert_eq!(stats.short_term_max_messages, 4);
        assert_eq!(stats.long_term_summaries, 1);
        assert_eq!(stats.long_term_max_summaries, 100);
        assert_eq!(stats.memory_pressure, 0.5);
        assert!(stats.total_memory_usage_bytes > 0);
        assert_eq!(stats.custom_stats["total_messages_added"], json!(2));
        assert_eq!(stats.custom_stats["total_messages_processed"], json!(2));
        assert_eq!(stats.custom_stats["short_term_window_secs"], json!(3600));
    }

    #[tokio::test]
    async fn backup_without_store_is_config_error() {
        let manager = ContextManager::new("conv", &config(4, 2), summarizer(), None);
        assert!(matches!(
            manager.backup_now().await,
            Err(MemoryError::InvalidConfig(_))
        ));
        assert!(matches!(
            manager.restore_from_store().await,
            Err(MemoryError::InvalidConfig(_))
        ));
    }
}
