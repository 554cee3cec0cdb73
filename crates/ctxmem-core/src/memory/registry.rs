//! Embedder-owned map of live conversations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use ctxmem_state::{ContextStore, Database};
use tracing::{debug, info};

use super::error::{MemoryError, MemoryResult};
use super::manager::ContextManager;
use super::summarizer::Summarizer;
use super::{read_lock, write_lock};
use crate::config::ContextConfig;

/// Conversations sharing one config, summarizer and optional store, up to
/// `max_conversations` at a time.
pub struct ConversationRegistry {
    config: ContextConfig,
    summarizer: Arc<dyn Summarizer>,
    store: Option<Arc<dyn ContextStore>>,
    max_conversations: usize,
    managers: RwLock<HashMap<String, ContextManager>>,
}

impl ConversationRegistry {
    /// Registry over a validated `config`. Fails with
    /// [`MemoryError::InvalidConfig`] when the config does not validate.
    pub fn new(
        config: ContextConfig,
        summarizer: Arc<dyn Summarizer>,
        store: Option<Arc<dyn ContextStore>>,
        max_conversations: usize,
    ) -> MemoryResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            summarizer,
            store,
            max_conversations,
            managers: RwLock::new(HashMap::new()),
        })
    }

    /// Build the store described by `config.storage` and wrap it.
    pub async fn from_config(
        config: ContextConfig,
        summarizer: Arc<dyn Summarizer>,
        db: Option<&Database>,
        max_conversations: usize,
    ) -> MemoryResult<Self> {
        let store = config.build_store(db).await?;
        Self::new(config, summarizer, store, max_conversations)
    }

    /// Existing manager for `conversation_id`, or a new one restored from
    /// the store when it holds a snapshot.
    pub async fn open(&self, conversation_id: &str) -> MemoryResult<ContextManager> {
        if let Some(existing) = read_lock(&self.managers).get(conversation_id).cloned() {
            return Ok(existing);
        }
        self.ensure_capacity()?;

        let manager = ContextManager::new(
            conversation_id,
            &self.config,
            self.summarizer.clone(),
            self.store.clone(),
        );
        if self.store.is_some() && manager.restore_from_store().await? {
            debug!(conversation_id, "restored conversation from store");
        }

        // Another caller may have opened the same id while we restored.
        let mut managers = write_lock(&self.managers);
        if let Some(existing) = managers.get(conversation_id) {
            return Ok(existing.clone());
        }
        if managers.len() >= self.max_conversations {
            return Err(MemoryError::CapacityReached {
                max: self.max_conversations,
            });
        }
        managers.insert(conversation_id.to_string(), manager.clone());
        Ok(manager)
    }

    /// Manager of an already-open conversation. Unlike [`open`](Self::open)
    /// this never creates one.
    pub fn get(&self, conversation_id: &str) -> MemoryResult<ContextManager> {
        read_lock(&self.managers)
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| MemoryError::ConversationNotFound(conversation_id.to_string()))
    }

    /// Forget a conversation. Stored snapshots are left alone.
    pub fn remove(&self, conversation_id: &str) -> bool {
        write_lock(&self.managers).remove(conversation_id).is_some()
    }

    /// Ids of the open conversations, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = read_lock(&self.managers).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of open conversations.
    pub fn len(&self) -> usize {
        read_lock(&self.managers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop conversations with no activity in the last `max_age`.
    pub async fn evict_idle(&self, max_age: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            return 0;
        };

        let candidates: Vec<(String, ContextManager)> = read_lock(&self.managers)
            .iter()
            .map(|(id, m)| (id.clone(), m.clone()))
            .collect();
        let mut stale = Vec::new();
        for (id, manager) in candidates {
            if manager.last_activity().await < cutoff {
                stale.push(id);
            }
        }

        let mut managers = write_lock(&self.managers);
        let evicted = stale
            .iter()
            .filter(|id| managers.remove(id.as_str()).is_some())
            .count();
        if evicted > 0 {
            info!(evicted, remaining = managers.len(), "evicted idle conversations");
        }
        evicted
    }

    fn ensure_capacity(&self) -> MemoryResult<()> {
        if self.len() >= self.max_conversations {
            return Err(MemoryError::CapacityReached {
                max: self.max_conversations,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::summarizer::ExtractiveSummarizer;
    use crate::memory::Metadata;

    fn registry(max: usize) -> ConversationRegistry {
        ConversationRegistry::new(
            ContextConfig::default(),
            Arc::new(ExtractiveSummarizer::new()),
            None,
            max,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn open_returns_shared_handle() {
        let registry = registry(4);
        let a = registry.open("conv").await.unwrap();
        a.add_message("user", "hello", Metadata::new()).await.unwrap();

        let b = registry.open("conv").await.unwrap();
        assert_eq!(b.get_full_context().await.0.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let registry = registry(2);
        registry.open("a").await.unwrap();
        registry.open("b").await.unwrap();
        let err = registry.open("c").await.unwrap_err();
        assert!(matches!(err, MemoryError::CapacityReached { max: 2 }));

        // existing ids still open at capacity
        registry.open("a").await.unwrap();
        assert!(registry.remove("a"));
        registry.open("c").await.unwrap();
        assert_eq!(registry.ids(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn remove_unknown_is_false() {
        assert!(!registry(1).remove("missing"));
    }

    #[tokio::test]
    async fn get_does_not_open() {
        let registry = registry(2);
        let err = registry.get("missing").unwrap_err();
        assert!(matches!(err, MemoryError::ConversationNotFound(id) if id == "missing"));
        assert!(registry.is_empty());

        registry.open("present").await.unwrap();
        assert_eq!(registry.get("present").unwrap().conversation_id(), "present");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ContextConfig {
            long_term_max_summaries: 0,
            ..Default::default()
        };
        let result =
            ConversationRegistry::new(config, Arc::new(ExtractiveSummarizer::new()), None, 1);
        assert!(matches!(result, Err(MemoryError::InvalidConfig(_))));
    }
}
