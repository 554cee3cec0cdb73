//! Configuration for conversation memory.

use std::sync::Arc;
use std::time::Duration;

use ctxmem_state::{build_store, ContextStore, Database, StorageConfig};
use serde::{Deserialize, Serialize};

use crate::memory::{MemoryError, MemoryResult};

/// Tier sizes, promotion threshold and backup behaviour shared by every
/// conversation built from it. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub short_term_max_messages: usize,
    pub short_term_window_secs: u64,
    pub long_term_max_summaries: usize,
    /// Buffer length at which the oldest turns are summarized.
    pub summarization_threshold: usize,
    pub backup_enabled: bool,
    /// Minimum gap between background backups; 0 backs up on every append.
    pub backup_interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            short_term_max_messages: 50,
            short_term_window_secs: 3600,
            long_term_max_summaries: 100,
            summarization_threshold: 20,
            backup_enabled: false,
            backup_interval_secs: 0,
            storage: None,
        }
    }
}

impl ContextConfig {
    pub fn short_term_window(&self) -> Duration {
        Duration::from_secs(self.short_term_window_secs)
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_secs)
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_backups(mut self, enabled: bool) -> Self {
        self.backup_enabled = enabled;
        self
    }

    pub fn validate(&self) -> MemoryResult<()> {
        if self.short_term_max_messages == 0 {
            return Err(MemoryError::InvalidConfig(
                "short_term_max_messages must be at least 1".to_string(),
            ));
        }
        if self.long_term_max_summaries == 0 {
            return Err(MemoryError::InvalidConfig(
                "long_term_max_summaries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the configured store, if any. `db` is required when the
    /// storage tree contains a `database` backend.
    pub async fn build_store(
        &self,
        db: Option<&Database>,
    ) -> MemoryResult<Option<Arc<dyn ContextStore>>> {
        match &self.storage {
            Some(storage) => Ok(Some(build_store(storage, db).await?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxmem_state::StorageKind;

    #[test]
    fn defaults() {
        let config = ContextConfig::default();
        assert_eq!(config.short_term_max_messages, 50);
        assert_eq!(config.short_term_window(), Duration::from_secs(3600));
        assert_eq!(config.long_term_max_summaries, 100);
        assert_eq!(config.summarization_threshold, 20);
        assert!(!config.backup_enabled);
        assert_eq!(config.backup_interval(), Duration::ZERO);
        assert!(config.storage.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: ContextConfig = toml::from_str(
            r#"
            short_term_max_messages = 10
            backup_enabled = true

            [storage]
            type = "filesystem"
            settings = { base_path = "/var/lib/ctxmem" }
            "#,
        )
        .unwrap();

        assert_eq!(config.short_term_max_messages, 10);
        assert_eq!(config.summarization_threshold, 20);
        assert!(config.backup_enabled);
        let storage = config.storage.unwrap();
        assert_eq!(storage.kind, StorageKind::Filesystem);
        assert_eq!(storage.settings["base_path"], "/var/lib/ctxmem");
    }

    #[test]
    fn zero_capacities_are_rejected() {
        let config = ContextConfig {
            short_term_max_messages: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MemoryError::InvalidConfig(_))
        ));

        let config = ContextConfig {
            long_term_max_summaries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn build_store_without_storage_is_none() {
        assert!(ContextConfig::default()
            .build_store(None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn build_store_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let config = ContextConfig::default().with_storage(StorageConfig::filesystem(dir.path()));
        let store = config.build_store(None).await.unwrap().unwrap();
        store.save("conv", b"{}").await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["conv"]);
    }
}
