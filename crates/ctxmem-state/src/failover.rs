//! Failover snapshot store
//!
//! Wraps one primary and any number of replica stores:
//! - `save` is synchronous on the primary and fire-and-forget on replicas
//! - `load` falls back through the replicas in order and writes the first
//!   replica hit back to the primary in the background (self-healing)
//! - `delete` is attempted everywhere, reporting the last failure
//! - `list` is served by the primary only
//!
//! Background tasks are never awaited, retried or cancelled; their failures
//! only show up in the logs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::error::StorageError;
use crate::store::{ContextStore, StorageResult};

/// Primary + replicas snapshot store.
#[derive(Clone)]
pub struct FailoverStore {
    primary: Arc<dyn ContextStore>,
    replicas: Vec<Arc<dyn ContextStore>>,
}

impl FailoverStore {
    pub fn new(primary: Arc<dyn ContextStore>, replicas: Vec<Arc<dyn ContextStore>>) -> Self {
        Self { primary, replicas }
    }

    /// Number of replica backends
    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    fn spawn_replication(&self, conversation_id: &str, data: Arc<[u8]>) {
        for (index, replica) in self.replicas.iter().enumerate() {
            let replica = Arc::clone(replica);
            let conversation_id = conversation_id.to_string();
            let data = Arc::clone(&data);
            tokio::spawn(async move {
                match replica.save(&conversation_id, &data).await {
                    Ok(()) => debug!(replica = index, %conversation_id, "replicated snapshot"),
                    Err(e) => warn!(
                        replica = index,
                        %conversation_id,
                        error = %e,
                        "failed to replicate snapshot"
                    ),
                }
            });
        }
    }

    fn spawn_write_back(&self, replica_index: usize, conversation_id: &str, data: Vec<u8>) {
        let primary = Arc::clone(&self.primary);
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            match primary.save(&conversation_id, &data).await {
                Ok(()) => debug!(
                    replica = replica_index,
                    %conversation_id,
                    "restored primary from replica"
                ),
                Err(e) => warn!(
                    replica = replica_index,
                    %conversation_id,
                    error = %e,
                    "failed to restore primary from replica"
                ),
            }
        });
    }
}

#[async_trait]
impl ContextStore for FailoverStore {
    #[instrument(skip(self, data), fields(replicas = self.replicas.len()))]
    async fn save(&self, conversation_id: &str, data: &[u8]) -> StorageResult<()> {
        self.primary.save(conversation_id, data).await?;
        if !self.replicas.is_empty() {
            self.spawn_replication(conversation_id, Arc::from(data));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(replicas = self.replicas.len()))]
    async fn load(&self, conversation_id: &str) -> StorageResult<Vec<u8>> {
        let primary_err = match self.primary.load(conversation_id).await {
            Ok(data) => return Ok(data),
            Err(e) => e,
        };
        debug!(error = %primary_err, "primary load failed, trying replicas");

        let mut all_not_found = primary_err.is_not_found();
        for (index, replica) in self.replicas.iter().enumerate() {
            match replica.load(conversation_id).await {
                Ok(data) => {
                    self.spawn_write_back(index, conversation_id, data.clone());
                    return Ok(data);
                }
                Err(e) => {
                    all_not_found &= e.is_not_found();
                    warn!(replica = index, error = %e, "failed to load from replica");
                }
            }
        }

        if all_not_found {
            return Err(StorageError::NotFound {
                conversation_id: conversation_id.to_string(),
            });
        }
        Err(StorageError::AllBackendsFailed {
            conversation_id: conversation_id.to_string(),
            attempts: 1 + self.replicas.len(),
        })
    }

    #[instrument(skip(self), fields(replicas = self.replicas.len()))]
    async fn delete(&self, conversation_id: &str) -> StorageResult<()> {
        let mut last_error = None;

        if let Err(e) = self.primary.delete(conversation_id).await {
            warn!(error = %e, "failed to delete from primary");
            last_error = Some(e);
        }

        for (index, replica) in self.replicas.iter().enumerate() {
            if let Err(e) = replica.delete(conversation_id).await {
                warn!(replica = index, error = %e, "failed to delete from replica");
                last_error = Some(StorageError::Replica {
                    index,
                    source: Box::new(e),
                });
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        self.primary.list().await
    }
}
