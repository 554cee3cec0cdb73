//! Storage backend configuration
//!
//! A [`StorageConfig`] names a backend type and carries an open settings map
//! interpreted per type:
//!
//! | type         | settings                                                  |
//! |--------------|-----------------------------------------------------------|
//! | `filesystem` | `base_path` (required)                                    |
//! | `database`   | `table` (optional); a live connection is passed separately |
//! | `hybrid`     | `primary` (nested config, required), `replicas` (array)   |

use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::StorageError;
use crate::failover::FailoverStore;
use crate::file::FileBackend;
use crate::migrations::DEFAULT_CONTEXT_TABLE;
use crate::record::{Database, RecordBackend};
use crate::store::{ContextStore, StorageResult};

/// Supported backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Filesystem,
    Database,
    Hybrid,
}

/// Backend type plus its per-type settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(rename = "type")]
    pub kind: StorageKind,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl StorageConfig {
    /// Filesystem backend rooted at `base_path`
    pub fn filesystem(base_path: impl AsRef<Path>) -> Self {
        let mut settings = Map::new();
        settings.insert(
            "base_path".to_string(),
            Value::String(base_path.as_ref().to_string_lossy().into_owned()),
        );
        Self {
            kind: StorageKind::Filesystem,
            settings,
        }
    }

    /// Database backend using the default table
    pub fn database() -> Self {
        Self {
            kind: StorageKind::Database,
            settings: Map::new(),
        }
    }

    /// Failover backend over the given primary and replicas
    pub fn hybrid(primary: StorageConfig, replicas: Vec<StorageConfig>) -> StorageResult<Self> {
        let mut settings = Map::new();
        settings.insert("primary".to_string(), serde_json::to_value(primary)?);
        settings.insert("replicas".to_string(), serde_json::to_value(replicas)?);
        Ok(Self {
            kind: StorageKind::Hybrid,
            settings,
        })
    }

    fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }
}

fn nested_config(value: &Value, what: &str) -> StorageResult<StorageConfig> {
    serde_json::from_value(value.clone())
        .map_err(|e| StorageError::InvalidConfig(format!("invalid {what} storage spec: {e}")))
}

/// Build a store from configuration.
///
/// `db` is the live SurrealDB connection required by `database` backends
/// (directly or nested inside a `hybrid` spec).
pub fn build_store<'a>(
    config: &'a StorageConfig,
    db: Option<&'a Database>,
) -> BoxFuture<'a, StorageResult<Arc<dyn ContextStore>>> {
    Box::pin(async move {
        match config.kind {
            StorageKind::Filesystem => {
                let base_path = config.setting_str("base_path").ok_or_else(|| {
                    StorageError::InvalidConfig(
                        "base_path required for filesystem storage".to_string(),
                    )
                })?;
                info!(base_path, "Using filesystem context storage");
                let store: Arc<dyn ContextStore> = Arc::new(FileBackend::new(base_path)?);
                Ok(store)
            }

            StorageKind::Database => {
                let db = db.ok_or_else(|| {
                    StorageError::InvalidConfig(
                        "database connection required for database storage".to_string(),
                    )
                })?;
                let table = config
                    .setting_str("table")
                    .unwrap_or(DEFAULT_CONTEXT_TABLE);
                info!(table, "Using database context storage");
                let store: Arc<dyn ContextStore> =
                    Arc::new(RecordBackend::new(db.clone(), table).await?);
                Ok(store)
            }

            StorageKind::Hybrid => {
                let primary_spec = config.settings.get("primary").ok_or_else(|| {
                    StorageError::InvalidConfig(
                        "primary storage spec required for hybrid storage".to_string(),
                    )
                })?;
                let primary_config = nested_config(primary_spec, "primary")?;
                let primary = build_store(&primary_config, db).await?;

                let replica_specs = match config.settings.get("replicas") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(specs)) => specs.clone(),
                    Some(_) => {
                        return Err(StorageError::InvalidConfig(
                            "replicas must be an array of storage specs".to_string(),
                        ))
                    }
                };

                let mut replicas = Vec::with_capacity(replica_specs.len());
                for (index, spec) in replica_specs.iter().enumerate() {
                    let replica_config = nested_config(spec, &format!("replica {index}"))?;
                    let replica = build_store(&replica_config, db)
                        .await
                        .map_err(|e| StorageError::Replica {
                            index,
                            source: Box::new(e),
                        })?;
                    replicas.push(replica);
                }

                info!(replicas = replicas.len(), "Using hybrid context storage");
                let store: Arc<dyn ContextStore> = Arc::new(FailoverStore::new(primary, replicas));
                Ok(store)
            }
        }
    })
}
