//! SurrealDB-backed snapshot store
//!
//! One row per conversation in a single table, keyed by the conversation id
//! as record id. Saves are upserts, so repeated backups of the same
//! conversation overwrite the previous snapshot in place.

use async_trait::async_trait;
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::migrations::{self, DEFAULT_CONTEXT_TABLE};
use crate::schema::ContextRecord;
use crate::store::{ContextStore, StorageResult};

/// Connection settings for [`RecordBackend::connect`]
#[derive(Debug, Clone)]
pub struct SurrealConfig {
    /// Engine URL (e.g. `mem://`, `surrealkv://path`, `wss://host`)
    pub url: String,
    /// Namespace (default: "ctxmem")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Snapshot table (default: "conversation_contexts")
    pub table: String,
}

impl Default for SurrealConfig {
    fn default() -> Self {
        Self {
            url: "mem://".to_string(),
            namespace: "ctxmem".to_string(),
            database: "main".to_string(),
            table: DEFAULT_CONTEXT_TABLE.to_string(),
        }
    }
}

impl SurrealConfig {
    /// Create a configuration for the given engine URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Set custom snapshot table
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - CTXMEM_SURREALDB_URL (optional, default: "mem://")
    /// - CTXMEM_SURREALDB_NAMESPACE (optional, default: "ctxmem")
    /// - CTXMEM_SURREALDB_DATABASE (optional, default: "main")
    /// - CTXMEM_CONTEXT_TABLE (optional, default: "conversation_contexts")
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("CTXMEM_SURREALDB_URL").unwrap_or(defaults.url),
            namespace: std::env::var("CTXMEM_SURREALDB_NAMESPACE")
                .unwrap_or(defaults.namespace),
            database: std::env::var("CTXMEM_SURREALDB_DATABASE").unwrap_or(defaults.database),
            table: std::env::var("CTXMEM_CONTEXT_TABLE").unwrap_or(defaults.table),
        }
    }
}

/// Live SurrealDB connection accepted by [`RecordBackend::new`]
pub type Database = Surreal<Any>;

#[derive(Debug, Deserialize)]
struct ListedRow {
    conversation_id: String,
}

/// SurrealDB-backed implementation of [`ContextStore`].
#[derive(Clone)]
pub struct RecordBackend {
    db: Database,
    table: String,
}

impl RecordBackend {
    /// Wrap a live connection (namespace/database already selected) and
    /// make sure the snapshot table exists.
    pub async fn new(db: Database, table: impl Into<String>) -> StorageResult<Self> {
        let table = table.into();
        migrations::init_context_table(&db, &table).await?;
        Ok(Self { db, table })
    }

    /// Connect using explicit settings.
    #[instrument(skip(config), fields(url = %config.url, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: SurrealConfig) -> StorageResult<Self> {
        let db = surrealdb::engine::any::connect(&config.url)
            .await
            .map_err(|e| {
                StorageError::Backend(format!("Failed to connect to {}: {}", config.url, e))
            })?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StorageError::Backend(format!("Failed to select namespace/database: {}", e))
            })?;

        let backend = Self::new(db, config.table).await?;
        info!("RecordBackend connected");
        Ok(backend)
    }

    /// Connect using environment variables (see [`SurrealConfig::from_env`]).
    pub async fn connect_from_env() -> StorageResult<Self> {
        Self::connect(SurrealConfig::from_env()).await
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> StorageResult<Self> {
        Self::connect(SurrealConfig::default()).await
    }

    /// Table holding the snapshots
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Stored row for a conversation, including when it was last written.
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn load_record(&self, conversation_id: &str) -> StorageResult<ContextRecord> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing($table, $id)")
            .bind(("table", self.table.clone()))
            .bind(("id", conversation_id.to_string()))
            .await?;

        let rows: Vec<ContextRecord> = res.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound {
                conversation_id: conversation_id.to_string(),
            })
    }
}

#[async_trait]
impl ContextStore for RecordBackend {
    #[instrument(skip(self, data), fields(table = %self.table, bytes = data.len()))]
    async fn save(&self, conversation_id: &str, data: &[u8]) -> StorageResult<()> {
        let record = ContextRecord::new(conversation_id, data);

        self.db
            .query(
                "UPSERT type::thing($table, $id) SET \
                 conversation_id = $id, data = $data, updated_at = $updated_at",
            )
            .bind(("table", self.table.clone()))
            .bind(("id", record.conversation_id))
            .bind(("data", record.data))
            .bind(("updated_at", SurrealDatetime::from(record.updated_at)))
            .await?
            .check()?;

        debug!("snapshot upserted");
        Ok(())
    }

    async fn load(&self, conversation_id: &str) -> StorageResult<Vec<u8>> {
        self.load_record(conversation_id).await?.bytes()
    }

    #[instrument(skip(self), fields(table = %self.table))]
    async fn delete(&self, conversation_id: &str) -> StorageResult<()> {
        self.db
            .query("DELETE type::thing($table, $id)")
            .bind(("table", self.table.clone()))
            .bind(("id", conversation_id.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    #[instrument(skip(self), fields(table = %self.table))]
    async fn list(&self) -> StorageResult<Vec<String>> {
        let mut res = self
            .db
            .query(
                "SELECT conversation_id, updated_at FROM type::table($table) \
                 ORDER BY updated_at DESC",
            )
            .bind(("table", self.table.clone()))
            .await?;

        let rows: Vec<ListedRow> = res.take(0)?;
        Ok(rows.into_iter().map(|r| r.conversation_id).collect())
    }
}
