//! SurrealDB schema initialization
//!
//! Sets up the snapshot table used by [`crate::RecordBackend`].
//! Safe to call multiple times (idempotent).

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::store::StorageResult;

/// Default table holding conversation snapshots
pub const DEFAULT_CONTEXT_TABLE: &str = "conversation_contexts";

/// Check that a table name is a plain identifier, since it is interpolated
/// into DEFINE statements.
pub fn validate_table_name(table: &str) -> StorageResult<()> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidConfig(format!(
            "invalid table name: {table:?}"
        )))
    }
}

/// Initialize the snapshot table
///
/// Schema:
/// ```text
/// TABLE <table> {
///   id:               RECORD ID (conversation id)
///   conversation_id:  STRING (unique)
///   data:             STRING (hex-encoded snapshot)
///   updated_at:       DATETIME (indexed)
/// }
/// ```
pub async fn init_context_table(db: &Surreal<Any>, table: &str) -> StorageResult<()> {
    validate_table_name(table)?;
    debug!(table, "Initializing context table");

    let sql = format!(
        r#"
        DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;

        -- One snapshot per conversation
        DEFINE INDEX IF NOT EXISTS idx_{table}_conversation_id ON TABLE {table} COLUMNS conversation_id UNIQUE;

        -- Listing is ordered by most recent write
        DEFINE INDEX IF NOT EXISTS idx_{table}_updated_at ON TABLE {table} COLUMNS updated_at;
        "#
    );

    db.query(sql)
        .await
        .map_err(|e| StorageError::Backend(format!("schema setup failed: {e}")))?
        .check()
        .map_err(|e| StorageError::Backend(format!("schema setup failed: {e}")))?;

    info!(table, "Context table initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_name_validation() {
        assert!(validate_table_name("conversation_contexts").is_ok());
        assert!(validate_table_name("ctx2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1abc").is_err());
        assert!(validate_table_name("a; DELETE b").is_err());
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let db = surrealdb::engine::any::connect("mem://").await.unwrap();
        db.use_ns("ctxmem").use_db("main").await.unwrap();

        init_context_table(&db, DEFAULT_CONTEXT_TABLE).await.unwrap();
        init_context_table(&db, DEFAULT_CONTEXT_TABLE).await.unwrap();
    }
}
