//! Storage trait for conversation snapshots
//!
//! `ContextStore` is the only persistence contract the memory tiers depend
//! on. Implementations store opaque bytes keyed by conversation id and must
//! not interpret them.
//!
//! All operations are async and backend-agnostic. In-memory fakes are
//! provided for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Durable key/value persistence for serialized conversation snapshots.
///
/// Guarantees:
/// - `load(id)` returns the exact bytes most recently passed to `save(id, _)`.
/// - `load` of an absent id fails with `StorageError::NotFound`.
/// - `delete` of an absent id succeeds.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Store (or overwrite) the snapshot for a conversation.
    async fn save(&self, conversation_id: &str, data: &[u8]) -> StorageResult<()>;

    /// Retrieve the snapshot for a conversation.
    async fn load(&self, conversation_id: &str) -> StorageResult<Vec<u8>>;

    /// Remove the snapshot for a conversation. No-op if absent.
    async fn delete(&self, conversation_id: &str) -> StorageResult<()>;

    /// List the ids of all stored conversations.
    async fn list(&self) -> StorageResult<Vec<String>>;
}
