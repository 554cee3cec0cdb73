//! Error types for the memory subsystem.

use ctxmem_state::StorageError;

/// Errors produced by memory operations.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("summarization failed: {0}")]
    Summarization(#[source] anyhow::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("maximum number of concurrent conversations reached ({max})")]
    CapacityReached { max: usize },

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
}

/// Result type for memory operations.
pub type MemoryResult<T> = std::result::Result<T, MemoryError>;
