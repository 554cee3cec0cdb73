//! Error types for ctxmem-state

use thiserror::Error;

/// Errors that can occur in the snapshot persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// No snapshot stored for this conversation
    #[error("conversation not found: {conversation_id}")]
    NotFound { conversation_id: String },

    /// Conversation id cannot be used as a storage key
    #[error("invalid conversation id: {0}")]
    InvalidId(String),

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Database or other backend error
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Record encoding/decoding error
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Storage configuration is missing or malformed
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    /// Primary and every replica failed to serve a load
    #[error("failed to load {conversation_id} from all {attempts} storage backends")]
    AllBackendsFailed {
        conversation_id: String,
        attempts: usize,
    },

    /// A replica operation failed
    #[error("replica {index} failed: {source}")]
    Replica {
        index: usize,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// Whether this error means "nothing stored under that id".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
