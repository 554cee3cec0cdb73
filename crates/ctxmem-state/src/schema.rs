//! Schema definitions for ctxmem SurrealDB tables
//!
//! Tables:
//! - conversation_contexts: one snapshot row per conversation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::store::StorageResult;

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// One persisted conversation snapshot.
///
/// The snapshot bytes are kept hex-encoded so the database stores them as an
/// opaque string and never tries to interpret the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    /// Conversation this snapshot belongs to
    pub conversation_id: String,
    /// Hex-encoded snapshot bytes
    pub data: String,
    /// Last write time
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl ContextRecord {
    /// Wrap raw snapshot bytes for storage
    pub fn new(conversation_id: impl Into<String>, data: &[u8]) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            data: hex::encode(data),
            updated_at: Utc::now(),
        }
    }

    /// Decode the stored snapshot bytes
    pub fn bytes(&self) -> StorageResult<Vec<u8>> {
        hex::decode(&self.data).map_err(|e| {
            StorageError::Serialization(format!(
                "corrupt snapshot for {}: {}",
                self.conversation_id, e
            ))
        })
    }
}
