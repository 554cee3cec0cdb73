//! Portable snapshot of a conversation's memory.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::archive::Summary;
use super::error::MemoryResult;
use super::message::Message;

/// Occupancy and usage figures for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextStats {
    pub short_term_messages: usize,
    pub short_term_max_messages: usize,
    pub long_term_summaries: usize,
    pub long_term_max_summaries: usize,
    /// Rough estimate, not a measurement.
    pub total_memory_usage_bytes: u64,
    pub conversation_age_secs: i64,
    pub last_activity: DateTime<Utc>,
    /// Fullness of the fuller tier, in `[0, 1]`.
    pub memory_pressure: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_stats: BTreeMap<String, serde_json::Value>,
}

/// Self-describing JSON document holding a conversation's turns and
/// summaries. `stats` is informational and ignored on import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    pub summaries: Vec<Summary>,
    #[serde(default)]
    pub stats: ContextStats,
}

impl ContextSnapshot {
    /// Pretty-printed JSON.
    pub fn encode(&self) -> MemoryResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn decode(data: &[u8]) -> MemoryResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}
