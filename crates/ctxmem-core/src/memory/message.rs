//! Conversation turns.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form per-turn metadata.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Speaker of a turn. Open set; `user`, `assistant` and `system` are the
/// conventional values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn user() -> Self {
        Role("user".to_string())
    }

    pub fn assistant() -> Self {
        Role("assistant".to_string())
    }

    pub fn system() -> Self {
        Role("system".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Role(s.to_string())
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role(s)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Documents without a timestamp are stamped when decoded.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl Message {
    /// New turn with a fresh id, stamped now.
    pub fn new(role: impl Into<Role>, content: impl Into<String>) -> Self {
        Self {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_messages_get_distinct_ids() {
        let a = Message::new(Role::user(), "hi");
        let b = Message::new(Role::user(), "hi");
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("msg_"));
    }

    #[test]
    fn role_is_an_open_string() {
        let tool: Role = "tool".into();
        assert_eq!(tool.as_str(), "tool");
        assert_eq!(serde_json::to_string(&tool).unwrap(), "\"tool\"");
    }

    #[test]
    fn empty_metadata_is_omitted() {
        let json = serde_json::to_value(Message::new("user", "hello")).unwrap();
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn missing_timestamp_is_stamped_on_decode() {
        let before = Utc::now();
        let msg: Message =
            serde_json::from_str(r#"{"id":"m1","role":"user","content":"hi"}"#).unwrap();
        assert!(msg.timestamp >= before);
        assert!(msg.metadata.is_empty());
    }
}
