//! In-memory fakes for the storage trait (testing only)
//!
//! Provides `MemoryContextStore`, which satisfies the `ContextStore`
//! contract without any external dependencies, and `FailingContextStore`,
//! which fails every call with a backend error.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::store::{ContextStore, StorageResult};

// ---------------------------------------------------------------------------
// MemoryContextStore
// ---------------------------------------------------------------------------

/// In-memory snapshot store backed by a `HashMap<conversation_id, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryContextStore {
    store: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a snapshot directly, bypassing `save`.
    pub fn insert(&self, conversation_id: &str, data: &[u8]) {
        let mut store = self.store.lock().unwrap();
        store.insert(conversation_id.to_string(), data.to_vec());
    }

    /// Peek at a stored snapshot without going through `load`.
    pub fn get(&self, conversation_id: &str) -> Option<Vec<u8>> {
        let store = self.store.lock().unwrap();
        store.get(conversation_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.store.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn save(&self, conversation_id: &str, data: &[u8]) -> StorageResult<()> {
        self.insert(conversation_id, data);
        Ok(())
    }

    async fn load(&self, conversation_id: &str) -> StorageResult<Vec<u8>> {
        self.get(conversation_id)
            .ok_or_else(|| StorageError::NotFound {
                conversation_id: conversation_id.to_string(),
            })
    }

    async fn delete(&self, conversation_id: &str) -> StorageResult<()> {
        let mut store = self.store.lock().unwrap();
        store.remove(conversation_id);
        Ok(())
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        let store = self.store.lock().unwrap();
        let mut ids: Vec<String> = store.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// FailingContextStore
// ---------------------------------------------------------------------------

/// Store whose every operation fails with `StorageError::Backend`.
#[derive(Debug, Clone)]
pub struct FailingContextStore {
    reason: String,
}

impl FailingContextStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn err(&self) -> StorageError {
        StorageError::Backend(self.reason.clone())
    }
}

impl Default for FailingContextStore {
    fn default() -> Self {
        Self::new("backend unavailable")
    }
}

#[async_trait]
impl ContextStore for FailingContextStore {
    async fn save(&self, _conversation_id: &str, _data: &[u8]) -> StorageResult<()> {
        Err(self.err())
    }

    async fn load(&self, _conversation_id: &str) -> StorageResult<Vec<u8>> {
        Err(self.err())
    }

    async fn delete(&self, _conversation_id: &str) -> StorageResult<()> {
        Err(self.err())
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        Err(self.err())
    }
}
