//! Tiered conversation memory.
//!
//! A bounded short-term buffer of recent turns, a capped long-term archive
//! of summaries produced by a pluggable [`Summarizer`], and the
//! [`ContextManager`] that promotes turns between the two tiers, answers
//! context and search queries, and drives snapshot persistence.

pub mod archive;
pub mod buffer;
pub mod error;
pub mod manager;
pub mod message;
pub mod registry;
pub mod snapshot;
pub mod summarizer;

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use archive::{relevance_score, ArchiveStats, LongTermArchive, Summary, MIN_RELEVANCE};
pub use buffer::{ShortTermBuffer, WindowInfo};
pub use error::{MemoryError, MemoryResult};
pub use manager::{ContextManager, BACKUP_TIMEOUT, CONTEXT_SUMMARY_LIMIT};
pub use message::{Message, Metadata, Role};
pub use registry::ConversationRegistry;
pub use snapshot::{ContextSnapshot, ContextStats};
pub use summarizer::{ConversationSummary, ExtractiveSummarizer, StaticSummarizer, Summarizer};

// Tier locks only guard plain data, so a panic while holding one cannot
// leave it half-updated in a way later readers care about.
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
