//! ctxmem core library
//!
//! Tiered memory for conversational agents: recent turns in a bounded
//! sliding window, older turns condensed into scored summaries, and a
//! per-conversation manager that ties both to a pluggable snapshot store.

pub mod config;
pub mod memory;
pub mod metrics;
pub mod obs;
pub mod telemetry;

pub use config::ContextConfig;

pub use memory::{
    relevance_score, ArchiveStats, ContextManager, ContextSnapshot, ContextStats,
    ConversationRegistry, ConversationSummary, ExtractiveSummarizer, LongTermArchive,
    MemoryError, MemoryResult, Message, Metadata, Role, ShortTermBuffer, StaticSummarizer,
    Summarizer, Summary, WindowInfo,
};

pub use ctxmem_state::{ContextStore, StorageConfig, StorageError, StorageKind};
