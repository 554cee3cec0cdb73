//! ctxmem-state: Snapshot persistence for ctxmem
//!
//! This crate provides the persistence layer for tiered conversation memory.
//! It stores and retrieves opaque conversation snapshots keyed by
//! conversation id, without ever interpreting their contents.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: durable writes, read fallback and replica self-healing.
//!
//! ## Key Components
//!
//! - `ContextStore`: async key/value contract for snapshot blobs
//! - `FileBackend`: one atomically-renamed file per conversation
//! - `RecordBackend`: one SurrealDB row per conversation (upsert on save)
//! - `FailoverStore`: primary + replicas with async replication and read fallback
//! - `build_store`: construct any of the above from a `StorageConfig`

pub mod config;
mod error;
pub mod failover;
pub mod fakes;
pub mod file;
pub mod migrations;
pub mod record;
mod schema;
pub mod store;

pub use config::{build_store, StorageConfig, StorageKind};
pub use error::StorageError;
pub use failover::FailoverStore;
pub use file::FileBackend;
pub use record::{Database, RecordBackend, SurrealConfig};
pub use schema::ContextRecord;
pub use store::{ContextStore, StorageResult};
