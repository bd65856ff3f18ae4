//! agentmem-state: append-only event log for agentmem
//!
//! This crate is the persistence layer of the memory system. It stores
//! immutable events, each tagged with the resolved namespaces it belongs to,
//! and answers namespace-scoped range queries ordered newest first.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: append atomicity, namespace scans, timestamp filtering.
//!
//! ## Key Components
//!
//! - `EventLog`: backend-agnostic storage trait
//! - `SurrealEventLog`: SurrealDB implementation (memory, local file, or cloud)
//! - `fakes`: in-memory and fault-injecting implementations for tests

mod error;
pub mod fakes;
mod handle;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_log;

pub use error::{StateError, StorageError};
pub use handle::CloudConfig;
pub use schema::EventRow;
pub use storage_traits::{
    newest_first, searchable_text, Event, EventFilter, EventId, EventLog, PayloadKind,
    StorageResult,
};
pub use surreal_log::SurrealEventLog;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
