//! Domain models for agentmem.
//!
//! Canonical definitions for the core entities:
//! - `Strategy`: one configured logical memory store
//! - `KnowledgeRecord`: a typed, confidence-scored fact
//! - `QueryResult`: the merged answer of one retrieval call

pub mod error;
pub mod record;
pub mod strategy;

pub use error::{MemoryError, ResolutionError, Result};
pub use record::{KnowledgeRecord, QueryResult, RankedRecord};
pub use strategy::{Strategy, StrategyClass, StrategyKind};
