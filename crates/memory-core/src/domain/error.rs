//! Domain-level error taxonomy for agentmem.

use agentmem_state::StorageError;

use super::strategy::StrategyKind;

/// A namespace template could not be instantiated for a given context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("strategy {strategy_id} requires {variable} but none was supplied")]
    MissingVariable {
        strategy_id: String,
        variable: &'static str,
    },

    #[error("invalid {variable} for strategy {strategy_id}: {reason}")]
    InvalidValue {
        strategy_id: String,
        variable: &'static str,
        reason: String,
    },
}

/// agentmem domain errors.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("namespace resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid strategy {strategy_id}: {reason}")]
    InvalidStrategy { strategy_id: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid knowledge record: {0}")]
    InvalidRecord(String),

    /// A knowledge record was offered that no strategy accepts.
    #[error("no strategy accepts a {kind} record with confidence {confidence}")]
    Unroutable { kind: StrategyKind, confidence: f64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for agentmem domain operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
