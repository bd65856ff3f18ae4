//! Error types for agentmem-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors surfaced by [`crate::EventLog`] implementations
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend could not be reached. Transient.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed the operation. Transient.
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("event not found: {event_id}")]
    NotFound { event_id: String },

    /// An event with the same id was already appended.
    #[error("event already exists: {event_id}")]
    Duplicate { event_id: String },

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_) | StorageError::Backend(_))
    }
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StorageError::Unavailable("down".into()).is_transient());
        assert!(StorageError::Backend("timeout".into()).is_transient());
        assert!(!StorageError::Duplicate {
            event_id: "e1".into()
        }
        .is_transient());
        assert!(!StorageError::NotFound {
            event_id: "e1".into()
        }
        .is_transient());
    }

    #[test]
    fn display_includes_event_id() {
        let err = StorageError::Duplicate {
            event_id: "abc".into(),
        };
        assert!(err.to_string().contains("abc"));
    }
}
