//! SurrealDB schema initialization
//!
//! Defines the `memory_events` table with the indexes namespace scans and
//! retention sweeps rely on.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all agentmem tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing agentmem SurrealDB schema");
    init_memory_events_table(db).await?;
    info!("agentmem schema initialization complete");
    Ok(())
}

/// Initialize `memory_events` table with constraints and indexes
///
/// Schema:
/// ```text
/// TABLE memory_events {
///   id:            RECORD (memory_events:<event_id>)
///   event_id:      STRING (unique)
///   actor_id:      STRING (indexed)
///   session_id:    STRING
///   timestamp:     DATETIME (indexed)
///   payload:       STRING (JSON text)
///   payload_kind:  STRING (knowledge_record | conversation | raw)
///   search_text:   STRING (lowercased values query terms match against)
///   namespaces:    ARRAY<STRING> (indexed per element)
/// }
/// ```
///
/// Constraints:
/// - Rows are never updated; only retention sweeps delete them.
async fn init_memory_events_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing memory_events table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS memory_events SCHEMALESS
            PERMISSIONS
                FOR select, create, delete FULL
                FOR update NONE;

        DEFINE INDEX IF NOT EXISTS idx_event_id ON TABLE memory_events COLUMNS event_id UNIQUE;

        -- Namespace scans: one index entry per array element
        DEFINE INDEX IF NOT EXISTS idx_namespaces ON TABLE memory_events COLUMNS namespaces;

        -- Retention sweeps and newest-first ordering
        DEFINE INDEX IF NOT EXISTS idx_timestamp ON TABLE memory_events COLUMNS timestamp;

        DEFINE INDEX IF NOT EXISTS idx_actor_id ON TABLE memory_events COLUMNS actor_id;
    "#;

    db.query(sql)
        .await?
        .check()
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?;
    info!("memory_events table initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let db = surrealdb::engine::any::connect("mem://").await.unwrap();
        db.use_ns("agentmem").use_db("test").await.unwrap();
        init_schema(&db).await.unwrap();
        init_schema(&db).await.unwrap();
    }
}
