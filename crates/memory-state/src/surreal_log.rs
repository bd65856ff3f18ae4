//! SurrealDB-backed EventLog implementation
//!
//! Uses `schema::EventRow` for persistence, converting to/from
//! `storage_traits::Event` at the boundary. Each event is stored under the
//! record id `memory_events:<event_id>`, so a repeated append of the same
//! event is rejected by the database itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use surrealdb::engine::any::Any;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::handle::{self, CloudConfig};
use crate::schema::EventRow;
use crate::storage_traits::{
    newest_first, Event, EventFilter, EventId, EventLog, StorageResult,
};

const TABLE: &str = "memory_events";

/// SurrealDB-backed implementation of [`EventLog`].
#[derive(Clone)]
pub struct SurrealEventLog {
    db: Surreal<Any>,
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: u64,
}

impl SurrealEventLog {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = handle::connect_url("mem://").await?;
        info!("SurrealEventLog connected (in-memory)");
        Ok(Self { db })
    }

    /// Connect to an explicit URL (`mem://`, `surrealkv://path`, `ws://...`).
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let db = handle::connect_url(url).await?;
        info!("SurrealEventLog connected ({})", url);
        Ok(Self { db })
    }

    /// Connect to SurrealDB Cloud.
    pub async fn connect_cloud(config: &CloudConfig) -> crate::Result<Self> {
        let db = handle::connect_cloud(config).await?;
        info!("SurrealEventLog connected (cloud)");
        Ok(Self { db })
    }

    /// Connect to the store the environment points at: a hosted store,
    /// then `AGENTMEM_SURREAL_URL`, then local persistence in `.agentmem/db`.
    pub async fn from_env() -> crate::Result<Self> {
        let db = handle::connect_from_env().await?;
        Ok(Self { db })
    }

    fn rows_to_events(rows: Vec<EventRow>) -> StorageResult<Vec<Event>> {
        rows.into_iter().map(Event::try_from).collect()
    }

    fn map_create_error(event_id: &EventId, err: surrealdb::Error) -> StorageError {
        let msg = err.to_string();
        if msg.contains("already exists") {
            StorageError::Duplicate {
                event_id: event_id.0.clone(),
            }
        } else {
            StorageError::Backend(msg)
        }
    }
}

#[async_trait]
impl EventLog for SurrealEventLog {
    #[instrument(skip_all, fields(event_id = %event.event_id))]
    async fn append(&self, event: &Event) -> StorageResult<()> {
        let row = EventRow::from(event);
        debug!(namespaces = row.namespaces.len(), "appending event");

        let _created: Option<EventRow> = self
            .db
            .create((TABLE, event.event_id.0.clone()))
            .content(row)
            .await
            .map_err(|e| Self::map_create_error(&event.event_id, e))?;

        Ok(())
    }

    async fn get(&self, event_id: &EventId) -> StorageResult<Event> {
        let row: Option<EventRow> = self
            .db
            .select((TABLE, event_id.0.clone()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.ok_or_else(|| StorageError::NotFound {
            event_id: event_id.0.clone(),
        })
        .and_then(Event::try_from)
    }

    #[instrument(skip(self, filter))]
    async fn scan_namespace(
        &self,
        namespace: &str,
        filter: &EventFilter,
        limit: usize,
    ) -> StorageResult<Vec<Event>> {
        let mut sql = String::from("SELECT * FROM memory_events WHERE namespaces CONTAINS $ns");
        if filter.payload_kind.is_some() {
            sql.push_str(" AND payload_kind = $kind");
        }
        if filter.newer_than.is_some() {
            sql.push_str(" AND timestamp > $after");
        }
        if filter.actor_id.is_some() {
            sql.push_str(" AND actor_id = $actor");
        }
        if filter.session_id.is_some() {
            sql.push_str(" AND session_id = $session");
        }
        if !filter.terms.is_empty() {
            let any_term = (0..filter.terms.len())
                .map(|i| format!("string::contains(search_text, $t{i})"))
                .collect::<Vec<_>>()
                .join(" OR ");
            sql.push_str(&format!(" AND ({any_term})"));
        }
        sql.push_str(" ORDER BY timestamp DESC, event_id DESC LIMIT $limit");

        let mut query = self
            .db
            .query(sql)
            .bind(("ns", namespace.to_string()))
            .bind(("limit", limit as i64));
        if let Some(kind) = filter.payload_kind {
            query = query.bind(("kind", kind.as_str().to_string()));
        }
        if let Some(after) = filter.newer_than {
            query = query.bind(("after", SurrealDatetime::from(after)));
        }
        if let Some(actor) = &filter.actor_id {
            query = query.bind(("actor", actor.clone()));
        }
        if let Some(session) = &filter.session_id {
            query = query.bind(("session", session.clone()));
        }
        for (i, term) in filter.terms.iter().enumerate() {
            query = query.bind((format!("t{i}"), term.clone()));
        }

        let mut res = query
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let rows: Vec<EventRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut events: Vec<Event> = Self::rows_to_events(rows)?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        events.sort_by(newest_first);
        events.truncate(limit);
        Ok(events)
    }

    async fn scan_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Event>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM memory_events WHERE timestamp < $cutoff \
                 ORDER BY timestamp ASC, event_id ASC LIMIT $limit",
            )
            .bind(("cutoff", SurrealDatetime::from(cutoff)))
            .bind(("limit", limit as i64))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<EventRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Self::rows_to_events(rows)
    }

    async fn remove(&self, event_ids: &[EventId]) -> StorageResult<usize> {
        let mut removed = 0usize;
        for id in event_ids {
            let deleted: Option<EventRow> = self
                .db
                .delete((TABLE, id.0.clone()))
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            if deleted.is_some() {
                removed += 1;
            }
        }
        debug!(removed, "removed events");
        Ok(removed)
    }

    async fn count(&self) -> StorageResult<usize> {
        let mut res = self
            .db
            .query("SELECT count() AS total FROM memory_events GROUP ALL")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let row: Option<CountRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(row.map(|r| r.total as usize).unwrap_or(0))
    }
}
