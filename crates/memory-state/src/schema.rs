//! SurrealDB row types
//!
//! `EventRow` is the persisted shape of an [`Event`]; conversion happens at
//! the storage boundary in `surreal_log`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{searchable_text, Event, EventId, PayloadKind};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Persisted event row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub event_id: String,
    pub actor_id: String,
    pub session_id: String,
    #[serde(with = "surreal_datetime")]
    pub timestamp: DateTime<Utc>,
    /// Payload as JSON text, decoded at the boundary.
    pub payload: String,
    pub payload_kind: String,
    /// Lowercased payload values that query terms are matched against.
    #[serde(default)]
    pub search_text: String,
    pub namespaces: Vec<String>,
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        EventRow {
            id: None,
            event_id: event.event_id.0.clone(),
            actor_id: event.actor_id.clone(),
            session_id: event.session_id.clone(),
            timestamp: event.timestamp,
            payload: event.payload.to_string(),
            payload_kind: event.payload_kind.as_str().to_string(),
            search_text: searchable_text(&event.payload),
            namespaces: event.matched_namespaces.iter().cloned().collect(),
        }
    }
}

impl TryFrom<EventRow> for Event {
    type Error = StorageError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let payload_kind = PayloadKind::parse(&row.payload_kind).ok_or_else(|| {
            StorageError::Serialization(format!("unknown payload kind: {}", row.payload_kind))
        })?;
        let payload = serde_json::from_str(&row.payload)?;
        Ok(Event {
            event_id: EventId(row.event_id),
            actor_id: row.actor_id,
            session_id: row.session_id,
            timestamp: row.timestamp,
            payload,
            payload_kind,
            matched_namespaces: row.namespaces.into_iter().collect::<BTreeSet<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_conversion_preserves_fields() {
        let event = Event::new(
            "alice",
            "s1",
            Utc::now(),
            json!({"subject": "escalation"}),
            PayloadKind::KnowledgeRecord,
            BTreeSet::from(["/a".to_string(), "/b".to_string()]),
        );
        let row = EventRow::from(&event);
        assert_eq!(row.payload_kind, "knowledge_record");
        assert_eq!(row.namespaces, vec!["/a".to_string(), "/b".to_string()]);
        assert_eq!(row.search_text, "escalation\n");

        let back = Event::try_from(row).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn unknown_payload_kind_is_rejected() {
        let mut row = EventRow::from(&Event::new(
            "a",
            "s",
            Utc::now(),
            json!({}),
            PayloadKind::Raw,
            BTreeSet::new(),
        ));
        row.payload_kind = "mystery".into();
        assert!(matches!(
            Event::try_from(row),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn corrupt_payload_text_is_rejected() {
        let mut row = EventRow::from(&Event::new(
            "a",
            "s",
            Utc::now(),
            json!({"note": "x"}),
            PayloadKind::Raw,
            BTreeSet::new(),
        ));
        row.payload = "{not json".into();
        assert!(matches!(
            Event::try_from(row),
            Err(StorageError::Serialization(_))
        ));
    }
}
