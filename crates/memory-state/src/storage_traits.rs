//! Storage trait definitions for agentmem
//!
//! `EventLog` is the only storage abstraction the memory core consumes:
//! an append-only sink plus namespace-scoped scans. Events are immutable
//! once appended; the log never updates them in place.
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Unique identifier for an event
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// Generate a new random EventId
    pub fn new() -> Self {
        EventId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an event payload carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// A serialized knowledge record
    KnowledgeRecord,
    /// A raw conversation turn
    Conversation,
    /// Anything else
    Raw,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::KnowledgeRecord => "knowledge_record",
            PayloadKind::Conversation => "conversation",
            PayloadKind::Raw => "raw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "knowledge_record" => Some(PayloadKind::KnowledgeRecord),
            "conversation" => Some(PayloadKind::Conversation),
            "raw" => Some(PayloadKind::Raw),
            _ => None,
        }
    }
}

/// An immutable ingested event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EventId,
    pub actor_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub payload_kind: PayloadKind,
    /// Every resolved namespace this event is visible in.
    pub matched_namespaces: BTreeSet<String>,
}

impl Event {
    /// Build an event with a fresh id.
    pub fn new(
        actor_id: impl Into<String>,
        session_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        payload: serde_json::Value,
        payload_kind: PayloadKind,
        matched_namespaces: BTreeSet<String>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            actor_id: actor_id.into(),
            session_id: session_id.into(),
            timestamp,
            payload,
            payload_kind,
            matched_namespaces,
        }
    }

    pub fn belongs_to(&self, namespace: &str) -> bool {
        self.matched_namespaces.contains(namespace)
    }
}

/// Ordering used by every scan: newest timestamp first, ties broken by
/// event id (descending) so repeated scans agree.
pub fn newest_first(a: &Event, b: &Event) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| b.event_id.cmp(&a.event_id))
}

// ---------------------------------------------------------------------------
// EventFilter
// ---------------------------------------------------------------------------

/// Optional predicates applied to a namespace scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Only events of this payload kind.
    pub payload_kind: Option<PayloadKind>,
    /// Only events strictly newer than this instant.
    pub newer_than: Option<DateTime<Utc>>,
    pub actor_id: Option<String>,
    pub session_id: Option<String>,
    /// Case-insensitive terms; an event matches when its payload mentions
    /// at least one of them. Empty means no term filter.
    pub terms: Vec<String>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records_only(mut self) -> Self {
        self.payload_kind = Some(PayloadKind::KnowledgeRecord);
        self
    }

    pub fn with_payload_kind(mut self, kind: PayloadKind) -> Self {
        self.payload_kind = Some(kind);
        self
    }

    pub fn newer_than(mut self, instant: DateTime<Utc>) -> Self {
        self.newer_than = Some(instant);
        self
    }

    pub fn for_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn for_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terms = terms
            .into_iter()
            .map(|t| t.into().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    /// Tighten the lower time bound, keeping whichever bound is later.
    pub fn clamp_newer_than(mut self, instant: DateTime<Utc>) -> Self {
        self.newer_than = Some(match self.newer_than {
            Some(existing) if existing > instant => existing,
            _ => instant,
        });
        self
    }

    /// Evaluate every predicate except the namespace against an event.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(kind) = self.payload_kind {
            if event.payload_kind != kind {
                return false;
            }
        }
        if let Some(after) = self.newer_than {
            if event.timestamp <= after {
                return false;
            }
        }
        if let Some(actor) = &self.actor_id {
            if &event.actor_id != actor {
                return false;
            }
        }
        if let Some(session) = &self.session_id {
            if &event.session_id != session {
                return false;
            }
        }
        if !self.terms.is_empty() {
            let haystack = searchable_text(&event.payload);
            if !self
                .terms
                .iter()
                .any(|t| haystack.contains(&t.to_lowercase()))
            {
                return false;
            }
        }
        true
    }
}

/// Lowercased text that query terms are matched against.
///
/// For a knowledge record this is its subject, attribute values and source
/// context; for any other payload, every scalar value. Field names and the
/// record envelope (`kind`, `confidence`) never match. Values are separated
/// by newlines so a term cannot straddle two of them.
pub fn searchable_text(payload: &serde_json::Value) -> String {
    let mut out = String::new();
    match payload.as_object() {
        Some(obj) if obj.contains_key("subject") && obj.contains_key("kind") => {
            for field in ["subject", "attributes", "source_context"] {
                if let Some(value) = obj.get(field) {
                    push_values(value, &mut out);
                }
            }
        }
        _ => push_values(payload, &mut out),
    }
    out.to_lowercase()
}

fn push_values(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;
    match value {
        Value::Null => {}
        Value::String(s) => {
            out.push_str(s);
            out.push('\n');
        }
        Value::Array(items) => items.iter().for_each(|v| push_values(v, out)),
        Value::Object(map) => map.values().for_each(|v| push_values(v, out)),
        scalar => {
            out.push_str(&scalar.to_string());
            out.push('\n');
        }
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Append-only event log.
///
/// Guarantees:
/// - `append` is atomic: the event is stored completely or not at all.
/// - Appended events are never modified.
/// - `scan_namespace` returns events tagged with the namespace, ordered by
///   [`newest_first`], at most `limit` of them.
/// - `remove` is reserved for retention sweeps; it is not part of the
///   ingestion surface.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append an event. Fails with `StorageError::Duplicate` if the id exists.
    async fn append(&self, event: &Event) -> StorageResult<()>;

    /// Fetch one event by id.
    async fn get(&self, event_id: &EventId) -> StorageResult<Event>;

    /// Events tagged with `namespace` that satisfy `filter`, newest first.
    async fn scan_namespace(
        &self,
        namespace: &str,
        filter: &EventFilter,
        limit: usize,
    ) -> StorageResult<Vec<Event>>;

    /// Events strictly older than `cutoff`, oldest first.
    async fn scan_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Event>>;

    /// Physically remove events. Returns how many existed. Missing ids are ignored.
    async fn remove(&self, event_ids: &[EventId]) -> StorageResult<usize>;

    /// Total number of stored events.
    async fn count(&self) -> StorageResult<usize>;
}
