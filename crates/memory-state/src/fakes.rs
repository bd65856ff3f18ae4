//! In-memory fakes for the event log (testing only)
//!
//! Provides `MemoryEventLog`, which satisfies the `EventLog` contract without
//! external dependencies, and `ScriptedEventLog`, which wraps it to inject
//! append failures and per-namespace scan latency.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryEventLog
// ---------------------------------------------------------------------------

/// In-memory event log backed by a `Vec<Event>` in append order.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<Event>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, event: &Event) -> StorageResult<()> {
        let mut events = self.events.lock().unwrap();
        if events.iter().any(|e| e.event_id == event.event_id) {
            return Err(StorageError::Duplicate {
                event_id: event.event_id.0.clone(),
            });
        }
        events.push(event.clone());
        Ok(())
    }

    async fn get(&self, event_id: &EventId) -> StorageResult<Event> {
        let events = self.events.lock().unwrap();
        events
            .iter()
            .find(|e| &e.event_id == event_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                event_id: event_id.0.clone(),
            })
    }

    async fn scan_namespace(
        &self,
        namespace: &str,
        filter: &EventFilter,
        limit: usize,
    ) -> StorageResult<Vec<Event>> {
        let events = self.events.lock().unwrap();
        let mut hits: Vec<Event> = events
            .iter()
            .filter(|e| e.belongs_to(namespace) && filter.matches(e))
            .cloned()
            .collect();
        hits.sort_by(newest_first);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scan_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Event>> {
        let events = self.events.lock().unwrap();
        let mut hits: Vec<Event> = events
            .iter()
            .filter(|e| e.timestamp < cutoff)
            .cloned()
            .collect();
        hits.sort_by(|a, b| newest_first(b, a));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn remove(&self, event_ids: &[EventId]) -> StorageResult<usize> {
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| !event_ids.contains(&e.event_id));
        Ok(before - events.len())
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.events.lock().unwrap().len())
    }
}

// ---------------------------------------------------------------------------
// ScriptedEventLog
// ---------------------------------------------------------------------------

/// Fault-injecting wrapper around [`MemoryEventLog`].
///
/// - The first `failing_appends` calls to `append` return
///   `StorageError::Unavailable` without storing anything.
/// - Scans of a namespace listed in `scan_delays` sleep first.
/// - Scans of a namespace listed in `broken_namespaces` fail with
///   `StorageError::Backend`.
#[derive(Debug, Default)]
pub struct ScriptedEventLog {
    inner: MemoryEventLog,
    failing_appends: AtomicU32,
    append_attempts: AtomicU32,
    scan_delays: HashMap<String, Duration>,
    broken_namespaces: HashSet<String>,
}

impl ScriptedEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` appends.
    pub fn failing_appends(self, n: u32) -> Self {
        self.failing_appends.store(n, Ordering::SeqCst);
        self
    }

    /// Delay every scan of `namespace` by `delay`.
    pub fn delay_namespace(mut self, namespace: impl Into<String>, delay: Duration) -> Self {
        self.scan_delays.insert(namespace.into(), delay);
        self
    }

    /// Fail every scan of `namespace`.
    pub fn break_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.broken_namespaces.insert(namespace.into());
        self
    }

    /// Number of `append` calls observed, successful or not.
    pub fn append_attempts(&self) -> u32 {
        self.append_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventLog for ScriptedEventLog {
    async fn append(&self, event: &Event) -> StorageResult<()> {
        self.append_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_appends.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_appends.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::Unavailable(format!(
                "scripted failure ({} left)",
                remaining - 1
            )));
        }
        self.inner.append(event).await
    }

    async fn get(&self, event_id: &EventId) -> StorageResult<Event> {
        self.inner.get(event_id).await
    }

    async fn scan_namespace(
        &self,
        namespace: &str,
        filter: &EventFilter,
        limit: usize,
    ) -> StorageResult<Vec<Event>> {
        if let Some(delay) = self.scan_delays.get(namespace) {
            tokio::time::sleep(*delay).await;
        }
        if self.broken_namespaces.contains(namespace) {
            return Err(StorageError::Backend(format!("scan of {namespace} failed")));
        }
        self.inner.scan_namespace(namespace, filter, limit).await
    }

    async fn scan_older_than(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<Event>> {
        self.inner.scan_older_than(cutoff, limit).await
    }

    async fn remove(&self, event_ids: &[EventId]) -> StorageResult<usize> {
        self.inner.remove(event_ids).await
    }

    async fn count(&self) -> StorageResult<usize> {
        self.inner.count().await
    }
}
