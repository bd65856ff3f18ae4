//! Routing event store over an [`EventLog`].
//!
//! Writes resolve every applicable strategy for the writer's context and tag
//! the event with the resulting namespaces. Reads are scoped to a single
//! namespace and filtered by the owning strategy's retention.

use std::collections::BTreeSet;
use std::sync::Arc;

use agentmem_state::{Event, EventFilter, EventLog, PayloadKind};
use tracing::{debug, instrument};

use super::namespace::{resolve, ResolutionContext};
use super::registry::StrategyRegistry;
use crate::clock::{Clock, SystemClock};
use crate::domain::{KnowledgeRecord, MemoryError, Result, Strategy};
use crate::metrics::METRICS;
use crate::obs;
use crate::retry::{retry_with_backoff, RetryPolicy};

pub struct EventStore {
    log: Arc<dyn EventLog>,
    registry: Arc<StrategyRegistry>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl EventStore {
    pub fn new(log: Arc<dyn EventLog>, registry: Arc<StrategyRegistry>) -> Self {
        Self {
            log,
            registry,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    pub fn log(&self) -> &Arc<dyn EventLog> {
        &self.log
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Compute the namespaces a payload belongs to for this context.
    ///
    /// Raw and conversation payloads go to every strategy. A knowledge record
    /// goes to strategies of its kind whose floor it strictly exceeds.
    pub fn route(
        &self,
        actor_id: &str,
        session_id: &str,
        payload: &serde_json::Value,
        payload_kind: PayloadKind,
    ) -> Result<BTreeSet<String>> {
        let targets: Vec<&Strategy> = match payload_kind {
            PayloadKind::KnowledgeRecord => {
                let record =
                    KnowledgeRecord::from_payload(payload).map_err(MemoryError::InvalidRecord)?;
                let targets: Vec<_> = self
                    .registry
                    .strategies_for_kind(record.kind)
                    .filter(|s| s.admits(record.confidence))
                    .collect();
                if targets.is_empty() {
                    return Err(MemoryError::Unroutable {
                        kind: record.kind,
                        confidence: record.confidence,
                    });
                }
                targets
            }
            PayloadKind::Conversation | PayloadKind::Raw => {
                self.registry.all_strategies().iter().collect()
            }
        };

        let session = (!session_id.is_empty()).then_some(session_id);
        let ctx = ResolutionContext::new(actor_id, session);
        targets
            .into_iter()
            .map(|s| resolve(s, &ctx).map(|ns| ns.into_string()))
            .collect::<std::result::Result<BTreeSet<_>, _>>()
            .map_err(MemoryError::from)
    }

    /// Append a payload, classifying it first. Objects carrying `subject` and
    /// `kind` must be valid knowledge records; anything else is stored raw.
    pub async fn append(
        &self,
        actor_id: &str,
        session_id: &str,
        payload: serde_json::Value,
    ) -> Result<Event> {
        let kind = if KnowledgeRecord::looks_like_record(&payload) {
            PayloadKind::KnowledgeRecord
        } else {
            PayloadKind::Raw
        };
        self.append_with_kind(actor_id, session_id, payload, kind)
            .await
    }

    #[instrument(skip(self, payload, payload_kind), fields(kind = payload_kind.as_str()))]
    pub async fn append_with_kind(
        &self,
        actor_id: &str,
        session_id: &str,
        payload: serde_json::Value,
        payload_kind: PayloadKind,
    ) -> Result<Event> {
        let namespaces = self.route(actor_id, session_id, &payload, payload_kind)?;
        let event = Event::new(
            actor_id,
            session_id,
            self.clock.now(),
            payload,
            payload_kind,
            namespaces,
        );

        retry_with_backoff(&self.retry, "append", || self.log.append(&event)).await?;

        METRICS.inc_events_appended();
        obs::emit_event_appended(
            event.event_id.as_str(),
            actor_id,
            payload_kind.as_str(),
            event.matched_namespaces.len(),
        );
        Ok(event)
    }

    /// Live events tagged with `namespace`, newest first. An event stays
    /// live for the longest retention of any strategy that can produce the
    /// namespace. Unowned namespaces are empty.
    pub async fn query(
        &self,
        namespace: &str,
        filter: &EventFilter,
        limit: usize,
    ) -> Result<Vec<Event>> {
        match self.registry.retention_for(namespace) {
            Some(retention) => self.scan_live(namespace, retention, filter, limit).await,
            None => {
                debug!(namespace, "no strategy owns namespace");
                Ok(Vec::new())
            }
        }
    }

    /// Query `namespace` as resolved for `strategy`, under that strategy's
    /// retention.
    pub async fn query_strategy(
        &self,
        strategy: &Strategy,
        namespace: &str,
        filter: &EventFilter,
        limit: usize,
    ) -> Result<Vec<Event>> {
        self.scan_live(namespace, strategy.retention, filter, limit)
            .await
    }

    async fn scan_live(
        &self,
        namespace: &str,
        retention: chrono::Duration,
        filter: &EventFilter,
        limit: usize,
    ) -> Result<Vec<Event>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let cutoff = self.clock.now() - retention;
        let filter = filter.clone().clamp_newer_than(cutoff);
        Ok(self.log.scan_namespace(namespace, &filter, limit).await?)
    }
}
