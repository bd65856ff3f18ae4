//! Fan-out retrieval across strategies, with merge, dedup and ranking.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentmem_state::{Event, EventFilter};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use super::namespace::{resolve, Namespace, ResolutionContext};
use super::store::EventStore;
use crate::domain::{KnowledgeRecord, QueryResult, RankedRecord, Result, Strategy, StrategyKind};
use crate::metrics::METRICS;
use crate::obs;

/// One retrieval call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub actor_id: String,
    pub session_id: Option<String>,
    pub kind: Option<StrategyKind>,
    /// Whitespace-separated terms; empty means "everything".
    pub query: String,
    pub max_results: usize,
}

impl RetrievalRequest {
    pub fn new(actor_id: impl Into<String>, max_results: usize) -> Self {
        Self {
            actor_id: actor_id.into(),
            session_id: None,
            kind: None,
            query: String::new(),
            max_results,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_kind(mut self, kind: StrategyKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }
}

/// Per-namespace fetch budget: `ceil(max_results / n)`.
pub fn sub_limit(max_results: usize, namespaces: usize) -> usize {
    if namespaces == 0 {
        return 0;
    }
    max_results.div_ceil(namespaces)
}

pub struct RetrievalEngine {
    store: Arc<EventStore>,
    timeout: Duration,
}

impl RetrievalEngine {
    pub fn new(store: Arc<EventStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<QueryResult> {
        self.retrieve_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Query every selected namespace concurrently and merge what arrives
    /// before the deadline or cancellation. Late namespaces are dropped and
    /// the result is marked truncated.
    pub async fn retrieve_with_cancel(
        &self,
        request: &RetrievalRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let span = obs::retrieval_span(&request.actor_id, request.kind.map(|k| k.as_str()));
        self.fan_out(request, cancel).instrument(span).await
    }

    async fn fan_out(
        &self,
        request: &RetrievalRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let started = Instant::now();

        if request.max_results == 0 {
            return Ok(QueryResult::empty());
        }

        let registry = self.store.registry();
        let ctx = ResolutionContext::new(&request.actor_id, request.session_id.as_deref());
        let mut targets: Vec<(&Strategy, Namespace)> = Vec::new();
        for strategy in registry.select(request.kind) {
            match resolve(strategy, &ctx) {
                Ok(ns) => targets.push((strategy, ns)),
                Err(e) if request.kind.is_some() => return Err(e.into()),
                Err(e) => debug!(strategy = %strategy.strategy_id, error = %e, "skipping strategy"),
            }
        }
        if targets.is_empty() {
            return Ok(QueryResult::empty());
        }

        let limit = sub_limit(request.max_results, targets.len());
        let filter = EventFilter::new()
            .records_only()
            .with_terms(request.query.split_whitespace());

        let mut slots: Vec<Option<Vec<Event>>> = (0..targets.len()).map(|_| None).collect();
        let mut truncated = false;
        {
            let store = &self.store;
            let filter = &filter;
            let mut pending: FuturesUnordered<_> = targets
                .iter()
                .enumerate()
                .map(|(i, (strategy, ns))| async move {
                    (i, store.query_strategy(strategy, ns.as_str(), filter, limit).await)
                })
                .collect();

            let deadline = tokio::time::sleep(self.timeout);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("retrieval cancelled");
                        truncated = true;
                        break;
                    }
                    _ = &mut deadline => {
                        debug!(timeout_ms = self.timeout.as_millis() as u64, "retrieval timed out");
                        truncated = true;
                        break;
                    }
                    next = pending.next() => match next {
                        None => break,
                        Some((i, Ok(events))) => slots[i] = Some(events),
                        Some((i, Err(e))) => {
                            obs::emit_namespace_failed(targets[i].1.as_str(), &e);
                            truncated = true;
                        }
                    },
                }
            }
        }

        let mut result = merge(&targets, slots, request.max_results);
        result.truncated = truncated;

        METRICS.record_retrieval(result.truncated);
        obs::emit_retrieval_finished(
            &request.actor_id,
            targets.len(),
            result.len(),
            result.truncated,
            started.elapsed().as_millis() as u64,
        );
        Ok(result)
    }
}

/// Merge per-namespace results in strategy order, rank by confidence then
/// recency (stable), drop duplicates keeping the best-placed copy, and
/// truncate.
fn merge(
    targets: &[(&Strategy, Namespace)],
    slots: Vec<Option<Vec<Event>>>,
    max_results: usize,
) -> QueryResult {
    let mut ranked: Vec<RankedRecord> = Vec::new();
    for ((strategy, ns), events) in targets.iter().zip(slots) {
        for event in events.unwrap_or_default() {
            match KnowledgeRecord::from_payload(&event.payload) {
                Ok(record) => ranked.push(RankedRecord {
                    record,
                    event_id: event.event_id,
                    strategy_id: strategy.strategy_id.clone(),
                    namespace: ns.as_str().to_string(),
                    recorded_at: event.timestamp,
                }),
                Err(reason) => {
                    debug!(event_id = %event.event_id, %reason, "skipping undecodable record")
                }
            }
        }
    }

    ranked.sort_by(|a, b| {
        b.record
            .confidence
            .total_cmp(&a.record.confidence)
            .then_with(|| b.recorded_at.cmp(&a.recorded_at))
    });

    let mut seen_ids = HashSet::new();
    let mut seen_digests = HashSet::new();
    ranked.retain(|r| {
        let fresh_id = seen_ids.insert(r.event_id.clone());
        let fresh_digest = seen_digests.insert(r.record.digest());
        fresh_id && fresh_digest
    });
    ranked.truncate(max_results);

    let mut sources = BTreeMap::new();
    for r in &ranked {
        *sources.entry(r.strategy_id.clone()).or_insert(0) += 1;
    }

    QueryResult {
        records: ranked,
        sources,
        truncated: false,
    }
}
