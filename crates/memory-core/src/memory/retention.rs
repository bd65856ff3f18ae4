//! Physical cleanup of expired events.
//!
//! Retention is enforced at read time by [`EventStore`]. The sweeper only
//! reclaims space: it deletes an event once it is expired in every
//! namespace it carries, so a sweep never changes what a query returns.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentmem_state::{Event, EventId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::registry::StrategyRegistry;
use super::store::EventStore;
use crate::domain::Result;
use crate::metrics::METRICS;
use crate::obs::{self, SweepSpan};

pub const DEFAULT_BATCH_SIZE: usize = 1_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Candidate events inspected.
    pub scanned: usize,
    pub removed: usize,
}

pub struct RetentionSweeper {
    store: Arc<EventStore>,
    batch_size: usize,
}

/// True when `event` has outlived every namespace it carries. A namespace
/// keeps an event for the longest retention of any strategy whose template
/// can produce it; namespaces no strategy produces count as expired.
pub fn expired_everywhere(
    registry: &StrategyRegistry,
    event: &Event,
    now: DateTime<Utc>,
) -> bool {
    let age = now - event.timestamp;
    event
        .matched_namespaces
        .iter()
        .all(|ns| match registry.retention_for(ns) {
            Some(retention) => age >= retention,
            None => true,
        })
}

impl RetentionSweeper {
    pub fn new(store: Arc<EventStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Remove one batch of fully expired events.
    ///
    /// Candidates come from two scans: events older than the longest
    /// retention (always removable) and events older than the shortest
    /// (removable only if every namespace agrees).
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let registry = self.store.registry();
        let log = self.store.log();
        let now = self.store.clock().now();

        let longest = registry
            .all_strategies()
            .iter()
            .map(|s| s.retention)
            .max()
            .unwrap_or_else(chrono::Duration::zero);
        let mut candidates: BTreeMap<EventId, Event> = BTreeMap::new();
        for cutoff in [now - longest, now - registry.min_retention()] {
            for event in log.scan_older_than(cutoff, self.batch_size).await? {
                candidates.entry(event.event_id.clone()).or_insert(event);
            }
        }

        let doomed: Vec<EventId> = {
            let _span = SweepSpan::enter(&now.to_rfc3339());
            candidates
                .values()
                .filter(|e| expired_everywhere(registry, e, now))
                .map(|e| e.event_id.clone())
                .collect()
        };
        debug!(candidates = candidates.len(), doomed = doomed.len(), "sweep candidates");

        let removed = if doomed.is_empty() {
            0
        } else {
            log.remove(&doomed).await?
        };

        METRICS.add_events_swept(removed as u64);
        obs::emit_sweep_finished(
            candidates.len(),
            removed,
            started.elapsed().as_millis() as u64,
        );
        Ok(SweepReport {
            scanned: candidates.len(),
            removed,
        })
    }

    /// Sweep every `interval` until `cancel` fires. Failed sweeps are logged
    /// and retried on the next tick.
    pub fn spawn(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            warn!(error = %e, "retention sweep failed");
                        }
                    }
                }
            }
            debug!("retention sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{Strategy, StrategyKind};
    use agentmem_state::fakes::MemoryEventLog;
    use agentmem_state::{EventLog, PayloadKind};
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn registry() -> Arc<StrategyRegistry> {
        Arc::new(
            StrategyRegistry::new(vec![
                Strategy::new(
                    "short",
                    StrategyKind::Knowledge,
                    "/short/{actor_id}",
                    ChronoDuration::days(1),
                    0.0,
                )
                .unwrap(),
                Strategy::new(
                    "long",
                    StrategyKind::Preference,
                    "/long/{actor_id}",
                    ChronoDuration::days(10),
                    0.0,
                )
                .unwrap(),
            ])
            .unwrap(),
        )
    }

    fn event(ts: DateTime<Utc>, namespaces: &[&str]) -> Event {
        Event::new(
            "alice",
            "s1",
            ts,
            json!({"note": "x"}),
            PayloadKind::Raw,
            namespaces.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        )
    }

    #[test]
    fn expiry_requires_every_namespace() {
        let reg = registry();
        let t = Utc::now();
        let both = event(t, &["/short/alice", "/long/alice"]);
        assert!(!expired_everywhere(&reg, &both, t + ChronoDuration::days(2)));
        assert!(expired_everywhere(&reg, &both, t + ChronoDuration::days(10)));

        let orphan = event(t, &["/gone/alice"]);
        assert!(expired_everywhere(&reg, &orphan, t));
    }

    #[tokio::test]
    async fn sweep_removes_only_fully_expired() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start + ChronoDuration::days(3)));
        let log = Arc::new(MemoryEventLog::new());
        let store = Arc::new(EventStore::new(log.clone(), registry()).with_clock(clock));

        log.append(&event(start, &["/short/alice"])).await.unwrap();
        log.append(&event(start, &["/short/alice", "/long/alice"]))
            .await
            .unwrap();
        log.append(&event(start + ChronoDuration::days(3), &["/short/alice"]))
            .await
            .unwrap();

        let report = RetentionSweeper::new(store).sweep_once().await.unwrap();
        assert_eq!(report.scanned, 2);
        assert_eq!(report.removed, 1);
        assert_eq!(log.count().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sweeper_stops_on_cancel() {
        let store = Arc::new(EventStore::new(Arc::new(MemoryEventLog::new()), registry()));
        let sweeper = Arc::new(RetentionSweeper::new(store));
        let cancel = CancellationToken::new();
        let handle = sweeper.spawn(Duration::from_secs(60), cancel.clone());
        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
