use std::sync::Arc;

use agentmem_core::{
    EventLog, ManualClock, MemoryConfig, MemoryService, StrategyConfig, StrategyKind,
};
use agentmem_state::fakes::MemoryEventLog;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

fn attrs(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

#[tokio::test]
async fn preference_expires_exactly_at_retention() {
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let svc = MemoryService::with_clock(
        Arc::new(MemoryEventLog::new()),
        &MemoryConfig::default(),
        clock.clone(),
    )
    .unwrap();
    svc.save_preference("alice", attrs(json!({"pager": "on"})))
        .await
        .unwrap();

    let retention = Duration::days(90);
    let cases = [
        (retention - Duration::seconds(1), 1),
        (retention, 0),
        (retention + Duration::seconds(1), 0),
    ];
    for (offset, expected) in cases {
        clock.set(start + offset);
        let result = svc
            .retrieve_memory(Some(StrategyKind::Preference), "", "alice", None, None)
            .await;
        assert_eq!(result.len(), expected, "at T+{offset}");
    }
}

fn split_retention_config() -> MemoryConfig {
    MemoryConfig {
        strategies: vec![
            StrategyConfig {
                strategy_id: "kb_short".into(),
                kind: StrategyKind::Knowledge,
                namespace_template: "/kb/{actor_id}/short".into(),
                retention_days: 1,
                confidence_floor: 0.0,
            },
            StrategyConfig {
                strategy_id: "kb_long".into(),
                kind: StrategyKind::Knowledge,
                namespace_template: "/kb/{actor_id}/long".into(),
                retention_days: 10,
                confidence_floor: 0.0,
            },
        ],
        ..MemoryConfig::default()
    }
}

#[tokio::test]
async fn retention_is_evaluated_per_namespace() {
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let svc = MemoryService::with_clock(
        Arc::new(MemoryEventLog::new()),
        &split_retention_config(),
        clock.clone(),
    )
    .unwrap();
    svc.create_event(
        "alice",
        "s1",
        json!({"subject": "vpn", "kind": "KNOWLEDGE", "attributes": {"gw": "10.0.0.1"}, "confidence": 0.8}),
    )
    .await
    .unwrap();

    let fresh = svc
        .retrieve_memory(Some(StrategyKind::Knowledge), "vpn", "alice", None, None)
        .await;
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh.records[0].strategy_id, "kb_short");

    clock.set(start + Duration::days(2));
    let later = svc
        .retrieve_memory(Some(StrategyKind::Knowledge), "vpn", "alice", None, None)
        .await;
    assert_eq!(later.len(), 1);
    assert_eq!(later.records[0].strategy_id, "kb_long");
    assert_eq!(later.sources.get("kb_short"), None);

    clock.set(start + Duration::days(10));
    let gone = svc
        .retrieve_memory(Some(StrategyKind::Knowledge), "vpn", "alice", None, None)
        .await;
    assert!(gone.is_empty());
}

#[tokio::test]
async fn sweep_never_changes_query_answers() {
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let log = Arc::new(MemoryEventLog::new());
    let svc =
        MemoryService::with_clock(log.clone(), &split_retention_config(), clock.clone()).unwrap();
    svc.create_event(
        "alice",
        "s1",
        json!({"subject": "vpn", "kind": "KNOWLEDGE", "attributes": {}, "confidence": 0.8}),
    )
    .await
    .unwrap();

    clock.set(start + Duration::days(2));
    let before = svc.retrieve_memory(None, "", "alice", None, None).await;
    let report = svc.sweeper().sweep_once().await.unwrap();
    assert_eq!(report.removed, 0);
    let after = svc.retrieve_memory(None, "", "alice", None, None).await;
    assert_eq!(before, after);

    clock.set(start + Duration::days(11));
    let report = svc.sweeper().sweep_once().await.unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(log.count().await.unwrap(), 0);
}

fn overlapping_shapes_config() -> MemoryConfig {
    MemoryConfig {
        strategies: vec![
            StrategyConfig {
                strategy_id: "by_actor".into(),
                kind: StrategyKind::Summary,
                namespace_template: "/mem/{actor_id}".into(),
                retention_days: 1,
                confidence_floor: 0.0,
            },
            StrategyConfig {
                strategy_id: "by_session".into(),
                kind: StrategyKind::Summary,
                namespace_template: "/mem/{session_id}".into(),
                retention_days: 30,
                confidence_floor: 0.0,
            },
        ],
        ..MemoryConfig::default()
    }
}

#[tokio::test]
async fn sweep_keeps_events_a_longer_overlapping_strategy_still_serves() {
    let start = Utc::now();
    let clock = Arc::new(ManualClock::new(start));
    let log = Arc::new(MemoryEventLog::new());
    let svc = MemoryService::with_clock(log.clone(), &overlapping_shapes_config(), clock.clone())
        .unwrap();
    svc.save_investigation("alice", "inc-1", "disk pressure on worker-3")
        .await
        .unwrap();

    clock.set(start + Duration::days(2));
    let before = svc
        .retrieve_memory(Some(StrategyKind::Summary), "", "alice", None, Some("inc-1"))
        .await;
    assert_eq!(before.len(), 1);
    assert_eq!(before.records[0].strategy_id, "by_session");

    let report = svc.sweeper().sweep_once().await.unwrap();
    assert_eq!(report.removed, 0);
    let after = svc
        .retrieve_memory(Some(StrategyKind::Summary), "", "alice", None, Some("inc-1"))
        .await;
    assert_eq!(before, after);
    assert_eq!(log.count().await.unwrap(), 1);

    clock.set(start + Duration::days(30));
    let report = svc.sweeper().sweep_once().await.unwrap();
    assert_eq!(report.removed, 1);
}
