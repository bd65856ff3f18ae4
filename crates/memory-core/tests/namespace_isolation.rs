use std::sync::Arc;

use agentmem_core::{
    EventFilter, EventLog, MemoryConfig, MemoryError, MemoryService, ResolutionError, StrategyConfig,
    StrategyKind,
};
use agentmem_state::fakes::MemoryEventLog;
use serde_json::{json, Map, Value};

fn attrs(v: Value) -> Map<String, Value> {
    v.as_object().cloned().unwrap()
}

fn service(config: &MemoryConfig) -> MemoryService {
    MemoryService::new(Arc::new(MemoryEventLog::new()), config).unwrap()
}

#[tokio::test]
async fn actor_scoped_preferences_do_not_leak() {
    let svc = service(&MemoryConfig::default());
    svc.save_preference("alice", attrs(json!({"timezone": "UTC"})))
        .await
        .unwrap();
    svc.save_preference("bob", attrs(json!({"timezone": "PST"})))
        .await
        .unwrap();

    for (actor, tz) in [("alice", "UTC"), ("bob", "PST")] {
        let result = svc
            .retrieve_memory(Some(StrategyKind::Preference), "", actor, None, None)
            .await;
        assert_eq!(result.len(), 1, "actor {actor}");
        assert_eq!(result.records[0].record.attributes["timezone"], tz);
        assert_eq!(
            result.records[0].namespace,
            format!("/sre/users/{actor}/preferences")
        );
    }
}

#[tokio::test]
async fn shared_infrastructure_is_visible_to_everyone() {
    let svc = service(&MemoryConfig::default());
    svc.save_infrastructure(
        "payments-api",
        attrs(json!({"runbook": "https://runbooks/payments"})),
        0.9,
        "runbook import",
    )
    .await
    .unwrap();

    for actor in ["alice", "bob", "carol"] {
        let result = svc
            .retrieve_memory(Some(StrategyKind::Knowledge), "payments", actor, None, None)
            .await;
        assert_eq!(result.len(), 1, "actor {actor}");
        assert_eq!(
            result.records[0].namespace,
            "/sre/infrastructure/infrastructure_knowledge"
        );
    }
}

#[tokio::test]
async fn raw_events_are_tagged_everywhere_but_never_retrieved() {
    let svc = service(&MemoryConfig::default());
    let id = svc
        .create_event("alice", "s1", json!({"note": "checked dashboards"}))
        .await
        .unwrap();

    let event = svc.store().log().get(&id).await.unwrap();
    assert_eq!(event.matched_namespaces.len(), 3);
    assert!(event.belongs_to("/sre/users/alice/preferences"));

    let events = svc
        .store()
        .query("/sre/users/alice/preferences", &EventFilter::new(), 10)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);

    let result = svc.retrieve_memory(None, "", "alice", None, None).await;
    assert!(result.is_empty());
}

#[tokio::test]
async fn session_scoped_strategy_needs_a_session() {
    let mut config = MemoryConfig::default();
    config.strategies.push(StrategyConfig {
        strategy_id: "session_notes".into(),
        kind: StrategyKind::Summary,
        namespace_template: "/sre/sessions/{actor_id}/{session_id}".into(),
        retention_days: 7,
        confidence_floor: 0.0,
    });
    let svc = service(&config);

    svc.save_investigation("alice", "inc-7", "disk full on worker-3")
        .await
        .unwrap();

    // An explicit kind surfaces the resolution failure, which the tool API
    // turns into an empty result.
    let engine_err = svc
        .store()
        .route("alice", "", &json!({"note": "x"}), agentmem_core::PayloadKind::Raw)
        .unwrap_err();
    assert!(matches!(
        engine_err,
        MemoryError::Resolution(ResolutionError::MissingVariable { .. })
    ));
    let explicit = svc
        .retrieve_memory(Some(StrategyKind::Summary), "", "alice", None, None)
        .await;
    assert!(explicit.is_empty());

    // The all-strategies sweep skips the session-scoped store.
    let sweep = svc.retrieve_memory(None, "disk", "alice", None, None).await;
    assert_eq!(sweep.len(), 1);
    assert_eq!(sweep.records[0].strategy_id, "investigation_summaries");

    // With the session both summary stores answer with the same event.
    let scoped = svc
        .retrieve_memory(Some(StrategyKind::Summary), "disk", "alice", None, Some("inc-7"))
        .await;
    assert_eq!(scoped.len(), 1);
    assert!(!scoped.truncated);
}

#[tokio::test]
async fn actor_values_with_separators_are_rejected() {
    let svc = service(&MemoryConfig::default());
    let err = svc
        .save_preference("alice/../bob", attrs(json!({"timezone": "UTC"})))
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Resolution(_)));
}
