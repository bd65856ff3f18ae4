//! Knowledge records and retrieval results.

use std::collections::BTreeMap;

use agentmem_state::EventId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::strategy::StrategyKind;

/// A typed, confidence-scored fact extracted from agent output.
///
/// This is also the payload shape of knowledge-record events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub subject: String,
    pub kind: StrategyKind,
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub confidence: f64,
    #[serde(default)]
    pub source_context: String,
}

impl KnowledgeRecord {
    pub fn new(
        subject: impl Into<String>,
        kind: StrategyKind,
        attributes: serde_json::Map<String, serde_json::Value>,
        confidence: f64,
    ) -> Self {
        Self {
            subject: subject.into(),
            kind,
            attributes,
            confidence,
            source_context: String::new(),
        }
    }

    pub fn with_source_context(mut self, context: impl Into<String>) -> Self {
        self.source_context = context.into();
        self
    }

    /// Check field-level invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.subject.trim().is_empty() {
            return Err("subject must not be empty".into());
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }
        Ok(())
    }

    /// Whether a payload has the outline of a knowledge record, valid or not.
    pub fn looks_like_record(payload: &serde_json::Value) -> bool {
        payload
            .as_object()
            .map(|o| o.contains_key("subject") && o.contains_key("kind"))
            .unwrap_or(false)
    }

    /// Decode and validate a record from an event payload.
    pub fn from_payload(payload: &serde_json::Value) -> Result<Self, String> {
        let record: KnowledgeRecord =
            serde_json::from_value(payload.clone()).map_err(|e| e.to_string())?;
        record.validate()?;
        Ok(record)
    }

    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Content digest over `(kind, subject, attributes)`, used to collapse
    /// the same fact stored more than once.
    pub fn digest(&self) -> String {
        let canonical = serde_json::json!({
            "kind": self.kind,
            "subject": self.subject.trim().to_lowercase(),
            "attributes": self.attributes,
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A record as returned by retrieval, with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRecord {
    pub record: KnowledgeRecord,
    pub event_id: EventId,
    pub strategy_id: String,
    pub namespace: String,
    pub recorded_at: DateTime<Utc>,
}

/// The merged answer of one retrieval call. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub records: Vec<RankedRecord>,
    /// How many returned records came from each strategy.
    pub sources: BTreeMap<String, usize>,
    /// Set when the call hit its time budget, was cancelled, or lost a
    /// namespace to a storage error.
    pub truncated: bool,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over the bare records in rank order.
    pub fn knowledge(&self) -> impl Iterator<Item = &KnowledgeRecord> {
        self.records.iter().map(|r| &r.record)
    }

    /// Render the records as a markdown section for a planner prompt.
    pub fn render_context(&self) -> String {
        if self.records.is_empty() {
            return String::from("## Memory\n(no relevant memories)");
        }
        let mut out = String::from("## Memory\n");
        for r in &self.records {
            let attrs = serde_json::Value::Object(r.record.attributes.clone());
            out.push_str(&format!(
                "- [{}] {} (confidence {:.2}, from {}): {}\n",
                r.record.kind, r.record.subject, r.record.confidence, r.strategy_id, attrs
            ));
        }
        out.truncate(out.trim_end().len());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(v: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn from_payload_accepts_minimal_record() {
        let payload = json!({
            "subject": "escalation",
            "kind": "PREFERENCE",
            "attributes": {"contact": "ops@x.com"},
            "confidence": 0.9
        });
        let r = KnowledgeRecord::from_payload(&payload).unwrap();
        assert_eq!(r.kind, StrategyKind::Preference);
        assert_eq!(r.attributes["contact"], "ops@x.com");
        assert_eq!(r.source_context, "");
    }

    #[test]
    fn from_payload_rejects_out_of_range_confidence() {
        let payload = json!({
            "subject": "s", "kind": "KNOWLEDGE", "attributes": {}, "confidence": 1.5
        });
        assert!(KnowledgeRecord::from_payload(&payload).is_err());
        assert!(KnowledgeRecord::looks_like_record(&payload));
    }

    #[test]
    fn looks_like_record_ignores_other_payloads() {
        assert!(!KnowledgeRecord::looks_like_record(&json!({"role": "user"})));
        assert!(!KnowledgeRecord::looks_like_record(&json!("text")));
    }

    #[test]
    fn digest_ignores_confidence_and_subject_case() {
        let a = KnowledgeRecord::new(
            "Escalation",
            StrategyKind::Preference,
            attrs(json!({"contact": "a"})),
            0.9,
        );
        let b = KnowledgeRecord::new(
            "escalation",
            StrategyKind::Preference,
            attrs(json!({"contact": "a"})),
            0.6,
        );
        let c = KnowledgeRecord::new(
            "escalation",
            StrategyKind::Preference,
            attrs(json!({"contact": "b"})),
            0.9,
        );
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn render_context_lists_records() {
        let result = QueryResult {
            records: vec![RankedRecord {
                record: KnowledgeRecord::new(
                    "escalation",
                    StrategyKind::Preference,
                    attrs(json!({"contact": "ops@x.com"})),
                    0.9,
                ),
                event_id: EventId("e1".into()),
                strategy_id: "prefs".into(),
                namespace: "/users/alice/preferences".into(),
                recorded_at: Utc::now(),
            }],
            sources: BTreeMap::from([("prefs".to_string(), 1)]),
            truncated: false,
        };
        let text = result.render_context();
        assert!(text.contains("[PREFERENCE] escalation"));
        assert!(text.contains("ops@x.com"));
        assert!(QueryResult::empty()
            .render_context()
            .contains("no relevant memories"));
    }
}
