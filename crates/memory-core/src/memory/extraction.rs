//! Pattern-based extraction of knowledge records from agent output.
//!
//! Agents mark structured facts with fenced blocks:
//!
//! ````text
//! ```knowledge
//! {"subject": "escalation", "kind": "PREFERENCE",
//!  "attributes": {"contact": "ops@x.com"}, "confidence": 0.9}
//! ```
//! ````
//!
//! A block holds one JSON object or an array of them. Anything that fails to
//! parse or validate becomes a diagnostic; extraction itself never fails.

use std::sync::Arc;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::registry::StrategyRegistry;
use crate::domain::{KnowledgeRecord, MemoryError, Result, StrategyKind};
use crate::metrics::METRICS;
use crate::obs;

/// Outcome of interpreting one item of agent output.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBlock {
    Valid(KnowledgeRecord),
    Malformed { reason: String },
    /// The output had no labelled block at all.
    NotFound,
}

/// Who produced the output, and which store the caller expects it to feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionContext {
    pub actor_id: String,
    pub kind_hint: Option<StrategyKind>,
}

impl ExtractionContext {
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            kind_hint: None,
        }
    }

    pub fn with_kind_hint(mut self, kind: StrategyKind) -> Self {
        self.kind_hint = Some(kind);
        self
    }
}

/// Why an item was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionDiagnostic {
    /// Zero-based index of the fenced block.
    pub block: usize,
    /// Index within a JSON array block.
    pub item: Option<usize>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionReport {
    pub records: Vec<KnowledgeRecord>,
    pub diagnostics: Vec<ExtractionDiagnostic>,
}

pub struct PatternExtractor {
    pattern: Regex,
    registry: Arc<StrategyRegistry>,
}

impl PatternExtractor {
    /// Build an extractor recognising fences labelled with any of `labels`
    /// (case-insensitive).
    pub fn new(labels: &[String], registry: Arc<StrategyRegistry>) -> Result<Self> {
        let alternatives: Vec<String> = labels
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Err(MemoryError::Config("no extraction block labels".into()));
        }
        let source = format!(
            r"(?ms)^```[ \t]*(?i:{})[ \t]*\r?\n(.*?)^```[ \t]*\r?$",
            alternatives.join("|")
        );
        let pattern = Regex::new(&source).map_err(|e| MemoryError::Config(e.to_string()))?;
        Ok(Self { pattern, registry })
    }

    /// Interpret every labelled block, item by item, in encounter order.
    pub fn scan(&self, raw_output: &str, ctx: &ExtractionContext) -> Vec<(usize, Option<usize>, ParsedBlock)> {
        let mut out = Vec::new();
        for (block, caps) in self.pattern.captures_iter(raw_output).enumerate() {
            let body = caps.get(1).map(|m| m.as_str()).unwrap_or("").trim();
            match serde_json::from_str::<Value>(body) {
                Ok(Value::Array(items)) => {
                    if items.is_empty() {
                        out.push((block, None, malformed("empty array")));
                    }
                    for (i, item) in items.iter().enumerate() {
                        out.push((block, Some(i), parse_item(item, ctx)));
                    }
                }
                Ok(item) => out.push((block, None, parse_item(&item, ctx))),
                Err(e) => out.push((block, None, malformed(format!("invalid JSON: {e}")))),
            }
        }
        if out.is_empty() {
            out.push((0, None, ParsedBlock::NotFound));
        }
        out
    }

    pub fn extract(&self, raw_output: &str, ctx: &ExtractionContext) -> Vec<KnowledgeRecord> {
        self.extract_with_diagnostics(raw_output, ctx).records
    }

    /// Extract records and explain everything that was skipped. A record
    /// survives when its confidence strictly exceeds the floor of every
    /// strategy for the hinted kind (its own kind when there is no hint).
    pub fn extract_with_diagnostics(
        &self,
        raw_output: &str,
        ctx: &ExtractionContext,
    ) -> ExtractionReport {
        let mut report = ExtractionReport::default();

        for (block, item, parsed) in self.scan(raw_output, ctx) {
            let reason = match parsed {
                ParsedBlock::NotFound => continue,
                ParsedBlock::Malformed { reason } => {
                    METRICS.inc_blocks_malformed();
                    reason
                }
                ParsedBlock::Valid(record) => {
                    let kind = ctx.kind_hint.unwrap_or(record.kind);
                    match self.registry.max_floor(kind) {
                        Some(floor) if record.confidence > floor => {
                            report.records.push(record);
                            continue;
                        }
                        Some(floor) => format!(
                            "confidence {} does not exceed {kind} floor {floor}",
                            record.confidence
                        ),
                        None => format!("no strategy stores {kind} records"),
                    }
                }
            };
            obs::emit_extraction_skipped(&ctx.actor_id, block, &reason);
            report.diagnostics.push(ExtractionDiagnostic {
                block,
                item,
                reason,
            });
        }

        METRICS.add_records_extracted(report.records.len() as u64);
        report
    }
}

fn malformed(reason: impl Into<String>) -> ParsedBlock {
    ParsedBlock::Malformed {
        reason: reason.into(),
    }
}

fn parse_item(item: &Value, ctx: &ExtractionContext) -> ParsedBlock {
    let Some(obj) = item.as_object() else {
        return malformed("expected a JSON object");
    };

    let subject = match obj.get("subject").and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => return malformed("missing or empty subject"),
    };
    let kind = match obj.get("kind").and_then(Value::as_str) {
        Some(k) => match k.parse::<StrategyKind>() {
            Ok(kind) => kind,
            Err(e) => return malformed(e),
        },
        None => return malformed("missing kind"),
    };
    let attributes = match obj.get("attributes") {
        None | Some(Value::Null) => return malformed("missing attributes"),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return malformed("attributes must be an object"),
    };
    let confidence = match obj.get("confidence").and_then(Value::as_f64) {
        Some(c) if (0.0..=1.0).contains(&c) => c,
        Some(c) => return malformed(format!("confidence {c} outside [0, 1]")),
        None => return malformed("missing or non-numeric confidence"),
    };
    let source_context = obj
        .get("source_context")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("actor:{}", ctx.actor_id));

    ParsedBlock::Valid(
        KnowledgeRecord::new(subject, kind, attributes, confidence)
            .with_source_context(source_context),
    )
}
