//! Structured observability hooks for memory lifecycle events.
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`). Pass
//! `--json` to the CLI for newline-delimited JSON.

use tracing::{info, warn};

/// Span covering one retrieval call. Attach it with
/// `tracing::Instrument` so it follows the future across await points.
///
/// ```ignore
/// fut.instrument(retrieval_span("alice", Some("PREFERENCE"))).await
/// ```
pub fn retrieval_span(actor_id: &str, kind: Option<&str>) -> tracing::Span {
    tracing::info_span!(
        "agentmem.retrieve",
        actor_id = %actor_id,
        kind = kind.unwrap_or("*"),
    )
}

/// RAII guard that enters a sweep-scoped span for a synchronous section.
pub struct SweepSpan {
    _span: tracing::span::EnteredSpan,
}

impl SweepSpan {
    pub fn enter(cutoff: &str) -> Self {
        let span = tracing::info_span!("agentmem.sweep", cutoff = %cutoff);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: an event was durably appended under `namespaces` namespaces.
pub fn emit_event_appended(event_id: &str, actor_id: &str, payload_kind: &str, namespaces: usize) {
    info!(
        event = "memory.event_appended",
        event_id = %event_id,
        actor_id = %actor_id,
        payload_kind = %payload_kind,
        namespaces = namespaces,
    );
}

/// Emit event: a transient storage failure is being retried (warning level).
pub fn emit_append_retry(operation: &str, attempt: u32, delay_ms: u64, error: &dyn std::fmt::Display) {
    warn!(
        event = "memory.append_retry",
        operation = %operation,
        attempt = attempt,
        delay_ms = delay_ms,
        error = %error,
    );
}

/// Emit event: retrieval finished.
pub fn emit_retrieval_finished(
    actor_id: &str,
    namespaces: usize,
    returned: usize,
    truncated: bool,
    duration_ms: u64,
) {
    info!(
        event = "memory.retrieval_finished",
        actor_id = %actor_id,
        namespaces = namespaces,
        returned = returned,
        truncated = truncated,
        duration_ms = duration_ms,
    );
}

/// Emit event: one namespace could not be read during retrieval (warning level).
pub fn emit_namespace_failed(namespace: &str, error: &dyn std::fmt::Display) {
    warn!(event = "memory.namespace_failed", namespace = %namespace, error = %error);
}

/// Emit event: an extraction block or record was skipped.
pub fn emit_extraction_skipped(actor_id: &str, block: usize, reason: &str) {
    info!(
        event = "memory.extraction_skipped",
        actor_id = %actor_id,
        block = block,
        reason = %reason,
    );
}

/// Emit event: retention sweep finished.
pub fn emit_sweep_finished(scanned: usize, removed: usize, duration_ms: u64) {
    info!(
        event = "memory.sweep_finished",
        scanned = scanned,
        removed = removed,
        duration_ms = duration_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_create() {
        let span = retrieval_span("alice", None);
        let _entered = span.enter();
        let _sweep = SweepSpan::enter("2026-01-01T00:00:00Z");
    }
}
