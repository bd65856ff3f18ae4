//! Tool-facing API used by agents and the planner.

use std::sync::Arc;

use agentmem_state::{EventId, EventLog, PayloadKind};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{MemoryConfig, ServiceConfig};
use crate::domain::{KnowledgeRecord, MemoryError, QueryResult, Result, StrategyKind};
use crate::memory::extraction::{ExtractionContext, PatternExtractor};
use crate::memory::registry::StrategyRegistry;
use crate::memory::retention::RetentionSweeper;
use crate::memory::retrieval::{RetrievalEngine, RetrievalRequest};
use crate::memory::store::EventStore;

/// Confidence assigned to facts saved explicitly through a tool call.
const EXPLICIT_CONFIDENCE: f64 = 1.0;

pub struct MemoryService {
    store: Arc<EventStore>,
    extractor: PatternExtractor,
    retrieval: RetrievalEngine,
    identity: ServiceConfig,
    default_max_results: usize,
}

impl MemoryService {
    pub fn new(log: Arc<dyn EventLog>, config: &MemoryConfig) -> Result<Self> {
        Self::with_clock(log, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        log: Arc<dyn EventLog>,
        config: &MemoryConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let registry = Arc::new(config.build_registry()?);
        let store = Arc::new(
            EventStore::new(log, registry.clone())
                .with_clock(clock)
                .with_retry(config.retry.clone()),
        );
        let extractor = PatternExtractor::new(&config.extraction.block_labels, registry)?;
        let retrieval = RetrievalEngine::new(store.clone(), config.retrieval_timeout());
        Ok(Self {
            store,
            extractor,
            retrieval,
            identity: config.service.clone(),
            default_max_results: config.retrieval.default_max_results,
        })
    }

    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        self.store.registry()
    }

    pub fn extractor(&self) -> &PatternExtractor {
        &self.extractor
    }

    pub fn sweeper(&self) -> RetentionSweeper {
        RetentionSweeper::new(self.store.clone())
    }

    /// Ingest an arbitrary payload and return its id.
    pub async fn create_event(
        &self,
        actor_id: &str,
        session_id: &str,
        payload: Value,
    ) -> Result<EventId> {
        let event = self.store.append(actor_id, session_id, payload).await?;
        Ok(event.event_id)
    }

    /// Record one conversation turn.
    pub async fn log_conversation(
        &self,
        actor_id: &str,
        session_id: &str,
        role: &str,
        text: &str,
    ) -> Result<EventId> {
        let payload = json!({ "role": role, "text": text });
        let event = self
            .store
            .append_with_kind(actor_id, session_id, payload, PayloadKind::Conversation)
            .await?;
        Ok(event.event_id)
    }

    /// Extract records from agent output and append each one. Records no
    /// strategy accepts are skipped; any other failure aborts.
    pub async fn ingest_agent_output(
        &self,
        actor_id: &str,
        session_id: &str,
        raw_output: &str,
        kind_hint: Option<StrategyKind>,
    ) -> Result<Vec<EventId>> {
        let mut ctx = ExtractionContext::new(actor_id);
        ctx.kind_hint = kind_hint;
        let report = self.extractor.extract_with_diagnostics(raw_output, &ctx);

        let mut ids = Vec::with_capacity(report.records.len());
        for record in &report.records {
            match self
                .store
                .append_with_kind(
                    actor_id,
                    session_id,
                    record.to_payload(),
                    PayloadKind::KnowledgeRecord,
                )
                .await
            {
                Ok(event) => ids.push(event.event_id),
                Err(MemoryError::Unroutable { kind, confidence }) => {
                    warn!(subject = %record.subject, %kind, confidence, "record not routable, skipped");
                }
                Err(e) => return Err(e),
            }
        }
        info!(
            actor_id,
            extracted = report.records.len(),
            stored = ids.len(),
            skipped = report.diagnostics.len(),
            "ingested agent output"
        );
        Ok(ids)
    }

    /// Retrieve memory for a planner. Never fails: errors are logged and an
    /// empty result is returned.
    pub async fn retrieve_memory(
        &self,
        kind: Option<StrategyKind>,
        query: &str,
        actor_id: &str,
        max_results: Option<usize>,
        session_id: Option<&str>,
    ) -> QueryResult {
        self.retrieve_memory_with_cancel(
            kind,
            query,
            actor_id,
            max_results,
            session_id,
            &CancellationToken::new(),
        )
        .await
    }

    pub async fn retrieve_memory_with_cancel(
        &self,
        kind: Option<StrategyKind>,
        query: &str,
        actor_id: &str,
        max_results: Option<usize>,
        session_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> QueryResult {
        let mut request = RetrievalRequest::new(
            actor_id,
            max_results.unwrap_or(self.default_max_results),
        )
        .with_query(query);
        request.kind = kind;
        request.session_id = session_id.map(str::to_string);

        match self.retrieval.retrieve_with_cancel(&request, cancel).await {
            Ok(result) => result,
            Err(e) => {
                warn!(actor_id, error = %e, "memory retrieval failed, returning empty result");
                QueryResult::empty()
            }
        }
    }

    /// Save a user preference under the user's own namespace.
    pub async fn save_preference(
        &self,
        actor_id: &str,
        attributes: Map<String, Value>,
    ) -> Result<EventId> {
        let record = KnowledgeRecord::new(
            subject_from_attributes(&attributes, "preference"),
            StrategyKind::Preference,
            attributes,
            EXPLICIT_CONFIDENCE,
        )
        .with_source_context(format!("tool:save_preference actor:{actor_id}"));
        self.append_record(actor_id, &self.identity.system_session_id, record)
            .await
    }

    /// Save shared infrastructure knowledge, attributed to the system actor.
    pub async fn save_infrastructure(
        &self,
        subject: &str,
        attributes: Map<String, Value>,
        confidence: f64,
        context: &str,
    ) -> Result<EventId> {
        let record = KnowledgeRecord::new(subject, StrategyKind::Knowledge, attributes, confidence)
            .with_source_context(context);
        self.append_record(
            &self.identity.system_actor_id,
            &self.identity.system_session_id,
            record,
        )
        .await
    }

    /// Save the summary of an investigation session.
    pub async fn save_investigation(
        &self,
        actor_id: &str,
        session_id: &str,
        summary: &str,
    ) -> Result<EventId> {
        let mut attributes = Map::new();
        attributes.insert("summary".into(), Value::String(summary.to_string()));
        let record = KnowledgeRecord::new(
            format!("investigation {session_id}"),
            StrategyKind::Summary,
            attributes,
            EXPLICIT_CONFIDENCE,
        )
        .with_source_context(format!("session:{session_id}"));
        self.append_record(actor_id, session_id, record).await
    }

    async fn append_record(
        &self,
        actor_id: &str,
        session_id: &str,
        record: KnowledgeRecord,
    ) -> Result<EventId> {
        record.validate().map_err(MemoryError::InvalidRecord)?;
        let event = self
            .store
            .append_with_kind(
                actor_id,
                session_id,
                record.to_payload(),
                PayloadKind::KnowledgeRecord,
            )
            .await?;
        Ok(event.event_id)
    }
}

/// Preference subject: an explicit `subject` attribute, else the sorted
/// attribute names.
fn subject_from_attributes(attributes: &Map<String, Value>, fallback: &str) -> String {
    if let Some(Value::String(s)) = attributes.get("subject") {
        if !s.trim().is_empty() {
            return s.trim().to_string();
        }
    }
    let mut keys: Vec<&str> = attributes.keys().map(String::as_str).collect();
    keys.sort_unstable();
    if keys.is_empty() {
        fallback.to_string()
    } else {
        keys.join(",")
    }
}
