//! agentmem core library
//!
//! Long-term memory for a multi-agent SRE assistant. Agents emit events;
//! each event is routed to the namespaces of every strategy it belongs to.
//! Planners read merged, ranked knowledge back through [`MemoryService`].

pub mod clock;
pub mod config;
pub mod domain;
pub mod memory;
pub mod metrics;
pub mod obs;
pub mod retry;
pub mod service;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ExtractionConfig, MemoryConfig, RetrievalConfig, ServiceConfig, StrategyConfig, CONFIG_ENV,
};
pub use domain::{
    KnowledgeRecord, MemoryError, QueryResult, RankedRecord, ResolutionError, Result, Strategy,
    StrategyClass, StrategyKind,
};
pub use memory::{
    EventStore, ExtractionContext, ExtractionDiagnostic, ExtractionReport, Namespace,
    NamespaceTemplate, ParsedBlock, PatternExtractor, ResolutionContext, RetentionSweeper,
    RetrievalEngine, RetrievalRequest, StrategyRegistry, SweepReport, TemplateSegment,
};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use service::MemoryService;

pub use agentmem_state::{
    Event, EventFilter, EventId, EventLog, PayloadKind, StorageError, SurrealEventLog,
};
