//! Namespace-routed memory: resolution, routing, extraction, retrieval and
//! retention.

pub mod extraction;
pub mod namespace;
pub mod registry;
pub mod retention;
pub mod retrieval;
pub mod store;

pub use extraction::{
    ExtractionContext, ExtractionDiagnostic, ExtractionReport, ParsedBlock, PatternExtractor,
};
pub use namespace::{
    matches, resolve, Namespace, NamespaceTemplate, ResolutionContext, TemplateSegment,
};
pub use registry::StrategyRegistry;
pub use retention::{expired_everywhere, RetentionSweeper, SweepReport};
pub use retrieval::{sub_limit, RetrievalEngine, RetrievalRequest};
pub use store::EventStore;
