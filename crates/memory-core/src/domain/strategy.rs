//! Strategy definitions.
//!
//! A strategy is one logical memory store: a kind of knowledge, the namespace
//! template events are routed under, how long they stay visible there, and
//! the minimum confidence a record needs to be kept.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::error::{MemoryError, Result};
use crate::memory::namespace::NamespaceTemplate;

/// What a strategy stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyKind {
    #[serde(alias = "preference")]
    Preference,
    #[serde(alias = "knowledge")]
    Knowledge,
    #[serde(alias = "summary")]
    Summary,
}

/// Broad classification used when presenting context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyClass {
    /// Discrete facts (preferences, infrastructure knowledge).
    Semantic,
    /// Condensed narratives of past sessions.
    Summary,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::Preference,
        StrategyKind::Knowledge,
        StrategyKind::Summary,
    ];

    pub fn class(&self) -> StrategyClass {
        match self {
            StrategyKind::Preference | StrategyKind::Knowledge => StrategyClass::Semantic,
            StrategyKind::Summary => StrategyClass::Summary,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Preference => "PREFERENCE",
            StrategyKind::Knowledge => "KNOWLEDGE",
            StrategyKind::Summary => "SUMMARY",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PREFERENCE" | "PREFERENCES" => Ok(StrategyKind::Preference),
            "KNOWLEDGE" | "INFRASTRUCTURE" => Ok(StrategyKind::Knowledge),
            "SUMMARY" | "SUMMARIES" | "INVESTIGATION" => Ok(StrategyKind::Summary),
            other => Err(format!("unknown strategy kind: {other}")),
        }
    }
}

/// A configured memory store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Strategy {
    pub strategy_id: String,
    pub kind: StrategyKind,
    pub template: NamespaceTemplate,
    #[serde(with = "retention_secs")]
    pub retention: Duration,
    pub confidence_floor: f64,
}

impl Strategy {
    /// Build and validate a strategy. The template is parsed here, so a bad
    /// template fails at load time rather than at first use.
    pub fn new(
        strategy_id: impl Into<String>,
        kind: StrategyKind,
        template: &str,
        retention: Duration,
        confidence_floor: f64,
    ) -> Result<Self> {
        let strategy_id = strategy_id.into();
        let invalid = |reason: String| MemoryError::InvalidStrategy {
            strategy_id: strategy_id.clone(),
            reason,
        };

        if strategy_id.trim().is_empty() {
            return Err(invalid("strategy_id must not be empty".into()));
        }
        if strategy_id.contains(['/', '{', '}']) {
            return Err(invalid(
                "strategy_id must not contain '/', '{' or '}'".into(),
            ));
        }
        if retention <= Duration::zero() {
            return Err(invalid("retention must be positive".into()));
        }
        if !(0.0..=1.0).contains(&confidence_floor) {
            return Err(invalid(format!(
                "confidence_floor {confidence_floor} outside [0, 1]"
            )));
        }
        let template = NamespaceTemplate::parse(template).map_err(invalid)?;

        Ok(Self {
            strategy_id,
            kind,
            template,
            retention,
            confidence_floor,
        })
    }

    pub fn class(&self) -> StrategyClass {
        self.kind.class()
    }

    /// A record is kept only when its confidence strictly exceeds the floor.
    pub fn admits(&self, confidence: f64) -> bool {
        confidence > self.confidence_floor
    }
}

mod retention_secs {
    use chrono::Duration;
    use serde::Serializer;

    pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(d.num_seconds())
    }
}
