//! The immutable set of configured strategies.

use std::collections::HashSet;

use crate::domain::{MemoryError, Result, Strategy, StrategyKind};

/// Registry of strategies, in configuration order.
///
/// Built once at startup and shared as `Arc<StrategyRegistry>`.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    strategies: Vec<Strategy>,
}

impl StrategyRegistry {
    /// Build a registry. Rejects an empty set, duplicate ids and duplicate
    /// templates. Individual strategies are validated by [`Strategy::new`].
    pub fn new(strategies: Vec<Strategy>) -> Result<Self> {
        if strategies.is_empty() {
            return Err(MemoryError::Config(
                "at least one strategy must be configured".into(),
            ));
        }

        let mut ids = HashSet::new();
        let mut templates = HashSet::new();
        for s in &strategies {
            if !ids.insert(s.strategy_id.as_str()) {
                return Err(MemoryError::InvalidStrategy {
                    strategy_id: s.strategy_id.clone(),
                    reason: "duplicate strategy_id".into(),
                });
            }
            if !templates.insert(s.template.as_str()) {
                return Err(MemoryError::InvalidStrategy {
                    strategy_id: s.strategy_id.clone(),
                    reason: format!("namespace template {} is already in use", s.template),
                });
            }
        }

        Ok(Self { strategies })
    }

    pub fn all_strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn strategies_for_kind(&self, kind: StrategyKind) -> impl Iterator<Item = &Strategy> {
        self.strategies.iter().filter(move |s| s.kind == kind)
    }

    /// Strategies for `kind`, or every strategy when `kind` is `None`.
    pub fn select(&self, kind: Option<StrategyKind>) -> Vec<&Strategy> {
        match kind {
            Some(kind) => self.strategies_for_kind(kind).collect(),
            None => self.strategies.iter().collect(),
        }
    }

    pub fn get(&self, strategy_id: &str) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.strategy_id == strategy_id)
    }

    /// The strategy whose template produced `namespace`. First match in
    /// configuration order wins.
    pub fn owner_of(&self, namespace: &str) -> Option<&Strategy> {
        self.strategies
            .iter()
            .find(|s| s.template.matches_shape(&s.strategy_id, namespace))
    }

    /// How long events stay visible in `namespace`: the longest retention
    /// among every strategy whose template shape produces it. Templates such
    /// as `/mem/{actor_id}` and `/mem/{session_id}` can both claim a
    /// namespace, so the first owner alone is not enough.
    pub fn retention_for(&self, namespace: &str) -> Option<chrono::Duration> {
        self.strategies
            .iter()
            .filter(|s| s.template.matches_shape(&s.strategy_id, namespace))
            .map(|s| s.retention)
            .max()
    }

    /// Configuration position of a strategy; used as the merge order.
    pub fn priority(&self, strategy_id: &str) -> Option<usize> {
        self.strategies
            .iter()
            .position(|s| s.strategy_id == strategy_id)
    }

    /// Highest confidence floor among strategies of `kind`, or `None` when
    /// no strategy stores that kind.
    pub fn max_floor(&self, kind: StrategyKind) -> Option<f64> {
        self.strategies_for_kind(kind)
            .map(|s| s.confidence_floor)
            .fold(None, |acc, f| Some(acc.map_or(f, |a: f64| a.max(f))))
    }

    /// Shortest retention across all strategies.
    pub fn min_retention(&self) -> chrono::Duration {
        self.strategies
            .iter()
            .map(|s| s.retention)
            .min()
            .unwrap_or_else(chrono::Duration::zero)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
