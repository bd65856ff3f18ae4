//! Static configuration, loaded once at startup.
//!
//! ```toml
//! [[strategies]]
//! strategy_id = "user_preferences"
//! kind = "PREFERENCE"
//! namespace_template = "/sre/users/{actor_id}/preferences"
//! retention_days = 90
//! confidence_floor = 0.5
//!
//! [retry]
//! max_retries = 3
//!
//! [retrieval]
//! timeout_ms = 2000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{MemoryError, Result, Strategy, StrategyKind};
use crate::memory::registry::StrategyRegistry;
use crate::retry::RetryPolicy;

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV: &str = "AGENTMEM_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyConfig {
    pub strategy_id: String,
    pub kind: StrategyKind,
    pub namespace_template: String,
    pub retention_days: u32,
    #[serde(default)]
    pub confidence_floor: f64,
}

impl StrategyConfig {
    pub fn to_strategy(&self) -> Result<Strategy> {
        Strategy::new(
            self.strategy_id.clone(),
            self.kind,
            &self.namespace_template,
            chrono::Duration::days(i64::from(self.retention_days)),
            self.confidence_floor,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Per-call time budget (milliseconds).
    pub timeout_ms: u64,
    pub default_max_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            default_max_results: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Fence labels that mark a knowledge block.
    pub block_labels: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            block_labels: vec!["knowledge".into(), "memory".into()],
        }
    }
}

/// Identity used by tool calls that write on behalf of the system rather
/// than a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub system_actor_id: String,
    pub system_session_id: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            system_actor_id: "sre-agent".into(),
            system_session_id: "infrastructure".into(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryConfig {
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyConfig>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

fn default_strategies() -> Vec<StrategyConfig> {
    vec![
        StrategyConfig {
            strategy_id: "user_preferences".into(),
            kind: StrategyKind::Preference,
            namespace_template: "/sre/users/{actor_id}/preferences".into(),
            retention_days: 90,
            confidence_floor: 0.5,
        },
        StrategyConfig {
            strategy_id: "infrastructure_knowledge".into(),
            kind: StrategyKind::Knowledge,
            namespace_template: "/sre/infrastructure/{strategy_id}".into(),
            retention_days: 30,
            confidence_floor: 0.7,
        },
        StrategyConfig {
            strategy_id: "investigation_summaries".into(),
            kind: StrategyKind::Summary,
            namespace_template: "/sre/investigations/{actor_id}".into(),
            retention_days: 60,
            confidence_floor: 0.0,
        },
    ]
}

impl Default for MemoryConfig {
    /// The SRE assistant's three stores.
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            retry: RetryPolicy::default(),
            retrieval: RetrievalConfig::default(),
            extraction: ExtractionConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl MemoryConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: MemoryConfig =
            toml::from_str(text).map_err(|e| MemoryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!(
            path = %path.display(),
            strategies = config.strategies.len(),
            "loaded memory config"
        );
        Ok(config)
    }

    /// Load from `AGENTMEM_CONFIG` when set, else the built-in defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(path),
            _ => {
                debug!("{CONFIG_ENV} not set, using default strategies");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.extraction.block_labels.iter().all(|l| l.trim().is_empty()) {
            return Err(MemoryError::Config(
                "extraction.block_labels must name at least one label".into(),
            ));
        }
        if self.retrieval.timeout_ms == 0 {
            return Err(MemoryError::Config("retrieval.timeout_ms must be > 0".into()));
        }
        self.build_registry().map(|_| ())
    }

    /// Build the strategy registry, validating every entry.
    pub fn build_registry(&self) -> Result<StrategyRegistry> {
        let strategies = self
            .strategies
            .iter()
            .map(StrategyConfig::to_strategy)
            .collect::<Result<Vec<_>>>()?;
        StrategyRegistry::new(strategies)
    }

    pub fn retrieval_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retrieval.timeout_ms)
    }
}
