//! Connections for the durable memory store.
//!
//! Tests use `mem://`, a single host keeps events under `.agentmem/db`,
//! and agents spread across hosts share a hosted SurrealDB. The
//! `memory_events` schema is in place before any client is handed out.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::Result;

const DEFAULT_NAMESPACE: &str = "agentmem";
const DEFAULT_DATABASE: &str = "main";

/// Default location for local persistence when nothing else is configured.
pub const DEFAULT_LOCAL_PATH: &str = ".agentmem/db";

/// Env var holding the websocket endpoint of a hosted memory store.
pub const ENDPOINT_ENV: &str = "AGENTMEM_SURREAL_ENDPOINT";
/// Env var holding a plain connection URL (`mem://`, `surrealkv://...`, `ws://...`).
pub const URL_ENV: &str = "AGENTMEM_SURREAL_URL";

/// Credentials for a hosted SurrealDB that several agent hosts share.
///
/// Agents on different machines point at the same endpoint so that
/// an investigation saved by one can be retrieved by another.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// SurrealDB namespace; unrelated to memory namespaces like `/sre/...`.
    pub namespace: String,
    pub database: String,
    /// Sign in as root instead of as a database user.
    pub is_root: bool,
}

impl CloudConfig {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Read the hosted-store settings from the process environment.
    ///
    /// `AGENTMEM_SURREAL_ENDPOINT`, `_USERNAME` and `_PASSWORD` must all be
    /// set. `_NAMESPACE`, `_DATABASE` and `_ROOT` fall back to
    /// `agentmem`, `main` and `false`.
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> std::result::Result<Self, String> {
        let required = |key: &str| lookup(key).ok_or_else(|| format!("{key} not set"));
        let endpoint = required(ENDPOINT_ENV)?;
        let username = required("AGENTMEM_SURREAL_USERNAME")?;
        let password = required("AGENTMEM_SURREAL_PASSWORD")?;

        let mut config = Self::new(endpoint, username, password);
        if let Some(ns) = lookup("AGENTMEM_SURREAL_NAMESPACE") {
            config = config.with_namespace(ns);
        }
        if let Some(db) = lookup("AGENTMEM_SURREAL_DATABASE") {
            config = config.with_database(db);
        }
        let is_root = lookup("AGENTMEM_SURREAL_ROOT")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(config.with_root(is_root))
    }
}

/// Connect to any URL understood by `surrealdb::engine::any`
/// (`mem://`, `surrealkv://path`, `ws://host`, ...).
#[instrument(skip_all, fields(url = %url))]
pub(crate) async fn connect_url(url: &str) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

    db.use_ns(DEFAULT_NAMESPACE)
        .use_db(DEFAULT_DATABASE)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    Ok(db)
}

/// Connect to SurrealDB Cloud with credentials.
#[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
pub(crate) async fn connect_cloud(config: &CloudConfig) -> Result<Surreal<Any>> {
    info!("Connecting to SurrealDB Cloud (root={})", config.is_root);

    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Database authentication failed: {}", e)))?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to select namespace/database: {}", e))
        })?;

    migrations::init_schema(&db).await?;
    Ok(db)
}

/// Pick the memory store for this process.
///
/// A complete hosted config wins, then [`URL_ENV`], then a local
/// surrealkv store under [`DEFAULT_LOCAL_PATH`].
#[instrument(skip_all)]
pub(crate) async fn connect_from_env() -> Result<Surreal<Any>> {
    if let Ok(config) = CloudConfig::from_env() {
        return connect_cloud(&config).await;
    }

    if let Ok(url) = std::env::var(URL_ENV) {
        info!("{} set, connecting to {}", URL_ENV, url);
        return connect_url(&url).await;
    }

    std::fs::create_dir_all(DEFAULT_LOCAL_PATH).map_err(|e| {
        StateError::Connection(format!(
            "Failed to create database directory {}: {}",
            DEFAULT_LOCAL_PATH, e
        ))
    })?;
    let url = format!("surrealkv://{}", DEFAULT_LOCAL_PATH);
    info!(
        "No hosted store or {} configured, using local persistence: {}",
        URL_ENV, url
    );
    connect_url(&url).await
}
