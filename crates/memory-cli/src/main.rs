//! agentmem - operator CLI for the agent memory store
//!
//! ## Commands
//!
//! - `strategies`: List configured strategies
//! - `append`: Append a raw JSON payload as an event
//! - `log`: Record a conversation turn
//! - `ingest`: Extract knowledge blocks from agent output and store them
//! - `retrieve`: Query merged memory for an actor
//! - `sweep`: Remove events that have expired everywhere

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use agentmem_core::metrics::METRICS;
use agentmem_core::{EventLog, MemoryConfig, MemoryService, StrategyKind, SurrealEventLog};

#[derive(Parser)]
#[command(name = "agentmem")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Namespace-routed long-term memory for agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Strategy configuration file (TOML)
    #[arg(long, global = true, env = "AGENTMEM_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL (mem://, surrealkv://path, ws://host:port)
    #[arg(long, global = true, env = "AGENTMEM_DB")]
    db: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured strategies
    Strategies {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Append a JSON payload as an event
    Append {
        #[arg(long)]
        actor: String,

        #[arg(long)]
        session: String,

        /// JSON payload; objects with `subject` and `kind` are stored as
        /// knowledge records
        #[arg(long)]
        payload: String,
    },

    /// Record one conversation turn
    Log {
        #[arg(long)]
        actor: String,

        #[arg(long)]
        session: String,

        #[arg(long, default_value = "user")]
        role: String,

        text: String,
    },

    /// Extract knowledge blocks from agent output and store them
    Ingest {
        #[arg(long)]
        actor: String,

        #[arg(long)]
        session: String,

        /// File with the agent output, or `-` for stdin
        #[arg(long)]
        file: PathBuf,

        /// Kind whose confidence floors apply
        #[arg(long)]
        kind: Option<StrategyKind>,
    },

    /// Retrieve merged memory for an actor
    Retrieve {
        #[arg(long)]
        actor: String,

        #[arg(long)]
        session: Option<String>,

        #[arg(long)]
        kind: Option<StrategyKind>,

        /// Whitespace-separated search terms
        #[arg(short, long, default_value = "")]
        query: String,

        /// Maximum number of records (default from config)
        #[arg(short, long)]
        max: Option<usize>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove one batch of events that have expired in every namespace
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    agentmem_core::telemetry::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;

    if let Commands::Strategies { format } = cli.command {
        return cmd_strategies(&config, format);
    }

    let log = open_log(cli.db.as_deref())
        .await
        .context("Failed to connect to agentmem database")?;
    let service = MemoryService::new(log, &config).context("Invalid memory configuration")?;

    let result = match cli.command {
        Commands::Strategies { .. } => Ok(()),
        Commands::Append {
            actor,
            session,
            payload,
        } => cmd_append(&service, &actor, &session, &payload).await,
        Commands::Log {
            actor,
            session,
            role,
            text,
        } => cmd_log(&service, &actor, &session, &role, &text).await,
        Commands::Ingest {
            actor,
            session,
            file,
            kind,
        } => cmd_ingest(&service, &actor, &session, &file, kind).await,
        Commands::Retrieve {
            actor,
            session,
            kind,
            query,
            max,
            format,
        } => cmd_retrieve(&service, &actor, session.as_deref(), kind, &query, max, format).await,
        Commands::Sweep => cmd_sweep(&service).await,
    };

    METRICS.flush();
    result
}

fn load_config(path: Option<&Path>) -> Result<MemoryConfig> {
    match path {
        Some(path) => MemoryConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(MemoryConfig::default()),
    }
}

async fn open_log(url: Option<&str>) -> Result<Arc<dyn EventLog>> {
    let log = match url {
        Some(url) => SurrealEventLog::connect(url).await?,
        None => SurrealEventLog::from_env().await?,
    };
    Ok(Arc::new(log))
}

fn cmd_strategies(config: &MemoryConfig, format: OutputFormat) -> Result<()> {
    let registry = config.build_registry()?;
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(registry.all_strategies())?
            );
        }
        OutputFormat::Text => {
            for s in registry.all_strategies() {
                println!(
                    "{:<28} {:<10} {:<44} {:>4}d  floor {:.2}",
                    s.strategy_id,
                    s.kind.as_str(),
                    s.template.as_str(),
                    s.retention.num_days(),
                    s.confidence_floor
                );
            }
        }
    }
    Ok(())
}

async fn cmd_append(service: &MemoryService, actor: &str, session: &str, payload: &str) -> Result<()> {
    let payload: Value = serde_json::from_str(payload).context("Payload is not valid JSON")?;
    let id = service.create_event(actor, session, payload).await?;
    println!("{}", id);
    Ok(())
}

async fn cmd_log(
    service: &MemoryService,
    actor: &str,
    session: &str,
    role: &str,
    text: &str,
) -> Result<()> {
    let id = service.log_conversation(actor, session, role, text).await?;
    println!("{}", id);
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
    }
}

async fn cmd_ingest(
    service: &MemoryService,
    actor: &str,
    session: &str,
    file: &Path,
    kind: Option<StrategyKind>,
) -> Result<()> {
    let raw = read_input(file)?;
    let ids = service
        .ingest_agent_output(actor, session, &raw, kind)
        .await?;
    info!(stored = ids.len(), "ingest complete");
    for id in &ids {
        println!("{}", id);
    }
    Ok(())
}

async fn cmd_retrieve(
    service: &MemoryService,
    actor: &str,
    session: Option<&str>,
    kind: Option<StrategyKind>,
    query: &str,
    max: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let result = service
        .retrieve_memory(kind, query, actor, max, session)
        .await;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            println!("{}", result.render_context());
            if result.truncated {
                println!("(partial result: some stores did not answer in time)");
            }
        }
    }
    Ok(())
}

async fn cmd_sweep(service: &MemoryService) -> Result<()> {
    let report = service.sweeper().sweep_once().await?;
    println!("scanned {} removed {}", report.scanned, report.removed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmem_state::fakes::MemoryEventLog;
    use clap::CommandFactory;

    fn service() -> (Arc<MemoryEventLog>, MemoryService) {
        let log = Arc::new(MemoryEventLog::new());
        let svc = MemoryService::new(log.clone(), &MemoryConfig::default()).unwrap();
        (log, svc)
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_retrieve_with_kind() {
        let cli = Cli::try_parse_from([
            "agentmem", "retrieve", "--actor", "alice", "--kind", "preference", "-q", "pager",
            "--format", "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Retrieve {
                actor,
                kind,
                query,
                format,
                ..
            } => {
                assert_eq!(actor, "alice");
                assert_eq!(kind, Some(StrategyKind::Preference));
                assert_eq!(query, "pager");
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected retrieve"),
        }
    }

    #[test]
    fn rejects_unknown_kind() {
        let parsed = Cli::try_parse_from([
            "agentmem", "retrieve", "--actor", "alice", "--kind", "gossip",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn strategies_lists_defaults() {
        cmd_strategies(&MemoryConfig::default(), OutputFormat::Json).unwrap();
        cmd_strategies(&MemoryConfig::default(), OutputFormat::Text).unwrap();
    }

    #[tokio::test]
    async fn append_rejects_invalid_json() {
        let (_, svc) = service();
        assert!(cmd_append(&svc, "alice", "s1", "{not json").await.is_err());
    }

    #[tokio::test]
    async fn ingest_then_retrieve() {
        let (log, svc) = service();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.md");
        std::fs::write(
            &path,
            "```knowledge\n{\"subject\": \"pager\", \"kind\": \"PREFERENCE\", \"attributes\": {\"tool\": \"opsgenie\"}, \"confidence\": 0.9}\n```",
        )
        .unwrap();

        cmd_ingest(&svc, "alice", "s1", &path, None).await.unwrap();
        assert_eq!(log.count().await.unwrap(), 1);

        cmd_retrieve(&svc, "alice", None, None, "pager", Some(5), OutputFormat::Text)
            .await
            .unwrap();
        cmd_sweep(&svc).await.unwrap();
        assert_eq!(log.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn log_records_conversation() {
        let (log, svc) = service();
        cmd_log(&svc, "alice", "s1", "user", "why is checkout slow?")
            .await
            .unwrap();
        assert_eq!(log.count().await.unwrap(), 1);
    }
}
