//! Log setup for the `agentmem` CLI.
//!
//! Commands print their results (retrieved records, sweep counts) on
//! stdout, so every log line goes to stderr. An agent can pipe
//! `agentmem retrieve` into a parser and still keep `--json` logs.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// The embedded store logs every statement at info; keep it at warn
/// unless `RUST_LOG` asks for more.
const STORE_DIRECTIVE: &str = "surrealdb=warn";

/// Filter used when `RUST_LOG` is unset: `level` for agentmem crates,
/// warn for the storage engine.
fn default_filter(level: Level) -> String {
    format!("{},{}", level.as_str().to_lowercase(), STORE_DIRECTIVE)
}

/// Install the global subscriber. Only the first call in a process takes
/// effect, so tests may call it freely.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(level)));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let installed = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
