//! caseflowd - the Caseflow REST daemon
//!
//! A thin HTTP adapter over the workflow engine: template administration,
//! instance lifecycle, task queries, and the audit read paths. All
//! correctness rules live in the engine; handlers only translate between
//! HTTP shapes and typed engine calls.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod handlers;
mod router;
mod server;
mod state;

use config::DaemonConfig;
use error::DaemonResult;
use server::Server;

/// Caseflow daemon CLI
#[derive(Parser)]
#[command(name = "caseflowd")]
#[command(about = "Caseflow daemon - workflow and approval engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CASEFLOW_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides the config file)
    #[arg(short, long, env = "CASEFLOW_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level
    #[arg(long, env = "CASEFLOW_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "CASEFLOW_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| error::DaemonError::Config(e.to_string()))?;

    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| error::DaemonError::Config(format!("invalid listen address: {e}")))?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.listen_addr,
        "starting caseflowd"
    );

    Server::new(config).run().await
}
