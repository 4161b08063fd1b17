//! Server wiring: storage selection, state construction, serve loop

use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::router::create_router;
use crate::state::AppState;
use caseflow_store::memory::InMemoryStore;
use std::sync::Arc;

/// The caseflowd server
pub struct Server {
    config: DaemonConfig,
}

impl Server {
    pub fn new(config: DaemonConfig) -> Self {
        Self { config }
    }

    /// Build state from the configured storage backend and serve until
    /// the process is stopped.
    pub async fn run(self) -> DaemonResult<()> {
        let state = build_state(&self.config).await?;
        let router = create_router(state, self.config.server.enable_cors);

        let listener = tokio::net::TcpListener::bind(self.config.server.listen_addr).await?;
        tracing::info!(addr = %self.config.server.listen_addr, "caseflowd listening");

        axum::serve(listener, router)
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))
    }
}

async fn build_state(config: &DaemonConfig) -> DaemonResult<AppState> {
    match &config.storage {
        StorageConfig::Memory => {
            tracing::warn!("using in-memory storage; state is lost on restart");
            Ok(AppState::from_store(Arc::new(InMemoryStore::new())))
        }
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => connect_postgres(url, *max_connections, *connect_timeout_secs).await,
    }
}

#[cfg(feature = "postgres")]
async fn connect_postgres(
    url: &str,
    max_connections: u32,
    connect_timeout_secs: u64,
) -> DaemonResult<AppState> {
    let store =
        caseflow_store::postgres::PostgresStore::connect_with_options(
            url,
            max_connections,
            connect_timeout_secs,
        )
        .await
        .map_err(|e| DaemonError::Config(e.to_string()))?;
    Ok(AppState::from_store(Arc::new(store)))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(
    _url: &str,
    _max_connections: u32,
    _connect_timeout_secs: u64,
) -> DaemonResult<AppState> {
    Err(DaemonError::Config(
        "storage type 'postgres' requires caseflowd built with the 'postgres' feature".into(),
    ))
}
