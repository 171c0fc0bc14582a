//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::{DaemonConfig, StorageConfig};
use crate::error::{DaemonError, DaemonResult};
use ctf_engine::{InMemoryCatalog, ScoringEngine};
use ctf_storage::memory::InMemoryLedger;
use ctf_storage::ScoringStorage;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Flagline daemon server
pub struct Server {
    config: DaemonConfig,
    engine: Arc<ScoringEngine>,
}

impl Server {
    /// Build storage, catalog and engine from `config`.
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let storage = open_storage(&config.storage).await?;

        let catalog = match &config.catalog.path {
            Some(path) => InMemoryCatalog::from_json_file(path).await?,
            None => {
                tracing::warn!("No catalog path configured, starting with an empty catalog");
                InMemoryCatalog::new()
            }
        };

        let engine = Arc::new(ScoringEngine::new(
            Arc::new(catalog),
            storage,
            config.scoring.clone(),
        ));

        Ok(Self { config, engine })
    }

    pub fn engine(&self) -> &Arc<ScoringEngine> {
        &self.engine
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let state = AppState::new(self.engine.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("ctfd listening on {}", addr);
        tracing::info!(
            lock_policy = ?self.config.scoring.lock_policy,
            "Scoring engine ready"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("ctfd shutting down");
        Ok(())
    }
}

async fn open_storage(config: &StorageConfig) -> DaemonResult<Arc<dyn ScoringStorage>> {
    match config {
        StorageConfig::Memory => {
            tracing::info!("Using in-memory ledger");
            Ok(Arc::new(InMemoryLedger::new()))
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let ledger = ctf_storage::postgres::PostgresLedger::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            tracing::info!("Using PostgreSQL ledger");
            Ok(Arc::new(ledger))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(DaemonError::Config(
            "postgres storage requires ctfd built with the `postgres` feature".to_string(),
        )),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
