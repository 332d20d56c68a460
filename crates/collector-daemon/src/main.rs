//! collector-daemon: hosts the evidence store.
//!
//! Single OS process running a Tokio async runtime. Repository work runs on
//! the blocking pool; operators inspect and maintain repositories through
//! JSON-RPC over a Unix socket.

mod commands;
mod config;
mod maintenance;
mod rpc;

use std::sync::Arc;

use collector_evidence::EvidenceManager;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::DaemonConfig;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Ingestion facade.
    pub manager: EvidenceManager,
    /// Configuration.
    pub config: DaemonConfig,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl DaemonState {
    pub fn new(config: DaemonConfig) -> Self {
        let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
        Self {
            manager: EvidenceManager::new(&config.evidence()),
            config,
            shutdown_tx,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("collector={}", config.logging.log_level).parse()?),
        )
        .init();

    info!("Collector daemon starting");

    // Ensure storage directories exist
    std::fs::create_dir_all(config.repo_dir())?;
    std::fs::create_dir_all(config.chunk_dir())?;

    // 2. Build daemon state
    let state = Arc::new(DaemonState::new(config));

    // 3. Recover from the previous run
    maintenance::run_startup(&state).await?;

    // 4. Start the retention sweep
    let sweeps = tokio::spawn(maintenance::run_sweeps(
        state.clone(),
        state.shutdown_tx.subscribe(),
    ));

    // 5. Run until shutdown
    let socket_path = state.config.socket_path();
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    if state.config.admin.enabled {
        let rpc_server = RpcServer::new(state.clone(), socket_path.clone());
        info!("Starting admin server on {:?}", socket_path);

        tokio::select! {
            result = rpc_server.run() => {
                if let Err(e) = result {
                    error!("Admin server error: {}", e);
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
            }
        }
    } else {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
            }
        }
    }

    // Graceful shutdown
    info!("Daemon shutting down gracefully");
    let _ = state.shutdown_tx.send(());
    if let Err(e) = sweeps.await {
        error!("Maintenance task failed: {}", e);
    }

    // Clean up socket file
    if state.config.admin.enabled {
        let _ = std::fs::remove_file(&socket_path);
    }

    info!("Daemon stopped");
    Ok(())
}
