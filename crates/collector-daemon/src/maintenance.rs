//! Periodic repository maintenance.
//!
//! Startup recovery times out every sync that was in flight when the
//! previous process died. After that the retention sweep runs on a fixed
//! interval until shutdown.

use std::sync::Arc;
use std::time::Duration;

use collector_evidence::SweepReport;
use collector_types::PurgeOptions;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::DaemonState;

/// Run the startup steps enabled in the configuration.
pub async fn run_startup(state: &Arc<DaemonState>) -> anyhow::Result<()> {
    let maintenance = &state.config.maintenance;

    if maintenance.timeout_on_startup {
        let manager = state.manager.clone();
        let timed_out = tokio::task::spawn_blocking(move || manager.sync_timeout_all()).await??;
        info!(timed_out, "Startup recovery complete");
    }

    if maintenance.purge_on_startup {
        let options = PurgeOptions {
            force: false,
            timeout_forced: true,
        };
        sweep_once(state, options).await?;
    }

    Ok(())
}

/// One retention sweep on the blocking pool.
pub async fn sweep_once(
    state: &Arc<DaemonState>,
    options: PurgeOptions,
) -> anyhow::Result<SweepReport> {
    let manager = state.manager.clone();
    let report = tokio::task::spawn_blocking(move || manager.sweep_all(options)).await??;
    Ok(report)
}

/// Sweep every `sweep_interval_secs` until shutdown. An interval of zero
/// disables the loop.
pub async fn run_sweeps(state: Arc<DaemonState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let secs = state.config.maintenance.sweep_interval_secs;
    if secs == 0 {
        info!("Periodic sweep disabled");
        return;
    }

    let mut interval = tokio::time::interval(Duration::from_secs(secs));
    // The first tick completes immediately; startup already handled it.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = sweep_once(&state, PurgeOptions::default()).await {
                    error!("Retention sweep failed: {}", e);
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Maintenance task stopping");
                return;
            }
        }
    }
}
