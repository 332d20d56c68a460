//! Maintenance command handlers.

use std::sync::Arc;

use collector_types::PurgeOptions;
use serde_json::Value;
use tracing::info;

use super::{blocking, instance_param, known};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

fn flag(params: &Value, name: &str) -> bool {
    params.get(name).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// Purge one repository.
pub async fn purge(state: &Arc<DaemonState>, params: &Value) -> Result {
    let id = instance_param(params)?;
    let options = PurgeOptions {
        force: flag(params, "force"),
        timeout_forced: flag(params, "timeout"),
    };
    let outcome = blocking(state, move |m| {
        known(m, &id)?;
        Ok(m.purge(&id, options)?)
    })
    .await?;
    serde_json::to_value(outcome).map_err(|e| RpcError::internal_error(&format!("encode: {e}")))
}

/// Purge every repository.
pub async fn sweep_all(state: &Arc<DaemonState>, params: &Value) -> Result {
    let options = PurgeOptions {
        force: false,
        timeout_forced: flag(params, "timeout"),
    };
    let report = blocking(state, move |m| Ok(m.sweep_all(options)?)).await?;
    serde_json::to_value(report).map_err(|e| RpcError::internal_error(&format!("encode: {e}")))
}

/// Time out every in-flight sync.
pub async fn timeout_all(state: &Arc<DaemonState>) -> Result {
    let timed_out = blocking(state, |m| Ok(m.sync_timeout_all()?)).await?;
    Ok(serde_json::json!({"timed_out": timed_out}))
}

/// Ask the daemon to stop.
pub async fn shutdown(state: &Arc<DaemonState>) -> Result {
    info!("Shutdown requested over the admin socket");
    let _ = state.shutdown_tx.send(());
    Ok(serde_json::json!({"stopping": true}))
}
