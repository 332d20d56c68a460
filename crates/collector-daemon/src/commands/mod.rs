//! Admin command handlers.
//!
//! Each submodule implements the commands for one admin category. Every
//! handler runs its repository work on the blocking pool.

pub mod maintenance;
pub mod repository;

use std::sync::Arc;

use collector_evidence::EvidenceManager;
use collector_types::InstanceId;
use serde_json::Value;

use crate::rpc::RpcError;
use crate::DaemonState;

/// Run `f` against the manager on the blocking pool.
pub async fn blocking<T, F>(state: &Arc<DaemonState>, f: F) -> Result<T, RpcError>
where
    T: Send + 'static,
    F: FnOnce(&EvidenceManager) -> Result<T, RpcError> + Send + 'static,
{
    let manager = state.manager.clone();
    tokio::task::spawn_blocking(move || f(&manager))
        .await
        .map_err(|e| RpcError::internal_error(&format!("task failed: {e}")))?
}

/// The `instance` parameter, validated as a repository key.
pub fn instance_param(params: &Value) -> Result<InstanceId, RpcError> {
    let key = params
        .get("instance")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params("instance required"))?;
    InstanceId::from_key(key).map_err(|_| RpcError::invalid_instance(key))
}

/// Fail with INVALID_INSTANCE unless the repository exists.
pub fn known(manager: &EvidenceManager, id: &InstanceId) -> Result<(), RpcError> {
    if manager.repositories().exists(id) {
        Ok(())
    } else {
        Err(RpcError::invalid_instance(id.as_str()))
    }
}
