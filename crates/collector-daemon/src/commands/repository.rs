//! Repository query command handlers.

use std::sync::Arc;

use base64::Engine;
use serde_json::Value;

use super::{blocking, instance_param, known};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

fn evidence_id_param(params: &Value) -> std::result::Result<i64, RpcError> {
    params
        .get("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| RpcError::invalid_params("id required"))
}

fn to_value<T: serde::Serialize>(value: T) -> Result {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&format!("encode: {e}")))
}

/// List every instance with a repository.
pub async fn instances(state: &Arc<DaemonState>) -> Result {
    let ids = blocking(state, |m| Ok(m.instances()?)).await?;
    to_value(ids)
}

/// Get the info row of one instance.
pub async fn instance_info(state: &Arc<DaemonState>, params: &Value) -> Result {
    let id = instance_param(params)?;
    let info = blocking(state, move |m| {
        known(m, &id)?;
        Ok(m.instance_info(&id)?)
    })
    .await?;
    to_value(info)
}

/// List the sizes of the pending evidence of one instance.
pub async fn evidence_info(state: &Arc<DaemonState>, params: &Value) -> Result {
    let id = instance_param(params)?;
    let sizes = blocking(state, move |m| {
        known(m, &id)?;
        Ok(m.evidence_info(&id)?)
    })
    .await?;
    to_value(sizes)
}

/// List the ids of the pending evidence of one instance.
pub async fn evidence_ids(state: &Arc<DaemonState>, params: &Value) -> Result {
    let id = instance_param(params)?;
    let ids = blocking(state, move |m| {
        known(m, &id)?;
        Ok(m.evidence_ids(&id)?)
    })
    .await?;
    to_value(ids)
}

/// Fetch one evidence record, base64-encoded.
pub async fn get_evidence(state: &Arc<DaemonState>, params: &Value) -> Result {
    let id = instance_param(params)?;
    let evidence_id = evidence_id_param(params)?;
    let content = blocking(state, move |m| {
        known(m, &id)?;
        Ok(m.get_evidence(&id, evidence_id)?)
    })
    .await?;

    Ok(serde_json::json!({
        "id": evidence_id,
        "size": content.len(),
        "content": base64::engine::general_purpose::STANDARD.encode(&content),
    }))
}

/// Delete one evidence record.
pub async fn delete_evidence(state: &Arc<DaemonState>, params: &Value) -> Result {
    let id = instance_param(params)?;
    let evidence_id = evidence_id_param(params)?;
    let deleted = blocking(state, move |m| {
        known(m, &id)?;
        Ok(m.delete_evidence(&id, evidence_id)?)
    })
    .await?;
    Ok(serde_json::json!({"deleted": deleted}))
}

/// Per-instance overview, most recent sync first.
pub async fn summaries(state: &Arc<DaemonState>) -> Result {
    let summaries = blocking(state, |m| Ok(m.summaries()?)).await?;
    to_value(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use collector_types::{SessionContext, SyncMetadata};
    use tempfile::TempDir;

    fn state() -> (TempDir, Arc<DaemonState>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = DaemonConfig::default();
        config.storage.data_dir = dir.path().to_string_lossy().into_owned();
        (dir, Arc::new(DaemonState::new(config)))
    }

    fn seed(state: &DaemonState, instance: &str, time: u64) -> String {
        let session = SessionContext {
            ident: "RCS_0000000003".to_string(),
            instance: instance.to_string(),
            platform: "android".to_string(),
            level: "soldier".to_string(),
            demo: false,
        };
        let meta = SyncMetadata {
            version: 3,
            user: "eve".to_string(),
            time,
            ..SyncMetadata::default()
        };
        state.manager.sync_start(&session, &meta).expect("start").to_string()
    }

    #[tokio::test]
    async fn test_instance_info() {
        let (_dir, state) = state();
        let key = seed(&state, "dev1", 1_700_000_000);
        let info = instance_info(&state, &serde_json::json!({"instance": key}))
            .await
            .expect("info");
        assert_eq!(info["platform"], "android");
        assert_eq!(info["user"], "eve");
        assert_eq!(info["sync_time"], 1_700_000_000u64);
    }

    #[tokio::test]
    async fn test_unknown_instance() {
        let (_dir, state) = state();
        let params = serde_json::json!({"instance": "RCS_0000000003_nope"});
        let err = instance_info(&state, &params).await.expect_err("unknown");
        assert_eq!(err.code, -32020);
        let err = evidence_ids(&state, &params).await.expect_err("unknown");
        assert_eq!(err.code, -32020);
    }

    #[tokio::test]
    async fn test_get_and_delete_evidence() {
        let (_dir, state) = state();
        let key = seed(&state, "dev1", 1);
        let id = collector_types::InstanceId::from_key(&key).expect("id");
        let eid = state.manager.store_evidence(&id, 3, b"abc").expect("store");

        let ids = evidence_ids(&state, &serde_json::json!({"instance": key}))
            .await
            .expect("ids");
        assert_eq!(ids, serde_json::json!([eid]));

        let got = get_evidence(&state, &serde_json::json!({"instance": key, "id": eid}))
            .await
            .expect("get");
        assert_eq!(got["content"], "YWJj");
        assert_eq!(got["size"], 3);

        let deleted = delete_evidence(&state, &serde_json::json!({"instance": key, "id": eid}))
            .await
            .expect("delete");
        assert_eq!(deleted["deleted"], true);

        let err = get_evidence(&state, &serde_json::json!({"instance": key, "id": eid}))
            .await
            .expect_err("gone");
        assert_eq!(err.code, -32021);

        let err = get_evidence(&state, &serde_json::json!({"instance": key}))
            .await
            .expect_err("no id");
        assert_eq!(err.code, -32602);
    }

    #[tokio::test]
    async fn test_summaries_order() {
        let (_dir, state) = state();
        let old = seed(&state, "old", 100);
        let new = seed(&state, "new", 200);
        let list = summaries(&state).await.expect("summaries");
        assert_eq!(list[0]["instance"], new);
        assert_eq!(list[1]["instance"], old);
        assert_eq!(list[1]["evidence_count"], 0);

        let all = instances(&state).await.expect("instances");
        assert_eq!(all.as_array().map(Vec::len), Some(2));
    }
}
