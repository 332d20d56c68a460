//! Admin JSON-RPC server.
//!
//! One request per line, one response per line, over a Unix domain socket.
//! Requests on a connection are answered in order; connections are served
//! concurrently.

use std::path::PathBuf;
use std::sync::Arc;

use collector_db::DbError;
use collector_evidence::EvidenceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::DaemonState;

const JSONRPC_VERSION: &str = "2.0";

/// An incoming call.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Exactly one of `result` and `error` is set.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Error object. `message` is a stable upper-case name, details go in `data`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const INVALID_INSTANCE: i32 = -32020;
    pub const NOT_FOUND: i32 = -32021;

    fn new(code: i32, message: &str, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    fn detail(code: i32, message: &str, detail: &str) -> Self {
        Self::new(code, message, Some(serde_json::json!({ "detail": detail })))
    }

    pub fn parse_error() -> Self {
        Self::new(Self::PARSE_ERROR, "PARSE_ERROR", None)
    }

    pub fn invalid_request() -> Self {
        Self::new(Self::INVALID_REQUEST, "INVALID_REQUEST", None)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            Self::METHOD_NOT_FOUND,
            "METHOD_NOT_FOUND",
            Some(serde_json::json!({ "method": method })),
        )
    }

    pub fn invalid_params(detail: &str) -> Self {
        Self::detail(Self::INVALID_PARAMS, "INVALID_PARAMS", detail)
    }

    pub fn internal_error(detail: &str) -> Self {
        Self::detail(Self::INTERNAL_ERROR, "INTERNAL_ERROR", detail)
    }

    /// The instance key is malformed or has no repository.
    pub fn invalid_instance(instance: &str) -> Self {
        Self::new(
            Self::INVALID_INSTANCE,
            "INVALID_INSTANCE",
            Some(serde_json::json!({ "instance": instance })),
        )
    }

    /// The evidence record does not exist.
    pub fn not_found(detail: &str) -> Self {
        Self::detail(Self::NOT_FOUND, "NOT_FOUND", detail)
    }
}

impl From<EvidenceError> for RpcError {
    fn from(err: EvidenceError) -> Self {
        match err {
            EvidenceError::InvalidInstance(instance) => RpcError::invalid_instance(&instance),
            EvidenceError::Db(DbError::NotFound(detail)) => RpcError::not_found(&detail),
            other => RpcError::internal_error(&other.to_string()),
        }
    }
}

/// Accepts admin connections on a Unix socket.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Bind and serve until the task is dropped. A stale socket file left
    /// by a previous run is replaced.
    pub async fn run(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(socket = ?self.socket_path, "Admin server listening");

        loop {
            let stream = match listener.accept().await {
                Ok((stream, _addr)) => stream,
                Err(e) => {
                    error!("Admin accept failed: {e}");
                    continue;
                }
            };
            tokio::spawn(serve(self.state.clone(), stream));
        }
    }
}

async fn serve(state: Arc<DaemonState>, stream: UnixStream) {
    if let Err(e) = handle_connection(state, stream).await {
        warn!("Admin connection closed with error: {e}");
    }
}

async fn handle_connection(state: Arc<DaemonState>, stream: UnixStream) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => dispatch_request(state.clone(), request).await,
            Err(_) => RpcResponse::error(Value::Null, RpcError::parse_error()),
        };

        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        writer.write_all(&encoded).await?;
    }

    Ok(())
}

/// Route one request to its command handler.
pub async fn dispatch_request(state: Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let RpcRequest {
        jsonrpc,
        id,
        method,
        params,
    } = request;

    if jsonrpc != JSONRPC_VERSION {
        return RpcResponse::error(id, RpcError::invalid_request());
    }

    debug!(%method, "Admin call");

    let result = match method.as_str() {
        "instances" => commands::repository::instances(&state).await,
        "instance_info" => commands::repository::instance_info(&state, &params).await,
        "evidence_info" => commands::repository::evidence_info(&state, &params).await,
        "evidence_ids" => commands::repository::evidence_ids(&state, &params).await,
        "get_evidence" => commands::repository::get_evidence(&state, &params).await,
        "delete_evidence" => commands::repository::delete_evidence(&state, &params).await,
        "summaries" => commands::repository::summaries(&state).await,

        "purge" => commands::maintenance::purge(&state, &params).await,
        "sweep_all" => commands::maintenance::sweep_all(&state, &params).await,
        "timeout_all" => commands::maintenance::timeout_all(&state).await,
        "shutdown" => commands::maintenance::shutdown(&state).await,

        other => Err(RpcError::method_not_found(other)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}
