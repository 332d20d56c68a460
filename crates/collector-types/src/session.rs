//! Session context supplied by the authentication layer.

use serde::{Deserialize, Serialize};

use crate::{InstanceId, TypesError};

/// A validated agent session.
///
/// Produced by the handshake/session layer once the agent is authenticated;
/// the collector only reads it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Build identifier of the agent.
    pub ident: String,
    /// Per-install unique identifier.
    pub instance: String,
    /// Reported platform, e.g. "windows", "osx", "android".
    pub platform: String,
    /// Privilege level of the agent, e.g. "scout", "soldier", "elite".
    pub level: String,
    /// Whether the agent is a demo build.
    pub demo: bool,
}

impl SessionContext {
    /// The repository key for this session.
    pub fn instance_id(&self) -> Result<InstanceId, TypesError> {
        InstanceId::new(&self.ident, &self.instance)
    }
}

/// Metadata the agent reports when a sync starts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Agent protocol version.
    pub version: u32,
    /// Logged-in user on the device.
    pub user: String,
    /// Device label.
    pub device: String,
    /// Network source address of the sync.
    pub source: String,
    /// Unix timestamp of the sync.
    pub time: u64,
}
