//! Sync status and repository info structures.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TypesError;

/// Transfer status of an instance, persisted in the info row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Idle,
    InProgress,
    Timeout,
    Processing,
}

impl SyncStatus {
    /// Integer form stored in the repository.
    pub fn as_i64(self) -> i64 {
        match self {
            SyncStatus::Idle => 0,
            SyncStatus::InProgress => 1,
            SyncStatus::Timeout => 2,
            SyncStatus::Processing => 3,
        }
    }
}

impl TryFrom<i64> for SyncStatus {
    type Error = TypesError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SyncStatus::Idle),
            1 => Ok(SyncStatus::InProgress),
            2 => Ok(SyncStatus::Timeout),
            3 => Ok(SyncStatus::Processing),
            other => Err(TypesError::UnknownStatus(other)),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Idle => "IDLE",
            SyncStatus::InProgress => "IN PROGRESS",
            SyncStatus::Timeout => "TIMEOUT",
            SyncStatus::Processing => "PROCESSING",
        };
        f.write_str(s)
    }
}

/// The singleton info row of a repository.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoRecord {
    pub ident: String,
    pub instance: String,
    pub platform: String,
    pub demo: bool,
    pub level: String,
    /// Agent protocol version of the last sync.
    pub version: u32,
    pub user: String,
    pub device: String,
    pub source: String,
    /// Unix timestamp of the last sync.
    pub sync_time: u64,
    pub sync_status: SyncStatus,
}

/// Options for purging a repository.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeOptions {
    /// Delete unconditionally, even with pending evidence.
    #[serde(default)]
    pub force: bool,
    /// Delete empty idle repositories regardless of their age.
    #[serde(default)]
    pub timeout_forced: bool,
}
