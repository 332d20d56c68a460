//! # collector-types
//!
//! Shared domain types used across the collector workspace: the instance
//! identifier that names every repository and transfer file, the session
//! context handed over by the authentication layer, and the sync status
//! stored in each repository's info row.

pub mod instance;
pub mod session;
pub mod sync;

pub use instance::InstanceId;
pub use session::{SessionContext, SyncMetadata};
pub use sync::{InfoRecord, PurgeOptions, SyncStatus};

/// Store-assigned evidence identifier.
pub type EvidenceId = i64;

/// Seconds in one day.
pub const DAY_SECS: u64 = 86_400;

/// Repositories with no evidence that have not synced for this long are purged.
pub const RETENTION_SECS: u64 = 7 * DAY_SECS;

/// Repositories smaller than this are never vacuumed.
pub const COMPACT_MIN_BYTES: u64 = 50_000;

/// File name suffixes SQLite uses for sidecar files next to a database.
pub const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Errors raised while validating shared types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    /// The identifier cannot name a file in the repository directory.
    #[error("invalid instance: {0}")]
    InvalidInstance(String),

    /// A stored sync status value is outside the known range.
    #[error("unknown sync status: {0}")]
    UnknownStatus(i64),
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
