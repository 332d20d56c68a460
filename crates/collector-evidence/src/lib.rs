//! # collector-evidence
//!
//! Evidence ingestion for the collector: the sync state machine, the
//! retention lifecycle, and [`EvidenceManager`], the single entry point the
//! session and protocol layers call.
//!
//! ## Modules
//!
//! - [`sync`]: IDLE / IN_PROGRESS / TIMEOUT / PROCESSING transitions.
//! - [`lifecycle`]: compaction, purge and sweep policy.
//! - [`manager`]: the ingestion facade composing the above with the
//!   repository and transfer stores.
//!
//! ## Concurrency
//!
//! Every operation touches exactly one instance's files, so calls for
//! different instances may run in parallel. Calls for the same instance
//! must be serialized by the caller (one session handler per instance);
//! nothing here locks.

pub mod lifecycle;
pub mod manager;
pub mod sync;

pub use lifecycle::{Lifecycle, PurgeOutcome, PurgeReason, SweepReport};
pub use manager::{ChunkReceipt, EvidenceConfig, EvidenceManager, InstanceSummary};
pub use sync::SyncMachine;

use collector_db::DbError;
use collector_storage::StorageError;
use collector_types::TypesError;

/// Errors surfaced by the ingestion facade.
#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    /// The identifier cannot name a repository.
    #[error("invalid instance: {0}")]
    InvalidInstance(String),

    /// Repository store failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Transfer store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<TypesError> for EvidenceError {
    fn from(err: TypesError) -> Self {
        match err {
            TypesError::InvalidInstance(id) => EvidenceError::InvalidInstance(id),
            other => EvidenceError::Db(DbError::Corrupt(other.to_string())),
        }
    }
}

impl EvidenceError {
    /// Whether the error means the instance or record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EvidenceError::Db(DbError::NotFound(_)))
    }
}

pub type Result<T> = std::result::Result<T, EvidenceError>;
