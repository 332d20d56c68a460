//! Ingestion facade.
//!
//! [`EvidenceManager`] is constructed once by the process entry point and
//! handed (by clone or `Arc`) to every session handler and to the
//! maintenance timer. It holds only paths and policy, no mutable state.

use std::path::PathBuf;

use collector_db::{CompactOutcome, DbError, RepositoryStore};
use collector_storage::{Chunk, ChunkOutcome, TransferStore};
use collector_types::{
    EvidenceId, InfoRecord, InstanceId, PurgeOptions, SessionContext, SyncMetadata, SyncStatus,
    COMPACT_MIN_BYTES, RETENTION_SECS,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::lifecycle::{Lifecycle, PurgeOutcome, SweepReport};
use crate::sync::SyncMachine;
use crate::Result;

/// Where repositories and transfers live, and the retention policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvidenceConfig {
    /// Directory of per-instance repositories.
    pub repo_dir: PathBuf,
    /// Directory of in-flight chunked transfers.
    pub chunk_dir: PathBuf,
    /// Empty idle repositories older than this are purged.
    pub retention_secs: u64,
    /// Repositories smaller than this are never vacuumed.
    pub compact_min_bytes: u64,
}

impl EvidenceConfig {
    /// Default layout under `base`: `evidence/` and `evidence_chunk/`.
    pub fn under(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            repo_dir: base.join("evidence"),
            chunk_dir: base.join("evidence_chunk"),
            retention_secs: RETENTION_SECS,
            compact_min_bytes: COMPACT_MIN_BYTES,
        }
    }
}

/// Reply to one chunk of a resumable upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkReceipt {
    /// Offset the agent should continue from.
    pub base_offset: u32,
    /// The reassembled payload, once the last chunk arrived.
    pub payload: Option<Vec<u8>>,
    /// Id under which the completed payload was stored.
    pub evidence_id: Option<EvidenceId>,
}

/// One row of the status overview.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstanceSummary {
    pub instance: InstanceId,
    pub info: InfoRecord,
    pub evidence_count: usize,
    pub evidence_bytes: u64,
}

/// Single entry point for session handlers, the protocol layer and
/// maintenance tooling.
#[derive(Clone, Debug)]
pub struct EvidenceManager {
    repos: RepositoryStore,
    transfers: TransferStore,
    sync: SyncMachine,
    lifecycle: Lifecycle,
}

impl EvidenceManager {
    pub fn new(config: &EvidenceConfig) -> Self {
        let repos = RepositoryStore::new(config.repo_dir.clone())
            .with_compact_min_bytes(config.compact_min_bytes);
        Self {
            transfers: TransferStore::new(config.chunk_dir.clone()),
            sync: SyncMachine::new(repos.clone()),
            lifecycle: Lifecycle::new(repos.clone()).with_retention_secs(config.retention_secs),
            repos,
        }
    }

    /// The underlying repository store.
    pub fn repositories(&self) -> &RepositoryStore {
        &self.repos
    }

    /// The underlying transfer store.
    pub fn transfers(&self) -> &TransferStore {
        &self.transfers
    }

    /// The retention policy.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    // -- sync state ---------------------------------------------------------

    /// Begin a sync for an authenticated session.
    pub fn sync_start(&self, session: &SessionContext, metadata: &SyncMetadata) -> Result<InstanceId> {
        self.sync.start(session, metadata)
    }

    /// IN_PROGRESS → TIMEOUT for one instance.
    pub fn sync_timeout(&self, id: &InstanceId) -> Result<bool> {
        self.sync.timeout(id)
    }

    /// IN_PROGRESS → TIMEOUT for every instance.
    pub fn sync_timeout_all(&self) -> Result<usize> {
        self.sync.timeout_all()
    }

    /// Overwrite the sync status, e.g. to PROCESSING.
    pub fn sync_status(&self, id: &InstanceId, status: SyncStatus) -> Result<bool> {
        self.sync.set_status(id, status)
    }

    /// Mark a sync as complete.
    pub fn sync_end(&self, id: &InstanceId) -> Result<bool> {
        self.sync.end(id)
    }

    // -- ingestion ----------------------------------------------------------

    /// Store a whole evidence payload.
    ///
    /// Failures propagate: the agent must not get an acknowledgement for
    /// evidence that was not stored.
    pub fn store_evidence(&self, id: &InstanceId, size: u64, content: &[u8]) -> Result<EvidenceId> {
        self.repos.insert_evidence(id, size, content).map_err(|e| {
            warn!(instance = %id, "Cannot insert into the repository: {e}");
            e.into()
        })
    }

    /// Apply one chunk of a resumable upload.
    ///
    /// When the chunk completes the upload, the payload is stored as a new
    /// evidence record before this returns.
    pub fn store_evidence_chunk(
        &self,
        id: &InstanceId,
        transfer_id: u32,
        base_offset: u32,
        chunk_len: u32,
        size: u32,
        content: &[u8],
    ) -> Result<ChunkReceipt> {
        if !self.repos.exists(id) {
            return Err(DbError::NotFound(format!("repository {id}")).into());
        }

        let chunk = Chunk {
            id: transfer_id,
            base_offset,
            chunk_len,
            total_size: size,
            content,
        };
        let outcome = self.transfers.write_chunk(id, &chunk)?;
        let base_offset = outcome.base_offset();

        match outcome {
            ChunkOutcome::Complete { payload } => {
                let evidence_id = self.store_evidence(id, u64::from(size), &payload)?;
                debug!(instance = %id, transfer_id, evidence_id, "Chunked evidence stored");
                Ok(ChunkReceipt {
                    base_offset,
                    payload: Some(payload),
                    evidence_id: Some(evidence_id),
                })
            }
            ChunkOutcome::Restart | ChunkOutcome::Resync { .. } | ChunkOutcome::Accepted { .. } => {
                Ok(ChunkReceipt {
                    base_offset,
                    payload: None,
                    evidence_id: None,
                })
            }
        }
    }

    // -- queries ------------------------------------------------------------

    /// All instances with a repository.
    pub fn instances(&self) -> Result<Vec<InstanceId>> {
        Ok(self.repos.list_instances()?)
    }

    /// The info row of one instance.
    pub fn instance_info(&self, id: &InstanceId) -> Result<InfoRecord> {
        Ok(self.repos.read_info(id)?)
    }

    /// Sizes of the pending evidence of one instance.
    pub fn evidence_info(&self, id: &InstanceId) -> Result<Vec<u64>> {
        Ok(self.repos.list_evidence_sizes(id)?)
    }

    /// Ids of the pending evidence of one instance.
    pub fn evidence_ids(&self, id: &InstanceId) -> Result<Vec<EvidenceId>> {
        Ok(self.repos.list_evidence_ids(id)?)
    }

    /// Content of one evidence record.
    pub fn get_evidence(&self, id: &InstanceId, evidence_id: EvidenceId) -> Result<Vec<u8>> {
        Ok(self.repos.get_evidence(id, evidence_id)?)
    }

    /// Delete one evidence record after it has been offloaded.
    pub fn delete_evidence(&self, id: &InstanceId, evidence_id: EvidenceId) -> Result<bool> {
        Ok(self.repos.delete_evidence(id, evidence_id)?)
    }

    /// Info and pending evidence totals for every readable instance, most
    /// recent sync first. Unreadable repositories are skipped.
    pub fn summaries(&self) -> Result<Vec<InstanceSummary>> {
        let mut summaries = Vec::new();
        for id in self.repos.list_instances()? {
            let summary = self.repos.read_info(&id).and_then(|info| {
                let sizes = self.repos.list_evidence_sizes(&id)?;
                Ok(InstanceSummary {
                    instance: id.clone(),
                    info,
                    evidence_count: sizes.len(),
                    evidence_bytes: sizes.iter().sum(),
                })
            });
            match summary {
                Ok(summary) => summaries.push(summary),
                Err(e) => warn!(instance = %id, "Cannot read from the repository: {e}"),
            }
        }
        summaries.sort_by(|a, b| b.info.sync_time.cmp(&a.info.sync_time));
        Ok(summaries)
    }

    // -- maintenance --------------------------------------------------------

    /// Compact one repository if it is empty and idle.
    pub fn compact_if_eligible(&self, id: &InstanceId) -> Result<Option<CompactOutcome>> {
        self.lifecycle.compact_if_eligible(id)
    }

    /// Purge one repository.
    pub fn purge(&self, id: &InstanceId, options: PurgeOptions) -> Result<PurgeOutcome> {
        self.lifecycle.purge(id, options)
    }

    /// Purge every repository.
    pub fn sweep_all(&self, options: PurgeOptions) -> Result<SweepReport> {
        self.lifecycle.sweep_all(options)
    }
}
