//! Per-instance repository files.
//!
//! [`RepositoryStore`] is the only handle components get on repositories.
//! It is an explicit value (construct it once, clone it freely) that knows
//! the repository directory and opens a fresh connection for every call.
//! Two calls for different instances never touch the same file.
//!
//! Calls for the *same* instance are not serialized here. Callers must run
//! them one at a time per instance.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use collector_types::{
    EvidenceId, InfoRecord, InstanceId, SyncStatus, COMPACT_MIN_BYTES, SIDECAR_SUFFIXES,
};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::queries::{evidence, info as info_q};
use crate::{DbError, InfoUpdate, Result};

/// What [`RepositoryStore::compact`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompactOutcome {
    /// No repository file for the instance.
    Missing,
    /// The file was empty or not a database and has been deleted.
    Removed,
    /// The file is below the compaction threshold.
    Skipped,
    /// Free pages were reclaimed.
    Compacted { before: u64, after: u64 },
}

/// Directory of instance repositories.
#[derive(Clone, Debug)]
pub struct RepositoryStore {
    dir: PathBuf,
    compact_min_bytes: u64,
}

impl RepositoryStore {
    /// Create a store rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            compact_min_bytes: COMPACT_MIN_BYTES,
        }
    }

    /// Override the minimum size below which repositories are not vacuumed.
    pub fn with_compact_min_bytes(mut self, bytes: u64) -> Self {
        self.compact_min_bytes = bytes;
        self
    }

    /// Repository directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the repository file for `id`.
    pub fn path(&self, id: &InstanceId) -> PathBuf {
        self.dir.join(id.as_str())
    }

    /// Whether a repository exists for `id`.
    pub fn exists(&self, id: &InstanceId) -> bool {
        self.path(id).is_file()
    }

    /// Ensure the repository for `id` exists with its schema and info row.
    pub fn open_or_create(&self, id: &InstanceId) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        debug!(instance = %id, "opening repository");
        crate::create(&self.path(id)).map(drop)
    }

    fn connect(&self, id: &InstanceId) -> Result<Connection> {
        crate::open_existing(&self.path(id)).map_err(|e| match e {
            DbError::NotFound(_) => DbError::NotFound(format!("repository {id}")),
            other => other,
        })
    }

    /// Read the singleton info row.
    pub fn read_info(&self, id: &InstanceId) -> Result<InfoRecord> {
        let conn = self.connect(id)?;
        info_q::read(&conn)
    }

    /// Apply a field-level update to the info row.
    pub fn update_info(&self, id: &InstanceId, update: &InfoUpdate) -> Result<()> {
        let conn = self.connect(id)?;
        info_q::update(&conn, update)?;
        Ok(())
    }

    /// Overwrite the sync status.
    pub fn set_sync_status(&self, id: &InstanceId, status: SyncStatus) -> Result<()> {
        let conn = self.connect(id)?;
        info_q::set_status(&conn, status)
    }

    /// Change the sync status only if it currently equals `from`.
    pub fn set_sync_status_if(
        &self,
        id: &InstanceId,
        from: SyncStatus,
        to: SyncStatus,
    ) -> Result<bool> {
        let conn = self.connect(id)?;
        info_q::set_status_if(&conn, from, to)
    }

    /// Append one evidence record.
    pub fn insert_evidence(&self, id: &InstanceId, size: u64, content: &[u8]) -> Result<EvidenceId> {
        let conn = self.connect(id)?;
        let evidence_id = evidence::insert(&conn, size, content)?;
        debug!(instance = %id, evidence_id, size, "stored evidence");
        Ok(evidence_id)
    }

    /// Fetch the content of one evidence record.
    pub fn get_evidence(&self, id: &InstanceId, evidence_id: EvidenceId) -> Result<Vec<u8>> {
        let conn = self.connect(id)?;
        evidence::get(&conn, evidence_id)
    }

    /// Delete one evidence record. Returns whether it existed.
    pub fn delete_evidence(&self, id: &InstanceId, evidence_id: EvidenceId) -> Result<bool> {
        let conn = self.connect(id)?;
        evidence::delete(&conn, evidence_id)
    }

    /// Declared sizes of all evidence records, in arrival order.
    pub fn list_evidence_sizes(&self, id: &InstanceId) -> Result<Vec<u64>> {
        let conn = self.connect(id)?;
        evidence::sizes(&conn)
    }

    /// Ids of all evidence records, in arrival order.
    pub fn list_evidence_ids(&self, id: &InstanceId) -> Result<Vec<EvidenceId>> {
        let conn = self.connect(id)?;
        evidence::ids(&conn)
    }

    /// Number of evidence records held.
    pub fn count_evidence(&self, id: &InstanceId) -> Result<u64> {
        let conn = self.connect(id)?;
        evidence::count(&conn)
    }

    /// All instances with a repository, sorted. Sidecar files are skipped.
    pub fn list_instances(&self) -> Result<Vec<InstanceId>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut instances = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Ok(id) = InstanceId::from_key(&name) {
                instances.push(id);
            }
        }
        instances.sort();
        Ok(instances)
    }

    /// Size of the repository file in bytes.
    pub fn file_size(&self, id: &InstanceId) -> Result<u64> {
        match fs::metadata(self.path(id)) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(DbError::NotFound(format!("repository {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the repository and its sidecars. Returns whether it existed.
    pub fn remove(&self, id: &InstanceId) -> Result<bool> {
        let path = self.path(id);
        let existed = remove_if_exists(&path)?;
        for suffix in SIDECAR_SUFFIXES {
            let mut sidecar = path.clone().into_os_string();
            sidecar.push(suffix);
            remove_if_exists(Path::new(&sidecar))?;
        }
        Ok(existed)
    }

    /// Reclaim free space, or delete the repository if it is corrupted.
    pub fn compact(&self, id: &InstanceId) -> Result<CompactOutcome> {
        let before = match self.file_size(id) {
            Ok(size) => size,
            Err(DbError::NotFound(_)) => return Ok(CompactOutcome::Missing),
            Err(e) => return Err(e),
        };

        if before == 0 {
            warn!(instance = %id, "Corrupted repository (empty file), deleting it");
            self.remove(id)?;
            return Ok(CompactOutcome::Removed);
        }

        if before < self.compact_min_bytes {
            return Ok(CompactOutcome::Skipped);
        }

        info!(instance = %id, size = before, "Compacting repository");

        let vacuumed = self
            .connect(id)
            .and_then(|conn| conn.execute_batch("VACUUM;").map_err(DbError::from));
        match vacuumed.map_err(crate::classify) {
            Ok(()) => {}
            Err(DbError::Corrupt(reason)) => {
                warn!(instance = %id, %reason, "Corrupted repository, deleting it");
                self.remove(id)?;
                return Ok(CompactOutcome::Removed);
            }
            Err(e) => return Err(e),
        }

        let after = self.file_size(id)?;
        Ok(CompactOutcome::Compacted { before, after })
    }
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
