//! Retention lifecycle: compaction, purge and sweep.
//!
//! Retention is driven by evidence count, not age alone. A repository that
//! still holds undelivered evidence, or whose agent is mid-sync, is never
//! reclaimed. Age only matters for empty, idle repositories, which are
//! deleted once their last sync is older than the retention window.

use collector_db::{CompactOutcome, DbError, RepositoryStore};
use collector_types::{unix_now, InstanceId, PurgeOptions, SyncStatus, RETENTION_SECS};
use serde::Serialize;
use tracing::{info, warn};

use crate::Result;

/// Why a repository was deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeReason {
    /// `force` was requested.
    Forced,
    /// The info row could not be read, or the file is not a database.
    Corrupt,
    /// Empty and idle, and `timeout_forced` was requested.
    TimeoutForced,
    /// Empty and idle past the retention window.
    Expired,
}

/// Result of purging one repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum PurgeOutcome {
    Deleted(PurgeReason),
    Retained,
}

/// Totals of one sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub deleted: usize,
    pub retained: usize,
    pub failed: usize,
}

/// Applies the retention policy to repositories.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    repos: RepositoryStore,
    retention_secs: u64,
}

impl Lifecycle {
    pub fn new(repos: RepositoryStore) -> Self {
        Self {
            repos,
            retention_secs: RETENTION_SECS,
        }
    }

    /// Override the retention window.
    pub fn with_retention_secs(mut self, secs: u64) -> Self {
        self.retention_secs = secs;
        self
    }

    /// Compact the repository when it holds no evidence and is not syncing.
    ///
    /// Returns `None` when the repository is not eligible.
    pub fn compact_if_eligible(&self, id: &InstanceId) -> Result<Option<CompactOutcome>> {
        let info = self.repos.read_info(id)?;
        let count = self.repos.count_evidence(id)?;
        if info.sync_status == SyncStatus::InProgress || count != 0 {
            return Ok(None);
        }
        Ok(Some(self.repos.compact(id)?))
    }

    /// Purge one repository according to `options`, judged at the current time.
    pub fn purge(&self, id: &InstanceId, options: PurgeOptions) -> Result<PurgeOutcome> {
        self.purge_at(id, options, unix_now())
    }

    /// Purge one repository, judging its age against `now`.
    pub fn purge_at(&self, id: &InstanceId, options: PurgeOptions, now: u64) -> Result<PurgeOutcome> {
        if !self.repos.exists(id) {
            return Err(DbError::NotFound(format!("repository {id}")).into());
        }

        if options.force {
            info!(instance = %id, "Purge: forced deletion");
            self.repos.remove(id)?;
            return Ok(PurgeOutcome::Deleted(PurgeReason::Forced));
        }

        // Only a file that is positively unreadable is deleted. Busy, I/O and
        // version errors propagate and the repository is kept.
        let info = match self.repos.read_info(id) {
            Ok(info) => info,
            Err(DbError::Corrupt(reason)) => {
                info!(instance = %id, %reason, "Purge: invalid repository, deleting it");
                self.repos.remove(id)?;
                return Ok(PurgeOutcome::Deleted(PurgeReason::Corrupt));
            }
            Err(e) => return Err(e.into()),
        };
        let count = self.repos.count_evidence(id)?;
        let in_progress = info.sync_status == SyncStatus::InProgress;

        if !in_progress && count == 0 {
            match self.repos.compact(id) {
                Ok(CompactOutcome::Removed) => {
                    return Ok(PurgeOutcome::Deleted(PurgeReason::Corrupt));
                }
                Ok(_) => {}
                Err(e) => warn!(instance = %id, "Cannot compact the repository: {e}"),
            }
        }

        if in_progress || count != 0 {
            return Ok(PurgeOutcome::Retained);
        }

        let age = now.saturating_sub(info.sync_time);
        let reason = if options.timeout_forced {
            PurgeReason::TimeoutForced
        } else if age > self.retention_secs {
            PurgeReason::Expired
        } else {
            return Ok(PurgeOutcome::Retained);
        };

        info!(instance = %id, age, ?reason, "Auto purging old repository");
        self.repos.remove(id)?;
        Ok(PurgeOutcome::Deleted(reason))
    }

    /// Purge every repository. Failures are logged and counted; they never
    /// stop the sweep.
    pub fn sweep_all(&self, options: PurgeOptions) -> Result<SweepReport> {
        self.sweep_all_at(options, unix_now())
    }

    /// [`sweep_all`](Self::sweep_all) judged against `now`.
    pub fn sweep_all_at(&self, options: PurgeOptions, now: u64) -> Result<SweepReport> {
        info!("Checking for old repositories to delete");

        let mut report = SweepReport::default();
        for id in self.repos.list_instances()? {
            report.examined += 1;
            match self.purge_at(&id, options, now) {
                Ok(PurgeOutcome::Deleted(_)) => report.deleted += 1,
                Ok(PurgeOutcome::Retained) => report.retained += 1,
                Err(e) => {
                    warn!(instance = %id, "Cannot purge the repository: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            deleted = report.deleted,
            retained = report.retained,
            failed = report.failed,
            "Repository sweep complete"
        );
        Ok(report)
    }
}
