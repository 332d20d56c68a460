//! Sync state machine.
//!
//! ```text
//!            start                    timeout (only from IN_PROGRESS)
//!   IDLE ───────────▶ IN_PROGRESS ───────────────────────────▶ TIMEOUT
//!     ▲                    │
//!     └────── end ─────────┘      set_status: any ─▶ any
//! ```
//!
//! A timeout never overwrites a status other than IN_PROGRESS, so a late
//! timeout for a dead session cannot clobber the state a newer session set.

use collector_db::{InfoUpdate, RepositoryStore};
use collector_types::{InstanceId, SessionContext, SyncMetadata, SyncStatus};
use tracing::{error, info, warn};

use crate::Result;

/// Drives the sync status stored in each repository's info row.
#[derive(Clone, Debug)]
pub struct SyncMachine {
    repos: RepositoryStore,
}

impl SyncMachine {
    pub fn new(repos: RepositoryStore) -> Self {
        Self { repos }
    }

    /// Begin a sync: create the repository if needed, record the session
    /// metadata and move to IN_PROGRESS.
    pub fn start(&self, session: &SessionContext, metadata: &SyncMetadata) -> Result<InstanceId> {
        let id = session.instance_id()?;

        if let Err(e) = self.repos.open_or_create(&id) {
            error!(instance = %id, "Problems creating the repository: {e}");
            return Err(e.into());
        }

        let update = InfoUpdate::from_session(session, metadata).with_status(SyncStatus::InProgress);
        self.repos.update_info(&id, &update)?;

        info!(instance = %id, version = metadata.version, "Sync is in progress");
        Ok(id)
    }

    /// IN_PROGRESS → TIMEOUT. Returns whether the status changed.
    pub fn timeout(&self, id: &InstanceId) -> Result<bool> {
        if !self.repos.exists(id) {
            return Ok(false);
        }
        let changed =
            self.repos
                .set_sync_status_if(id, SyncStatus::InProgress, SyncStatus::Timeout)?;
        if changed {
            info!(instance = %id, "Sync has been timed out");
        }
        Ok(changed)
    }

    /// Apply [`timeout`](Self::timeout) to every repository.
    ///
    /// Used after a restart, when every session that was mid-flight is dead.
    /// A failing repository is logged and skipped. Returns how many moved.
    pub fn timeout_all(&self) -> Result<usize> {
        info!("Timing out all the repositories");

        let mut timed_out = 0;
        for id in self.repos.list_instances()? {
            match self.timeout(&id) {
                Ok(true) => timed_out += 1,
                Ok(false) => {}
                Err(e) => warn!(instance = %id, "Cannot update the repository: {e}"),
            }
        }
        Ok(timed_out)
    }

    /// Overwrite the status unconditionally. Missing repositories are ignored.
    pub fn set_status(&self, id: &InstanceId, status: SyncStatus) -> Result<bool> {
        if !self.repos.exists(id) {
            return Ok(false);
        }
        self.repos.set_sync_status(id, status)?;
        Ok(true)
    }

    /// Mark a sync as successfully completed.
    pub fn end(&self, id: &InstanceId) -> Result<bool> {
        let ended = self.set_status(id, SyncStatus::Idle)?;
        if ended {
            info!(instance = %id, "Sync ended");
        }
        Ok(ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn machine() -> (TempDir, RepositoryStore, SyncMachine) {
        let dir = tempfile::tempdir().expect("tempdir");
        let repos = RepositoryStore::new(dir.path().join("evidence"));
        let sync = SyncMachine::new(repos.clone());
        (dir, repos, sync)
    }

    fn session(instance: &str) -> SessionContext {
        SessionContext {
            ident: "RCS_0000000001".to_string(),
            instance: instance.to_string(),
            platform: "osx".to_string(),
            level: "scout".to_string(),
            demo: false,
        }
    }

    fn metadata() -> SyncMetadata {
        SyncMetadata {
            version: 2012041601,
            user: "alice".to_string(),
            device: "MacBook".to_string(),
            source: "192.0.2.10".to_string(),
            time: 1_700_000_000,
        }
    }

    fn status(repos: &RepositoryStore, id: &InstanceId) -> SyncStatus {
        repos.read_info(id).expect("read info").sync_status
    }

    #[test]
    fn test_start_creates_repository() {
        let (_dir, repos, sync) = machine();
        let id = sync.start(&session("a"), &metadata()).expect("start");
        assert!(repos.exists(&id));

        let info = repos.read_info(&id).expect("read");
        assert_eq!(info.sync_status, SyncStatus::InProgress);
        assert_eq!(info.ident, "RCS_0000000001");
        assert_eq!(info.instance, "a");
        assert_eq!(info.platform, "osx");
        assert_eq!(info.level, "scout");
        assert_eq!(info.user, "alice");
        assert_eq!(info.source, "192.0.2.10");
        assert_eq!(info.sync_time, 1_700_000_000);
    }

    #[test]
    fn test_start_then_timeout() {
        let (_dir, repos, sync) = machine();
        let id = sync.start(&session("a"), &metadata()).expect("start");
        assert!(sync.timeout(&id).expect("timeout"));
        assert_eq!(status(&repos, &id), SyncStatus::Timeout);
    }

    #[test]
    fn test_start_then_end() {
        let (_dir, repos, sync) = machine();
        let id = sync.start(&session("a"), &metadata()).expect("start");
        assert!(sync.end(&id).expect("end"));
        assert_eq!(status(&repos, &id), SyncStatus::Idle);
    }

    #[test]
    fn test_timeout_on_idle_is_noop() {
        let (_dir, repos, sync) = machine();
        let id = sync.start(&session("a"), &metadata()).expect("start");
        sync.end(&id).expect("end");
        assert!(!sync.timeout(&id).expect("timeout"));
        assert_eq!(status(&repos, &id), SyncStatus::Idle);
    }

    #[test]
    fn test_timeout_does_not_clobber_processing() {
        let (_dir, repos, sync) = machine();
        let id = sync.start(&session("a"), &metadata()).expect("start");
        sync.set_status(&id, SyncStatus::Processing).expect("status");
        assert!(!sync.timeout(&id).expect("timeout"));
        assert_eq!(status(&repos, &id), SyncStatus::Processing);
    }

    #[test]
    fn test_missing_repository_is_noop() {
        let (_dir, repos, sync) = machine();
        let id = InstanceId::new("RCS_0000000001", "ghost").expect("id");
        assert!(!sync.timeout(&id).expect("timeout"));
        assert!(!sync.set_status(&id, SyncStatus::Processing).expect("status"));
        assert!(!sync.end(&id).expect("end"));
        assert!(!repos.exists(&id));
    }

    #[test]
    fn test_timeout_all_only_touches_in_progress() {
        let (_dir, repos, sync) = machine();
        let running = sync.start(&session("running"), &metadata()).expect("start");
        let done = sync.start(&session("done"), &metadata()).expect("start");
        sync.end(&done).expect("end");
        let busy = sync.start(&session("busy"), &metadata()).expect("start");
        sync.set_status(&busy, SyncStatus::Processing).expect("status");

        assert_eq!(sync.timeout_all().expect("timeout all"), 1);
        assert_eq!(status(&repos, &running), SyncStatus::Timeout);
        assert_eq!(status(&repos, &done), SyncStatus::Idle);
        assert_eq!(status(&repos, &busy), SyncStatus::Processing);
    }

    #[test]
    fn test_timeout_all_skips_corrupt_repository() {
        let (_dir, repos, sync) = machine();
        let running = sync.start(&session("running"), &metadata()).expect("start");
        std::fs::write(repos.dir().join("RCS_0000000001_broken"), vec![0x11u8; 2048])
            .expect("write garbage");

        assert_eq!(sync.timeout_all().expect("timeout all"), 1);
        assert_eq!(status(&repos, &running), SyncStatus::Timeout);
    }

    #[test]
    fn test_restart_after_timeout() {
        let (_dir, repos, sync) = machine();
        let id = sync.start(&session("a"), &metadata()).expect("start");
        sync.timeout(&id).expect("timeout");
        let mut later = metadata();
        later.time += 3600;
        sync.start(&session("a"), &later).expect("restart");

        let info = repos.read_info(&id).expect("read");
        assert_eq!(info.sync_status, SyncStatus::InProgress);
        assert_eq!(info.sync_time, 1_700_003_600);
    }
}
