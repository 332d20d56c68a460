//! Integration test: one agent session end to end.
//!
//! Exercises the whole ingestion path through the facade:
//! 1. Sync start creates the repository and records the session
//! 2. Whole and chunked evidence uploads land in the repository
//! 3. A chunked upload survives a process restart and resumes
//! 4. The offload side reads and deletes pending evidence
//! 5. Sync end, then retention removes the drained repository
//!
//! The repository file is also opened directly with rusqlite to check
//! what is actually persisted.

use collector_evidence::{EvidenceConfig, EvidenceManager, PurgeOutcome, PurgeReason};
use collector_types::{PurgeOptions, SessionContext, SyncMetadata, SyncStatus};

/// Simulated sync timestamp.
const SYNC_TIME: u64 = 1_700_000_000;

fn session() -> SessionContext {
    SessionContext {
        ident: "RCS_0000000123".to_string(),
        instance: "f00dbabe".to_string(),
        platform: "windows".to_string(),
        level: "elite".to_string(),
        demo: false,
    }
}

fn metadata() -> SyncMetadata {
    SyncMetadata {
        version: 2014012401,
        user: "carol".to_string(),
        device: "WORKSTATION-3".to_string(),
        source: "203.0.113.77".to_string(),
        time: SYNC_TIME,
    }
}

#[test]
fn full_session_start_upload_offload_purge() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = EvidenceConfig::under(dir.path());
    let manager = EvidenceManager::new(&config);

    // =========================================================
    // Step 1: Sync start
    // =========================================================
    let id = manager.sync_start(&session(), &metadata()).expect("sync start");
    assert_eq!(id.as_str(), "RCS_0000000123_f00dbabe");
    assert!(config.repo_dir.join("RCS_0000000123_f00dbabe").is_file());

    let info = manager.instance_info(&id).expect("info");
    assert_eq!(info.sync_status, SyncStatus::InProgress);
    assert_eq!(info.device, "WORKSTATION-3");
    assert_eq!(info.version, 2014012401);

    // =========================================================
    // Step 2: Whole and chunked uploads
    // =========================================================
    let whole = manager.store_evidence(&id, 4, b"log1").expect("store");

    let payload: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
    let mut offset = 0u32;
    let mut chunked = None;
    for piece in payload.chunks(1024) {
        let len = u32::try_from(piece.len()).expect("len");
        let receipt = manager
            .store_evidence_chunk(&id, 42, offset, len, 3000, piece)
            .expect("chunk");
        offset = receipt.base_offset;
        if let Some(evidence_id) = receipt.evidence_id {
            assert_eq!(receipt.payload.as_deref(), Some(payload.as_slice()));
            chunked = Some(evidence_id);
        }
    }
    let chunked = chunked.expect("upload completed");
    assert_eq!(offset, 3000);
    assert_eq!(manager.evidence_ids(&id).expect("ids"), vec![whole, chunked]);
    assert_eq!(manager.evidence_info(&id).expect("sizes"), vec![4, 3000]);

    // =========================================================
    // Step 3: What is on disk
    // =========================================================
    {
        let conn = rusqlite::Connection::open(config.repo_dir.join(id.as_str())).expect("open");
        let (ident, status): (String, i64) = conn
            .query_row("SELECT ident, sync_status FROM info", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .expect("info row");
        assert_eq!(ident, "RCS_0000000123");
        assert_eq!(status, SyncStatus::InProgress.as_i64());

        let stored: Vec<u8> = conn
            .query_row("SELECT content FROM evidence WHERE id = ?1", [chunked], |row| {
                row.get(0)
            })
            .expect("evidence row");
        assert_eq!(stored, payload);
    }

    // =========================================================
    // Step 4: Offload
    // =========================================================
    for evidence_id in manager.evidence_ids(&id).expect("ids") {
        let content = manager.get_evidence(&id, evidence_id).expect("get");
        assert!(!content.is_empty());
        assert!(manager.delete_evidence(&id, evidence_id).expect("delete"));
    }
    assert!(manager.evidence_ids(&id).expect("ids").is_empty());

    // =========================================================
    // Step 5: End, then retention
    // =========================================================
    manager.sync_end(&id).expect("end");
    assert_eq!(manager.instance_info(&id).expect("info").sync_status, SyncStatus::Idle);

    let expired = manager
        .lifecycle()
        .purge_at(&id, PurgeOptions::default(), SYNC_TIME + 8 * 86_400)
        .expect("purge");
    assert_eq!(expired, PurgeOutcome::Deleted(PurgeReason::Expired));
    assert!(manager.instances().expect("instances").is_empty());
}

#[test]
fn chunked_upload_resumes_across_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = EvidenceConfig::under(dir.path());

    let id = {
        let manager = EvidenceManager::new(&config);
        let id = manager.sync_start(&session(), &metadata()).expect("start");
        let receipt = manager
            .store_evidence_chunk(&id, 7, 0, 5, 10, b"ABCDE")
            .expect("first half");
        assert_eq!(receipt.base_offset, 5);
        id
    };

    // New process: the in-flight sync is dead, the transfer file is not.
    let manager = EvidenceManager::new(&config);
    assert_eq!(manager.sync_timeout_all().expect("recovery"), 1);
    let pending = manager.transfers().pending(&id).expect("pending").expect("header");
    assert_eq!(pending.id, 7);
    assert_eq!(pending.base_offset, 5);
    assert_eq!(pending.total_size, 10);

    // The agent reconnects and retransmits the first half; it is told to skip.
    manager.sync_start(&session(), &metadata()).expect("restart");
    let resync = manager
        .store_evidence_chunk(&id, 7, 0, 5, 10, b"ABCDE")
        .expect("resend");
    assert_eq!(resync.base_offset, 5);
    assert!(resync.payload.is_none());

    let done = manager
        .store_evidence_chunk(&id, 7, 5, 5, 10, b"FGHIJ")
        .expect("second half");
    assert_eq!(done.base_offset, 10);
    let evidence_id = done.evidence_id.expect("stored");
    assert_eq!(manager.get_evidence(&id, evidence_id).expect("get"), b"ABCDEFGHIJ");
    assert!(manager.transfers().pending(&id).expect("pending").is_none());
}

#[test]
fn new_transfer_replaces_abandoned_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = EvidenceManager::new(&EvidenceConfig::under(dir.path()));
    let id = manager.sync_start(&session(), &metadata()).expect("start");

    manager.store_evidence_chunk(&id, 1, 0, 3, 9, b"old").expect("abandoned");

    // A different transfer id means start over from zero.
    let restart = manager
        .store_evidence_chunk(&id, 2, 0, 4, 4, b"new!")
        .expect("mismatch");
    assert_eq!(restart.base_offset, 0);
    assert!(manager.transfers().pending(&id).expect("pending").is_none());

    let done = manager
        .store_evidence_chunk(&id, 2, 0, 4, 4, b"new!")
        .expect("fresh");
    assert_eq!(done.base_offset, 4);
    assert_eq!(manager.evidence_info(&id).expect("sizes"), vec![4]);
}
