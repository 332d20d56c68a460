//! SQL schema definitions.

/// Schema for a v1 instance repository.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS info (
    ident TEXT NOT NULL DEFAULT '',
    instance TEXT NOT NULL DEFAULT '',
    platform TEXT NOT NULL DEFAULT '',
    demo INTEGER NOT NULL DEFAULT 0,
    level TEXT NOT NULL DEFAULT '',
    version INTEGER NOT NULL DEFAULT 0,
    user TEXT NOT NULL DEFAULT '',
    device TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL DEFAULT '',
    sync_time INTEGER NOT NULL DEFAULT 0,
    sync_status INTEGER NOT NULL DEFAULT 0
);

-- AUTOINCREMENT keeps deleted ids from being handed out again.
CREATE TABLE IF NOT EXISTS evidence (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    size INTEGER NOT NULL,
    content BLOB NOT NULL
);
"#;
