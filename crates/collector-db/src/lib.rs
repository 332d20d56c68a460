//! # collector-db
//!
//! Repository store for the evidence collector.
//! Every agent instance owns one SQLite file at `$repo_dir/<ident_instance>`.
//!
//! ## Schema
//!
//! - `info`: exactly one row, created with empty defaults and updated in place
//! - `evidence`: append-only `(id, size, content)`, ids never reused
//! - WAL mode, schema version stored in `PRAGMA user_version`
//!
//! Connections are opened per operation and never shared between instances.

pub mod migrations;
pub mod queries;
pub mod repository;
pub mod schema;

pub use queries::info::InfoUpdate;
pub use repository::{CompactOutcome, RepositoryStore};

use rusqlite::{Connection, ErrorCode, OpenFlags};
use std::path::Path;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupted repository: {0}")]
    Corrupt(String),

    #[error("migration failed: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Create the repository at `path` if needed and bring its schema up to date.
pub fn create(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn).map_err(classify)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an existing repository without creating anything.
///
/// A file that is not a database, or that never had its schema applied,
/// is reported as [`DbError::Corrupt`].
pub fn open_existing(path: &Path) -> Result<Connection> {
    if !path.exists() {
        return Err(DbError::NotFound(path.display().to_string()));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    configure(&conn).map_err(classify)?;
    migrations::check(&conn)?;
    Ok(conn)
}

/// Open an in-memory repository (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(())
}

/// Whether SQLite rejected the file because it is not a database.
pub(crate) fn is_not_a_database(err: &rusqlite::Error) -> bool {
    err.sqlite_error_code() == Some(ErrorCode::NotADatabase)
}

/// Turn "not a database" failures into [`DbError::Corrupt`].
pub(crate) fn classify(err: DbError) -> DbError {
    match err {
        DbError::Sqlite(e) if is_not_a_database(&e) => DbError::Corrupt(e.to_string()),
        other => other,
    }
}
