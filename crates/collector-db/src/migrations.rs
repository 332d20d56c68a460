//! Repository schema setup.
//!
//! Schema version stored in `PRAGMA user_version`. A fresh file gets the full
//! schema and its singleton info row in one transaction, so a repository
//! either has both tables and the info row or creation failed.

use rusqlite::Connection;

use crate::queries::info;
use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<()> {
    let current_version = user_version(conn)?;

    if current_version == 0 {
        tracing::debug!("Initializing repository schema v{SCHEMA_VERSION}");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(schema::SCHEMA_V1)?;
        info::insert_default(&tx)?;
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tx.commit()?;
    } else if current_version < SCHEMA_VERSION {
        for version in (current_version + 1)..=SCHEMA_VERSION {
            tracing::info!("Running repository migration to v{version}");
            run_migration(conn, version)?;
            conn.pragma_update(None, "user_version", version)?;
        }
    } else if current_version > SCHEMA_VERSION {
        return Err(newer_than_supported(current_version));
    }

    Ok(())
}

/// Verify an existing repository.
///
/// A file with both tables but no recorded version was written before
/// versioning existed; it is adopted as v1 and stamped. A file with neither
/// is reported as corrupt.
pub fn check(conn: &Connection) -> Result<()> {
    match user_version(conn)? {
        0 if has_table(conn, "info")? && has_table(conn, "evidence")? => {
            tracing::info!("Adopting unversioned repository as v{SCHEMA_VERSION}");
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            Ok(())
        }
        0 => Err(DbError::Corrupt("repository schema missing".to_string())),
        v if v > SCHEMA_VERSION => Err(newer_than_supported(v)),
        _ => Ok(()),
    }
}

fn has_table(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn user_version(conn: &Connection) -> Result<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| crate::classify(DbError::Sqlite(e)))
}

fn newer_than_supported(version: u32) -> DbError {
    DbError::Migration(format!(
        "Repository version {version} is newer than supported {SCHEMA_VERSION}"
    ))
}

/// Run a specific migration.
fn run_migration(_conn: &Connection, version: u32) -> Result<()> {
    Err(DbError::Migration(format!(
        "Unknown migration version: {version}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_migration() {
        let conn = Connection::open_in_memory().expect("open");
        run(&conn).expect("migrate");

        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_idempotent_migration() {
        let conn = Connection::open_in_memory().expect("open");
        run(&conn).expect("first run");
        run(&conn).expect("second run should be no-op");

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM info", [], |row| row.get(0))
            .expect("count");
        assert_eq!(rows, 1, "info row must be inserted exactly once");
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().expect("open");
        run(&conn).expect("migrate");

        for table in ["info", "evidence"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .expect("table check");
            assert_eq!(count, 1, "Table '{table}' should exist");
        }
    }

    #[test]
    fn test_check_rejects_newer_version() {
        let conn = Connection::open_in_memory().expect("open");
        run(&conn).expect("migrate");
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .expect("bump");
        assert!(matches!(check(&conn), Err(DbError::Migration(_))));
        assert!(matches!(run(&conn), Err(DbError::Migration(_))));
    }

    /// Tables as written by collectors that predate `user_version`.
    const UNVERSIONED_SCHEMA: &str = "
        CREATE TABLE info (ident CHAR(16), instance CHAR(40), platform CHAR(16),
                           demo INT, level CHAR(16), version INT, user CHAR(256),
                           device CHAR(256), source CHAR(256), sync_time INT,
                           sync_status INT);
        CREATE TABLE evidence (id INTEGER PRIMARY KEY ASC, size INT, content BLOB);
        INSERT INTO info VALUES ('', '', '', 0, 0, 0, '', '', '', 0, 0);
        INSERT INTO evidence (size, content) VALUES (3, x'616263');";

    #[test]
    fn test_check_adopts_unversioned_repository() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(UNVERSIONED_SCHEMA).expect("legacy schema");

        check(&conn).expect("adopted");
        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("version");
        assert_eq!(version, SCHEMA_VERSION);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM evidence", [], |row| row.get(0))
            .expect("count");
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_run_keeps_unversioned_info_row() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch(UNVERSIONED_SCHEMA).expect("legacy schema");
        run(&conn).expect("migrate");

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM info", [], |row| row.get(0))
            .expect("count");
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_check_rejects_half_schema() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute_batch("CREATE TABLE info (ident TEXT);").expect("create");
        assert!(matches!(check(&conn), Err(DbError::Corrupt(_))));
    }

    #[test]
    fn test_check_rejects_fresh_file() {
        let conn = Connection::open_in_memory().expect("open");
        assert!(matches!(check(&conn), Err(DbError::Corrupt(_))));
    }
}
