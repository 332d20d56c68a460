//! Evidence table query functions.

use collector_types::EvidenceId;
use rusqlite::Connection;

use crate::{DbError, Result};

/// Append one evidence record and return its id.
pub fn insert(conn: &Connection, size: u64, content: &[u8]) -> Result<EvidenceId> {
    let size = i64::try_from(size)
        .map_err(|e| DbError::Sqlite(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))?;
    conn.execute(
        "INSERT INTO evidence (size, content) VALUES (?1, ?2)",
        rusqlite::params![size, content],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Fetch the content of one record.
pub fn get(conn: &Connection, id: EvidenceId) -> Result<Vec<u8>> {
    conn.query_row("SELECT content FROM evidence WHERE id = ?1", [id], |row| {
        row.get(0)
    })
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("evidence {id}")),
        other => DbError::Sqlite(other),
    })
}

/// Delete one record. Returns whether it existed.
pub fn delete(conn: &Connection, id: EvidenceId) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM evidence WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

/// Declared sizes of all records, in arrival order.
pub fn sizes(conn: &Connection) -> Result<Vec<u64>> {
    let mut stmt = conn.prepare("SELECT size FROM evidence ORDER BY id ASC")?;
    let raw = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    raw.into_iter()
        .map(|size| {
            u64::try_from(size)
                .map_err(|_| DbError::Corrupt(format!("evidence size out of range: {size}")))
        })
        .collect()
}

/// Ids of all records, in arrival order.
pub fn ids(conn: &Connection) -> Result<Vec<EvidenceId>> {
    let mut stmt = conn.prepare("SELECT id FROM evidence ORDER BY id ASC")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Number of records held.
pub fn count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM evidence", [], |row| row.get(0))?;
    u64::try_from(count).map_err(|_| DbError::Corrupt(format!("evidence count {count}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    #[test]
    fn test_insert_and_get() {
        let conn = test_db();
        let id = insert(&conn, 5, b"hello").expect("insert");
        assert_eq!(get(&conn, id).expect("get"), b"hello");
        assert_eq!(count(&conn).expect("count"), 1);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let conn = test_db();
        let a = insert(&conn, 1, b"a").expect("insert");
        let b = insert(&conn, 1, b"b").expect("insert");
        let c = insert(&conn, 1, b"c").expect("insert");
        assert!(a < b && b < c);
        assert_eq!(ids(&conn).expect("ids"), vec![a, b, c]);
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let conn = test_db();
        let first = insert(&conn, 1, b"x").expect("insert");
        let last = insert(&conn, 1, b"y").expect("insert");
        assert!(delete(&conn, last).expect("delete"));
        let next = insert(&conn, 1, b"z").expect("insert");
        assert!(next > last, "id {next} reused (last was {last})");
        assert_eq!(ids(&conn).expect("ids"), vec![first, next]);
    }

    #[test]
    fn test_get_missing() {
        let conn = test_db();
        assert!(matches!(get(&conn, 99), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_delete_missing() {
        let conn = test_db();
        assert!(!delete(&conn, 7).expect("delete"));
    }

    #[test]
    fn test_sizes_in_arrival_order() {
        let conn = test_db();
        insert(&conn, 300, &[0u8; 3]).expect("insert");
        insert(&conn, 100, &[0u8; 1]).expect("insert");
        insert(&conn, 200, &[0u8; 2]).expect("insert");
        assert_eq!(sizes(&conn).expect("sizes"), vec![300, 100, 200]);
    }

    #[test]
    fn test_empty_blob() {
        let conn = test_db();
        let id = insert(&conn, 0, &[]).expect("insert");
        assert!(get(&conn, id).expect("get").is_empty());
    }

    #[test]
    fn test_negative_size_is_corrupt() {
        let conn = test_db();
        insert(&conn, 1, b"a").expect("insert");
        conn.execute("UPDATE evidence SET size = -1", [])
            .expect("raw update");
        assert!(matches!(sizes(&conn), Err(DbError::Corrupt(_))));
    }

    #[test]
    fn test_oversized_size_rejected() {
        let conn = test_db();
        assert!(insert(&conn, u64::MAX, b"a").is_err());
        assert_eq!(count(&conn).expect("count"), 0);
    }
}
