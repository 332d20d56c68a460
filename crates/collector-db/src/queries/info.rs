//! Info row query functions.
//!
//! The `info` table holds exactly one row. Every write is an in-place
//! `UPDATE` with bound parameters; column names come only from this module.

use collector_types::{InfoRecord, SessionContext, SyncMetadata, SyncStatus};
use rusqlite::types::Value;
use rusqlite::Connection;

use crate::{DbError, Result};

/// Field-level update of the info row. `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InfoUpdate {
    pub ident: Option<String>,
    pub instance: Option<String>,
    pub platform: Option<String>,
    pub demo: Option<bool>,
    pub level: Option<String>,
    pub version: Option<u32>,
    pub user: Option<String>,
    pub device: Option<String>,
    pub source: Option<String>,
    pub sync_time: Option<u64>,
    pub sync_status: Option<SyncStatus>,
}

impl InfoUpdate {
    /// Everything a sync start records: session identity plus agent metadata.
    pub fn from_session(session: &SessionContext, metadata: &SyncMetadata) -> Self {
        Self {
            ident: Some(session.ident.clone()),
            instance: Some(session.instance.clone()),
            platform: Some(session.platform.clone()),
            demo: Some(session.demo),
            level: Some(session.level.clone()),
            version: Some(metadata.version),
            user: Some(metadata.user.clone()),
            device: Some(metadata.device.clone()),
            source: Some(metadata.source.clone()),
            sync_time: Some(metadata.time),
            sync_status: None,
        }
    }

    /// Set the sync status as part of this update.
    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }

    fn assignments(&self) -> Result<Vec<(&'static str, Value)>> {
        let sync_time = self
            .sync_time
            .map(|t| i64::try_from(t).map(Value::Integer))
            .transpose()
            .map_err(|e| DbError::Sqlite(rusqlite::Error::ToSqlConversionFailure(Box::new(e))))?;
        let text = |v: &Option<String>| v.clone().map(Value::Text);
        let fields = [
            ("ident", text(&self.ident)),
            ("instance", text(&self.instance)),
            ("platform", text(&self.platform)),
            ("demo", self.demo.map(|d| Value::Integer(i64::from(d)))),
            ("level", text(&self.level)),
            ("version", self.version.map(|v| Value::Integer(i64::from(v)))),
            ("user", text(&self.user)),
            ("device", text(&self.device)),
            ("source", text(&self.source)),
            ("sync_time", sync_time),
            (
                "sync_status",
                self.sync_status.map(|s| Value::Integer(s.as_i64())),
            ),
        ];
        Ok(fields
            .into_iter()
            .filter_map(|(column, value)| value.map(|v| (column, v)))
            .collect())
    }
}

/// Insert the default row if the table is empty.
pub fn insert_default(conn: &Connection) -> Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM info", [], |row| row.get(0))?;
    if count == 0 {
        conn.execute(
            "INSERT INTO info (ident, instance, platform, demo, level, version,
                               user, device, source, sync_time, sync_status)
             VALUES ('', '', '', 0, '', 0, '', '', '', 0, ?1)",
            [SyncStatus::Idle.as_i64()],
        )?;
    }
    Ok(())
}

/// Read the info row.
///
/// NULL columns, as left by collectors that predate the `NOT NULL`
/// schema, read as empty or zero.
pub fn read(conn: &Connection) -> Result<InfoRecord> {
    let (record, raw_version, raw_sync_time, raw_status) = conn
        .query_row(
            "SELECT COALESCE(ident, ''), COALESCE(instance, ''), COALESCE(platform, ''),
                    COALESCE(demo, 0), COALESCE(level, ''), COALESCE(version, 0),
                    COALESCE(user, ''), COALESCE(device, ''), COALESCE(source, ''),
                    COALESCE(sync_time, 0), COALESCE(sync_status, 0)
             FROM info LIMIT 1",
            [],
            |row| {
                let record = InfoRecord {
                    ident: row.get(0)?,
                    instance: row.get(1)?,
                    platform: row.get(2)?,
                    demo: row.get::<_, i64>(3)? != 0,
                    level: row.get(4)?,
                    user: row.get(6)?,
                    device: row.get(7)?,
                    source: row.get(8)?,
                    ..InfoRecord::default()
                };
                Ok((
                    record,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(9)?,
                    row.get::<_, i64>(10)?,
                ))
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::Corrupt("info row missing".into()),
            other => DbError::Sqlite(other),
        })?;

    let version = u32::try_from(raw_version)
        .map_err(|_| DbError::Corrupt(format!("info version out of range: {raw_version}")))?;
    let sync_time = u64::try_from(raw_sync_time)
        .map_err(|_| DbError::Corrupt(format!("info sync_time out of range: {raw_sync_time}")))?;
    let sync_status =
        SyncStatus::try_from(raw_status).map_err(|e| DbError::Corrupt(e.to_string()))?;
    Ok(InfoRecord {
        version,
        sync_time,
        sync_status,
        ..record
    })
}

/// Apply a field-level update. Returns the number of rows touched.
pub fn update(conn: &Connection, update: &InfoUpdate) -> Result<usize> {
    let assignments = update.assignments()?;
    if assignments.is_empty() {
        return Ok(0);
    }

    let set_clause = assignments
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE info SET {set_clause}");
    let values = assignments.into_iter().map(|(_, value)| value);

    let updated = conn.execute(&sql, rusqlite::params_from_iter(values))?;
    Ok(updated)
}

/// Overwrite the sync status unconditionally.
pub fn set_status(conn: &Connection, status: SyncStatus) -> Result<()> {
    conn.execute("UPDATE info SET sync_status = ?1", [status.as_i64()])?;
    Ok(())
}

/// Move the sync status from `from` to `to`. Returns whether it changed.
pub fn set_status_if(conn: &Connection, from: SyncStatus, to: SyncStatus) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE info SET sync_status = ?1 WHERE sync_status = ?2",
        [to.as_i64(), from.as_i64()],
    )?;
    Ok(updated > 0)
}
