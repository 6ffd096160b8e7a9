use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::Serialize;

use crate::api::{ArtifactDrop, MissionRecord};
use crate::reference::items::Rarity;
use crate::reference::{DurationType, Ship};

// ── Column codecs ──────────────────────────────────────────────────

fn text_column<T>(value: ValueRef<'_>, parse: fn(&str) -> Option<T>) -> FromSqlResult<T> {
    let s = value.as_str()?;
    parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown code {s:?}").into()))
}

impl ToSql for Ship {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for Ship {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value, Ship::from_code)
    }
}

impl ToSql for DurationType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for DurationType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value, DurationType::from_code)
    }
}

impl ToSql for Rarity {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for Rarity {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_column(value, Rarity::from_code)
    }
}

// ── Missions ───────────────────────────────────────────────────────

/// Stored mission ids for an account, in fetch order.
pub fn list_mission_ids(conn: &Connection, account_id: &str) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT mission_id FROM missions WHERE account_id = ?1 ORDER BY seq")?;
    let rows = stmt.query_map(params![account_id], |row| row.get(0))?;
    rows.collect()
}

const MISSION_COLUMNS: &str = "mission_id, ship, duration_type, level, capacity,
     start_timestamp, duration_seconds, target";

fn mission_from_row(row: &rusqlite::Row<'_>) -> Result<MissionRecord, rusqlite::Error> {
    Ok(MissionRecord {
        identifier: row.get(0)?,
        ship: row.get(1)?,
        duration_type: row.get(2)?,
        level: row.get(3)?,
        capacity: row.get(4)?,
        start_timestamp: row.get(5)?,
        duration_seconds: row.get(6)?,
        target: row.get(7)?,
        drops: Vec::new(),
    })
}

fn load_drops(
    conn: &Connection,
    account_id: &str,
    mission_id: &str,
) -> Result<Vec<ArtifactDrop>, rusqlite::Error> {
    let mut stmt = conn.prepare_cached(
        "SELECT name, level, rarity FROM mission_drops
         WHERE account_id = ?1 AND mission_id = ?2 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![account_id, mission_id], |row| {
        Ok(ArtifactDrop {
            name: row.get(0)?,
            level: row.get(1)?,
            rarity: row.get(2)?,
        })
    })?;
    rows.collect()
}

/// Every stored record for an account with drops, in fetch order.
pub fn list_mission_records(
    conn: &Connection,
    account_id: &str,
) -> Result<Vec<MissionRecord>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MISSION_COLUMNS} FROM missions WHERE account_id = ?1 ORDER BY seq"
    ))?;
    let mut records = stmt
        .query_map(params![account_id], mission_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for record in &mut records {
        record.drops = load_drops(conn, account_id, &record.identifier)?;
    }
    Ok(records)
}

pub fn get_mission_record(
    conn: &Connection,
    account_id: &str,
    mission_id: &str,
) -> Result<Option<MissionRecord>, rusqlite::Error> {
    let record = conn
        .query_row(
            &format!(
                "SELECT {MISSION_COLUMNS} FROM missions WHERE account_id = ?1 AND mission_id = ?2"
            ),
            params![account_id, mission_id],
            mission_from_row,
        )
        .optional()?;
    match record {
        Some(mut record) => {
            record.drops = load_drops(conn, account_id, mission_id)?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

/// Upsert one record and its drops atomically. An existing row keeps its
/// position in fetch order.
pub fn put_mission_record(
    conn: &mut Connection,
    account_id: &str,
    record: &MissionRecord,
) -> Result<(), rusqlite::Error> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO missions (
            account_id, mission_id, ship, duration_type, level, capacity,
            start_timestamp, duration_seconds, target, fetched_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))
        ON CONFLICT(account_id, mission_id) DO UPDATE SET
            ship=excluded.ship, duration_type=excluded.duration_type, level=excluded.level,
            capacity=excluded.capacity, start_timestamp=excluded.start_timestamp,
            duration_seconds=excluded.duration_seconds, target=excluded.target,
            fetched_at=excluded.fetched_at",
        params![
            account_id,
            record.identifier,
            record.ship,
            record.duration_type,
            record.level,
            record.capacity,
            record.start_timestamp,
            record.duration_seconds,
            record.target,
        ],
    )?;
    tx.execute(
        "DELETE FROM mission_drops WHERE account_id = ?1 AND mission_id = ?2",
        params![account_id, record.identifier],
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO mission_drops (account_id, mission_id, position, name, level, rarity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (position, item) in record.drops.iter().enumerate() {
            stmt.execute(params![
                account_id,
                record.identifier,
                position as i64,
                item.name,
                item.level,
                item.rarity,
            ])?;
        }
    }
    tx.commit()
}

pub fn count_missions(conn: &Connection, account_id: &str) -> Result<i64, rusqlite::Error> {
    conn.query_row(
        "SELECT COUNT(*) FROM missions WHERE account_id = ?1",
        params![account_id],
        |row| row.get(0),
    )
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Sync Runs ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRun {
    pub id: i64,
    pub account_id: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub missions_total: i64,
    pub missions_fetched: i64,
    pub missions_failed: i64,
    pub error_message: Option<String>,
    pub exported_files: Vec<String>,
}

pub fn insert_sync_run(conn: &Connection, account_id: &str) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO sync_runs (account_id, status, started_at)
         VALUES (?1, 'running', datetime('now'))",
        params![account_id],
    )?;
    Ok(conn.last_insert_rowid())
}

#[allow(clippy::too_many_arguments)]
pub fn finish_sync_run(
    conn: &Connection,
    run_id: i64,
    status: &str,
    missions_total: usize,
    missions_fetched: usize,
    missions_failed: usize,
    error_message: Option<&str>,
    exported_files: &[String],
) -> Result<(), rusqlite::Error> {
    let exported = if exported_files.is_empty() {
        None
    } else {
        Some(exported_files.join("\n"))
    };
    conn.execute(
        "UPDATE sync_runs SET
            status = ?2, completed_at = datetime('now'),
            missions_total = ?3, missions_fetched = ?4, missions_failed = ?5,
            error_message = ?6, exported_files = ?7
         WHERE id = ?1",
        params![
            run_id,
            status,
            missions_total as i64,
            missions_fetched as i64,
            missions_failed as i64,
            error_message,
            exported,
        ],
    )?;
    Ok(())
}

fn sync_run_from_row(row: &rusqlite::Row<'_>) -> Result<SyncRun, rusqlite::Error> {
    let exported: Option<String> = row.get(9)?;
    Ok(SyncRun {
        id: row.get(0)?,
        account_id: row.get(1)?,
        status: row.get(2)?,
        started_at: row.get(3)?,
        completed_at: row.get(4)?,
        missions_total: row.get(5)?,
        missions_fetched: row.get(6)?,
        missions_failed: row.get(7)?,
        error_message: row.get(8)?,
        exported_files: exported
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default(),
    })
}

const SYNC_RUN_COLUMNS: &str = "id, account_id, status, started_at, completed_at,
     missions_total, missions_fetched, missions_failed, error_message, exported_files";

pub fn last_sync_run(conn: &Connection, account_id: &str) -> Result<Option<SyncRun>, rusqlite::Error> {
    conn.query_row(
        &format!(
            "SELECT {SYNC_RUN_COLUMNS} FROM sync_runs WHERE account_id = ?1
             ORDER BY id DESC LIMIT 1"
        ),
        params![account_id],
        sync_run_from_row,
    )
    .optional()
}

/// Latest run of every account, most recent first.
pub fn latest_sync_runs(conn: &Connection) -> Result<Vec<SyncRun>, rusqlite::Error> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SYNC_RUN_COLUMNS} FROM sync_runs
         WHERE id IN (SELECT MAX(id) FROM sync_runs GROUP BY account_id)
         ORDER BY id DESC"
    ))?;
    let rows = stmt.query_map([], sync_run_from_row)?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    fn record(id: &str, start: f64) -> MissionRecord {
        MissionRecord {
            identifier: id.to_string(),
            ship: Ship::Henerprise,
            duration_type: DurationType::Epic,
            level: 2,
            capacity: 48,
            start_timestamp: start,
            duration_seconds: 172_800.0,
            target: Some("BOOK_OF_BASAN".to_string()),
            drops: vec![
                ArtifactDrop {
                    name: "SOUL_STONE".to_string(),
                    level: 1,
                    rarity: Rarity::Common,
                },
                ArtifactDrop {
                    name: "LUNAR_TOTEM".to_string(),
                    level: 3,
                    rarity: Rarity::Legendary,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_config(conn, "api_base_url", "http://localhost")?;
                let val = get_config(conn, "api_base_url")?;
                assert_eq!(val, Some("http://localhost".to_string()));

                let missing = get_config(conn, "nonexistent")?;
                assert_eq!(missing, None);
                assert_eq!(list_config(conn)?.len(), 1);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_mission_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                put_mission_record(conn, "EI1", &record("M1", 100.0))?;
                let loaded = get_mission_record(conn, "EI1", "M1")?.unwrap();
                assert_eq!(loaded, record("M1", 100.0));

                assert_eq!(get_mission_record(conn, "EI1", "missing")?, None);
                assert_eq!(get_mission_record(conn, "EI2", "M1")?, None);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_is_upsert_and_keeps_order() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                put_mission_record(conn, "EI1", &record("M2", 200.0))?;
                put_mission_record(conn, "EI1", &record("M1", 100.0))?;

                let mut again = record("M2", 200.0);
                again.drops.truncate(1);
                put_mission_record(conn, "EI1", &again)?;

                assert_eq!(list_mission_ids(conn, "EI1")?, vec!["M2", "M1"]);
                assert_eq!(count_missions(conn, "EI1")?, 2);

                let records = list_mission_records(conn, "EI1")?;
                assert_eq!(records[0].drops.len(), 1);
                assert_eq!(records[1].drops.len(), 2);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missions_are_scoped_by_account() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                put_mission_record(conn, "EI1", &record("M1", 100.0))?;
                put_mission_record(conn, "EI2", &record("M1", 100.0))?;
                assert_eq!(count_missions(conn, "EI1")?, 1);
                assert_eq!(count_missions(conn, "EI3")?, 0);
                assert!(list_mission_records(conn, "EI3")?.is_empty());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sync_run_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let first = insert_sync_run(conn, "EI1")?;
                finish_sync_run(conn, first, "failed", 5, 4, 1, Some("1 of 5 missions failed"), &[])?;
                let second = insert_sync_run(conn, "EI1")?;
                assert!(second > first);
                let files = vec!["exports/missions/a.xlsx".to_string(), "exports/missions/a.csv".to_string()];
                finish_sync_run(conn, second, "success", 1, 1, 0, None, &files)?;
                insert_sync_run(conn, "EI2")?;

                let last = last_sync_run(conn, "EI1")?.unwrap();
                assert_eq!(last.status, "success");
                assert_eq!(last.exported_files, files);
                assert!(last.completed_at.is_some());

                let latest = latest_sync_runs(conn)?;
                assert_eq!(latest.len(), 2);
                assert_eq!(latest[0].account_id, "EI2");
                assert_eq!(latest[0].status, "running");
                assert_eq!(last_sync_run(conn, "EI9")?, None);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }
}
