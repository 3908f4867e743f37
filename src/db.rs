use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;

/// Applicant id used when a caller does not supply one. Preserves the
/// original single-record-per-deployment behavior.
pub const DEFAULT_APPLICANT_ID: &str = "default";

#[derive(Debug)]
pub enum SaveError {
    /// The caller's expected version no longer matches the stored row.
    /// Nothing was written.
    VersionConflict { expected: i64, actual: i64 },
    Db(rusqlite::Error),
}

impl From<rusqlite::Error> for SaveError {
    fn from(e: rusqlite::Error) -> Self {
        SaveError::Db(e)
    }
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("admit.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS applicants(
            applicant_id TEXT PRIMARY KEY,
            record TEXT NOT NULL,
            version INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;

    // Early workspaces stored records without a version column. Add and
    // backfill so optimistic saves work against them.
    ensure_applicants_version(&conn)?;

    Ok(conn)
}

fn ensure_applicants_version(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "applicants", "version")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE applicants ADD COLUMN version INTEGER NOT NULL DEFAULT 1",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Loads the stored record. A missing row is an empty record at version 0,
/// never an error: a fresh applicant must not be blocked by absent state.
pub fn record_get(
    conn: &Connection,
    applicant_id: &str,
) -> Result<(Map<String, Value>, i64), rusqlite::Error> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT record, version FROM applicants WHERE applicant_id = ?",
            [applicant_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    match row {
        Some((text, version)) => {
            let record = serde_json::from_str::<Map<String, Value>>(&text).unwrap_or_default();
            Ok((record, version))
        }
        None => Ok((Map::new(), 0)),
    }
}

/// Merge-on-save: read the existing record, shallow-merge with incoming keys
/// winning, write back, return the merged result. Keys absent from the
/// incoming partial are retained, including keys this build does not know
/// about.
pub fn record_save(
    conn: &Connection,
    applicant_id: &str,
    partial: &Map<String, Value>,
    expected_version: Option<i64>,
) -> Result<(Map<String, Value>, i64), SaveError> {
    let tx = conn.unchecked_transaction()?;

    let row: Option<(String, i64)> = tx
        .query_row(
            "SELECT record, version FROM applicants WHERE applicant_id = ?",
            [applicant_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let (mut merged, current_version) = match row {
        Some((text, version)) => (
            serde_json::from_str::<Map<String, Value>>(&text).unwrap_or_default(),
            version,
        ),
        None => (Map::new(), 0),
    };

    if let Some(expected) = expected_version {
        if expected != current_version {
            let _ = tx.rollback();
            return Err(SaveError::VersionConflict {
                expected,
                actual: current_version,
            });
        }
    }

    for (key, value) in partial {
        merged.insert(key.clone(), value.clone());
    }

    let new_version = current_version + 1;
    let text = serde_json::to_string(&Value::Object(merged.clone()))
        .unwrap_or_else(|_| "{}".to_string());
    let now = chrono::Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO applicants(applicant_id, record, version, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(applicant_id) DO UPDATE SET
           record = excluded.record,
           version = excluded.version,
           updated_at = excluded.updated_at",
        (applicant_id, &text, new_version, &now),
    )?;
    tx.commit()?;

    Ok((merged, new_version))
}
