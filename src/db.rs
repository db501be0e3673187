// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite storage for follower snapshots.

use crate::{
    snapshot::{RawRecord, SnapshotRow},
    store::{SnapshotStore, StorageError},
};
use camino::Utf8Path;
use rusqlite::{Connection, params, types::ValueRef};
use serde_json::Value;

/// Apply pragmas and create the schema.
fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    // journal_mode and synchronous persist in the database file; the rest are
    // per-connection and must be set each time.
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -64000;
        PRAGMA temp_store = MEMORY;
        "#,
    )?;

    conn.execute_batch(
        r#"
        -- Append-only snapshot log. No uniqueness on (handle, date): a re-run
        -- may add a second row for the same day, readers pick one.
        CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,              -- ISO8601 date (YYYY-MM-DD)
            display_name TEXT NOT NULL DEFAULT '',
            handle TEXT NOT NULL,            -- '@' followed by the account handle
            followers INTEGER NOT NULL,
            url TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_snapshots_date ON snapshots(date);
        CREATE INDEX IF NOT EXISTS idx_snapshots_handle ON snapshots(handle, date);
        "#,
    )?;

    Ok(())
}

/// A SQLite database used as the snapshot table.
pub struct SqliteStore {
    conn: Connection,
    description: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Utf8Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_std_path())?;
        init_db(&conn)?;
        Ok(Self {
            conn,
            description: format!("SQLite database {}", path),
        })
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            conn,
            description: "SQLite database (in memory)".to_string(),
        })
    }
}

impl SnapshotStore for SqliteStore {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn read_all(&self) -> Result<Vec<RawRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT date, display_name, handle, followers, url
             FROM snapshots
             ORDER BY id",
        )?;
        let column_names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt.query_map([], |row| {
            let mut record = RawRecord::new();
            for (i, name) in column_names.iter().enumerate() {
                let value = match row.get_ref(i)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(n) => Value::Number(n.into()),
                    ValueRef::Real(f) => serde_json::Number::from_f64(f)
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                    ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).into_owned()),
                    ValueRef::Blob(_) => Value::Null,
                };
                record.insert(name.clone(), value);
            }
            Ok(record)
        })?;

        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn append(&mut self, rows: &[SnapshotRow]) -> Result<(), StorageError> {
        // One transaction per batch: it lands in full or not at all.
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO snapshots (date, display_name, handle, followers, url)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.date_cell(),
                    row.display_name,
                    row.handle_cell(),
                    i64::try_from(row.metric_value).unwrap_or(i64::MAX),
                    row.source_url,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
