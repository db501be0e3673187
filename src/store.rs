// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage backends for the snapshot table.
//!
//! The table is an append-only log: the collector appends one batch per
//! cycle, everything else reads it in full. Backends make no promise about
//! duplicate `(handle, date)` pairs; the aggregator resolves those.

use crate::{
    db::SqliteStore,
    snapshot::{
        COLUMNS, DATE_ALIASES, DISPLAY_NAME_ALIASES, HANDLE_ALIASES, METRIC_ALIASES, RawRecord,
        SnapshotRow, URL_ALIASES, normalize_column,
    },
};
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;
use std::{fs::OpenOptions, io};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error in {path}")]
    Csv {
        path: Utf8PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error on {path}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} has no {column} column")]
    MissingColumn {
        path: Utf8PathBuf,
        column: &'static str,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// The persisted snapshot table.
pub trait SnapshotStore {
    /// Short description for log output.
    fn describe(&self) -> String;

    /// Read every stored row, in storage order.
    fn read_all(&self) -> Result<Vec<RawRecord>, StorageError>;

    /// Append a batch of rows.
    fn append(&mut self, rows: &[SnapshotRow]) -> Result<(), StorageError>;
}

/// Open the store at `path`: `.csv` files are CSV stores, anything else is
/// a SQLite database.
pub fn open(path: &Utf8Path) -> Result<Box<dyn SnapshotStore>, StorageError> {
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    if is_csv {
        Ok(Box::new(CsvStore::new(path)))
    } else {
        Ok(Box::new(SqliteStore::open(path)?))
    }
}

/// A logical column of the snapshot table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Date,
    DisplayName,
    Handle,
    Followers,
    Url,
}

impl Field {
    /// In the order of [`COLUMNS`].
    const ALL: [Field; 5] = [
        Field::Date,
        Field::DisplayName,
        Field::Handle,
        Field::Followers,
        Field::Url,
    ];

    /// Appends are refused when any of these has no column.
    const REQUIRED: [Field; 3] = [Field::Date, Field::Handle, Field::Followers];

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::Date => DATE_ALIASES,
            Field::DisplayName => DISPLAY_NAME_ALIASES,
            Field::Handle => HANDLE_ALIASES,
            Field::Followers => METRIC_ALIASES,
            Field::Url => URL_ALIASES,
        }
    }

    /// Find the field a header name stands for.
    fn for_header(name: &str) -> Option<Self> {
        let name = normalize_column(name);
        Self::ALL
            .into_iter()
            .find(|field| field.aliases().contains(&name.as_str()))
    }

    fn name(self) -> &'static str {
        self.aliases()[0]
    }

    fn cell(self, row: &SnapshotRow) -> String {
        match self {
            Field::Date => row.date_cell(),
            Field::DisplayName => row.display_name.clone(),
            Field::Handle => row.handle_cell(),
            Field::Followers => row.metric_value.to_string(),
            Field::Url => row.source_url.clone(),
        }
    }
}

/// A CSV file, e.g. a spreadsheet export, used as the snapshot table.
///
/// A missing file reads as an empty table. Header names are kept as they
/// appear in the file, and appends write each cell under its own column,
/// whatever the column order.
#[derive(Debug)]
pub struct CsvStore {
    path: Utf8PathBuf,
}

impl CsvStore {
    pub fn new(path: &Utf8Path) -> Self {
        Self {
            path: path.to_owned(),
        }
    }

    fn csv_error(&self, source: csv::Error) -> StorageError {
        StorageError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// The header of the existing file, or `None` if there is no file yet or
    /// it is empty.
    fn existing_header(&self) -> Result<Option<csv::StringRecord>, StorageError> {
        match std::fs::metadata(self.path.as_std_path()) {
            Ok(meta) if meta.len() > 0 => {}
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(self.path.as_std_path())
            .map_err(|e| self.csv_error(e))?;
        let header = reader.headers().map_err(|e| self.csv_error(e))?.clone();
        Ok(Some(header))
    }

    /// Map each header cell to the field written under it.
    fn layout(&self, header: &csv::StringRecord) -> Result<Vec<Option<Field>>, StorageError> {
        let layout: Vec<Option<Field>> = header.iter().map(Field::for_header).collect();

        for field in Field::REQUIRED {
            if !layout.contains(&Some(field)) {
                return Err(StorageError::MissingColumn {
                    path: self.path.clone(),
                    column: field.name(),
                });
            }
        }
        Ok(layout)
    }
}

impl SnapshotStore for CsvStore {
    fn describe(&self) -> String {
        format!("CSV file {}", self.path)
    }

    fn read_all(&self) -> Result<Vec<RawRecord>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(self.path.as_std_path())
            .map_err(|e| self.csv_error(e))?;
        let headers = reader.headers().map_err(|e| self.csv_error(e))?.clone();

        let mut records = Vec::new();
        for result in reader.records() {
            let row = result.map_err(|e| self.csv_error(e))?;
            let record: RawRecord = headers
                .iter()
                .zip(row.iter())
                .map(|(name, cell)| (name.to_string(), Value::String(cell.to_string())))
                .collect();
            records.push(record);
        }

        Ok(records)
    }

    fn append(&mut self, rows: &[SnapshotRow]) -> Result<(), StorageError> {
        // Resolve the layout before touching the file, so a sheet we cannot
        // map is left as it is.
        let existing = self.existing_header()?;
        let layout = match &existing {
            Some(header) => self.layout(header)?,
            None => Field::ALL.into_iter().map(Some).collect(),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_std_path())
            .map_err(|e| self.io_error(e))?;

        let mut writer = csv::Writer::from_writer(file);
        if existing.is_none() {
            writer.write_record(COLUMNS).map_err(|e| self.csv_error(e))?;
        }
        for row in rows {
            let cells = layout
                .iter()
                .map(|field| field.map(|f| f.cell(row)).unwrap_or_default());
            writer
                .write_record(cells)
                .map_err(|e| self.csv_error(e))?;
        }
        writer.flush().map_err(|e| self.io_error(e))?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::snapshot::{
        COLUMN_DATE, COLUMN_DISPLAY_NAME, COLUMN_FOLLOWERS, COLUMN_HANDLE, COLUMN_URL,
    };

    /// An in-memory table with switchable failures.
    #[derive(Debug, Default)]
    pub(crate) struct MemoryStore {
        pub(crate) records: Vec<RawRecord>,
        pub(crate) fail_reads: bool,
        pub(crate) fail_appends: bool,
        pub(crate) append_calls: usize,
    }

    impl MemoryStore {
        pub(crate) fn with_rows(rows: &[SnapshotRow]) -> Self {
            Self {
                records: rows.iter().map(to_record).collect(),
                ..Self::default()
            }
        }
    }

    pub(crate) fn to_record(row: &SnapshotRow) -> RawRecord {
        let mut record = RawRecord::new();
        record.insert(COLUMN_DATE.to_string(), Value::from(row.date_cell()));
        record.insert(
            COLUMN_DISPLAY_NAME.to_string(),
            Value::from(row.display_name.clone()),
        );
        record.insert(COLUMN_HANDLE.to_string(), Value::from(row.handle_cell()));
        record.insert(COLUMN_FOLLOWERS.to_string(), Value::from(row.metric_value));
        record.insert(COLUMN_URL.to_string(), Value::from(row.source_url.clone()));
        record
    }

    impl SnapshotStore for MemoryStore {
        fn describe(&self) -> String {
            "memory".to_string()
        }

        fn read_all(&self) -> Result<Vec<RawRecord>, StorageError> {
            if self.fail_reads {
                return Err(StorageError::Unavailable("read refused".to_string()));
            }
            Ok(self.records.clone())
        }

        fn append(&mut self, rows: &[SnapshotRow]) -> Result<(), StorageError> {
            self.append_calls += 1;
            if self.fail_appends {
                return Err(StorageError::Unavailable("append refused".to_string()));
            }
            self.records.extend(rows.iter().map(to_record));
            Ok(())
        }
    }
}
