// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshot rows and the coercions shared by the collector and the aggregator.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

/// A stored row as read back from a backend: column name to cell.
///
/// Column names are whatever the backend uses; lookups go through
/// [`normalize_column`] so they are case-insensitive.
pub type RawRecord = serde_json::Map<String, Value>;

/// Column names written by this tool.
pub const COLUMN_DATE: &str = "DATE";
pub const COLUMN_DISPLAY_NAME: &str = "DISPLAY_NAME";
pub const COLUMN_HANDLE: &str = "HANDLE";
pub const COLUMN_FOLLOWERS: &str = "FOLLOWERS";
pub const COLUMN_URL: &str = "URL";

/// The canonical column order used when writing rows.
pub const COLUMNS: [&str; 5] = [
    COLUMN_DATE,
    COLUMN_DISPLAY_NAME,
    COLUMN_HANDLE,
    COLUMN_FOLLOWERS,
    COLUMN_URL,
];

// Accepted spellings per logical column, after normalization. The older sheet
// layout used CLUB_NAME and FOLLOWER.
pub(crate) const DATE_ALIASES: &[&str] = &[COLUMN_DATE, "CAPTURE_DATE"];
pub(crate) const DISPLAY_NAME_ALIASES: &[&str] =
    &[COLUMN_DISPLAY_NAME, "CLUB_NAME", "NAME", "FULL_NAME"];
pub(crate) const HANDLE_ALIASES: &[&str] = &[COLUMN_HANDLE, "USERNAME", "ENTITY_ID"];
pub(crate) const METRIC_ALIASES: &[&str] = &[COLUMN_FOLLOWERS, "FOLLOWER", "METRIC_VALUE"];
pub(crate) const URL_ALIASES: &[&str] = &[COLUMN_URL, "SOURCE_URL"];

/// One measurement of an entity's follower count on a calendar day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SnapshotRow {
    pub entity_id: String,
    pub display_name: String,
    pub metric_value: u64,
    /// `None` when the stored date could not be understood.
    pub capture_date: Option<NaiveDate>,
    pub source_url: String,
}

impl SnapshotRow {
    /// The handle as written to storage, with a leading `@`.
    pub fn handle_cell(&self) -> String {
        format!("@{}", self.entity_id)
    }

    /// The capture date as written to storage (`YYYY-MM-DD`, or empty).
    pub fn date_cell(&self) -> String {
        self.capture_date
            .map(|d| d.to_string())
            .unwrap_or_default()
    }
}

/// Normalize a column name for case-insensitive lookup.
pub fn normalize_column(name: &str) -> String {
    name.trim().to_uppercase().replace(' ', "_")
}

/// Largest follower count accepted from storage. Anything above it is
/// treated as malformed, so sums over a day stay meaningful and every count
/// fits a SQLite integer.
pub const MAX_METRIC: u64 = i64::MAX as u64;

/// Coerce a cell to a non-negative count. Anything unusable, including
/// values above [`MAX_METRIC`], becomes 0.
pub fn coerce_metric(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => {
            if let Some(v) = n.as_u64() {
                in_range(v)
            } else {
                n.as_f64().map(float_to_count).unwrap_or(0)
            }
        }
        Some(Value::String(s)) => {
            let s = s.trim();
            if let Ok(v) = s.parse::<u64>() {
                in_range(v)
            } else {
                s.parse::<f64>().map(float_to_count).unwrap_or(0)
            }
        }
        Some(Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_)) | None => 0,
    }
}

fn in_range(v: u64) -> u64 {
    if v <= MAX_METRIC { v } else { 0 }
}

fn float_to_count(f: f64) -> u64 {
    // MAX_METRIC as f64 rounds up to 2^63, so the comparison is strict.
    if f.is_finite() && f > 0.0 && f < MAX_METRIC as f64 {
        f as u64
    } else {
        0
    }
}

/// Coerce a cell to a calendar date.
///
/// Accepts `YYYY-MM-DD`, any datetime starting with `YYYY-MM-DD`, and
/// `DD.MM.YYYY`.
pub fn coerce_date(value: Option<&Value>) -> Option<NaiveDate> {
    let s = match value? {
        Value::String(s) => s.trim(),
        _ => return None,
    };

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Some(prefix) = s.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }
    NaiveDate::parse_from_str(s, "%d.%m.%Y").ok()
}

/// Coerce a cell to a trimmed string. Numbers are rendered, null is empty.
pub fn coerce_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Format a number with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result.chars().rev().collect()
}

/// Format a signed delta with an explicit sign and thousands separators.
pub fn format_delta(n: i64) -> String {
    let sign = if n < 0 { '-' } else { '+' };
    format!("{}{}", sign, format_number(n.unsigned_abs()))
}
