// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Derived views over the snapshot table: ranking, trend and totals.
//!
//! Every function here is a pure function of its input rows. The full table
//! is recomputed on each read; nothing is persisted.

use crate::{
    snapshot::{
        DATE_ALIASES, DISPLAY_NAME_ALIASES, HANDLE_ALIASES, METRIC_ALIASES, RawRecord,
        SnapshotRow, URL_ALIASES, coerce_date, coerce_metric, coerce_text, normalize_column,
    },
    target::extract_handle,
};
use chrono::{Duration, NaiveDate};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Convert stored records into snapshot rows.
///
/// Never fails and never drops a record: unusable metrics become 0 and
/// unparseable dates become `None`.
pub fn normalize(records: &[RawRecord]) -> Vec<SnapshotRow> {
    records.iter().map(normalize_record).collect()
}

fn normalize_record(record: &RawRecord) -> SnapshotRow {
    let columns: HashMap<String, &Value> = record
        .iter()
        .map(|(name, value)| (normalize_column(name), value))
        .collect();
    let lookup = |aliases| lookup_column(&columns, aliases);

    let source_url = coerce_text(lookup(URL_ALIASES));
    let handle = coerce_text(lookup(HANDLE_ALIASES));
    let handle = handle.trim_start_matches('@').trim();
    let entity_id = if handle.is_empty() {
        extract_handle(&source_url).unwrap_or_default()
    } else {
        handle.to_string()
    };

    SnapshotRow {
        entity_id,
        display_name: coerce_text(lookup(DISPLAY_NAME_ALIASES)),
        metric_value: coerce_metric(lookup(METRIC_ALIASES)),
        capture_date: coerce_date(lookup(DATE_ALIASES)),
        source_url,
    }
}

fn lookup_column<'a>(columns: &HashMap<String, &'a Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|alias| columns.get(*alias).copied())
}

/// Sort by `(entity_id, capture_date)`, stably.
fn sort_canonical(rows: &mut [SnapshotRow]) {
    rows.sort_by(|a, b| {
        a.entity_id
            .cmp(&b.entity_id)
            .then(a.capture_date.cmp(&b.capture_date))
    });
}

/// Keep one row per `(entity_id, capture_date)`.
///
/// Rows are sorted by `(entity_id, capture_date)` (stable), and the last row
/// of each group wins. The output is in that sorted order. Rows without an
/// entity id are never merged: each one still counts in the daily total.
pub fn dedupe_latest_per_day(mut rows: Vec<SnapshotRow>) -> Vec<SnapshotRow> {
    sort_canonical(&mut rows);

    let mut deduped: Vec<SnapshotRow> = Vec::with_capacity(rows.len());
    for row in rows {
        match deduped.last_mut() {
            Some(last)
                if !row.entity_id.is_empty()
                    && last.entity_id == row.entity_id
                    && last.capture_date == row.capture_date =>
            {
                *last = row;
            }
            _ => deduped.push(row),
        }
    }
    deduped
}

/// The most recent row per entity, ordered by metric descending and then
/// entity id ascending.
///
/// Rows without an entity id are ignored.
pub fn latest_per_entity(rows: &[SnapshotRow]) -> Vec<SnapshotRow> {
    let mut sorted: Vec<SnapshotRow> = rows
        .iter()
        .filter(|row| !row.entity_id.is_empty())
        .cloned()
        .collect();
    sort_canonical(&mut sorted);

    let mut latest: Vec<SnapshotRow> = Vec::new();
    for row in sorted {
        match latest.last_mut() {
            Some(last) if last.entity_id == row.entity_id => *last = row,
            _ => latest.push(row),
        }
    }

    latest.sort_by(|a, b| {
        b.metric_value
            .cmp(&a.metric_value)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    latest
}

/// One line of the ranking view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    pub entity_id: String,
    pub display_name: String,
    pub source_url: String,
    pub metric_value: u64,
    pub as_of: Option<NaiveDate>,
}

/// Number the output of [`latest_per_entity`] from 1.
pub fn rank(latest: &[SnapshotRow]) -> Vec<RankedEntry> {
    latest
        .iter()
        .enumerate()
        .map(|(i, row)| RankedEntry {
            rank: i + 1,
            entity_id: row.entity_id.clone(),
            display_name: row.display_name.clone(),
            source_url: row.source_url.clone(),
            metric_value: row.metric_value,
            as_of: row.capture_date,
        })
        .collect()
}

/// Growth of one entity between the comparison date and its latest snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrendEntry {
    pub entity_id: String,
    pub display_name: String,
    pub source_url: String,
    pub metric_value: u64,
    pub delta: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrendView {
    pub latest_date: NaiveDate,
    pub target_date: NaiveDate,
    pub compare_date: NaiveDate,
    pub entries: Vec<TrendEntry>,
}

/// Pick the date in `dates` closest to `target`. Equidistant candidates
/// resolve to the earlier date.
pub fn closest_date(dates: &BTreeSet<NaiveDate>, target: NaiveDate) -> Option<NaiveDate> {
    // Ascending iteration plus a strict comparison keeps the earlier date on
    // ties.
    let mut best: Option<(NaiveDate, i64)> = None;
    for &date in dates {
        let distance = (date - target).num_days().abs();
        if best.is_none_or(|(_, best_distance)| distance < best_distance) {
            best = Some((date, distance));
        }
    }
    best.map(|(date, _)| date)
}

/// Compare each entity's latest value with its value on the stored date
/// closest to `weeks_back` weeks before the latest date in the table. A
/// `weeks_back` reaching past the supported date range targets the earliest
/// stored date.
///
/// Entities with no row on the comparison date are left out. Entries are
/// ordered by delta descending, then entity id ascending. Returns `None` when
/// no row has a date.
pub fn compute_trend(rows: &[SnapshotRow], weeks_back: u32) -> Option<TrendView> {
    let dates: BTreeSet<NaiveDate> = rows.iter().filter_map(|r| r.capture_date).collect();
    let latest_date = *dates.last()?;
    let earliest_date = *dates.first()?;
    let target_date = Duration::try_weeks(i64::from(weeks_back))
        .and_then(|back| latest_date.checked_sub_signed(back))
        .unwrap_or(earliest_date);
    let compare_date = closest_date(&dates, target_date)?;

    // Last row wins, matching dedupe_latest_per_day.
    let mut then: HashMap<&str, u64> = HashMap::new();
    for row in rows
        .iter()
        .filter(|r| r.capture_date == Some(compare_date) && !r.entity_id.is_empty())
    {
        then.insert(row.entity_id.as_str(), row.metric_value);
    }

    let mut entries: Vec<TrendEntry> = latest_per_entity(rows)
        .into_iter()
        .filter_map(|now| {
            let old = *then.get(now.entity_id.as_str())?;
            Some(TrendEntry {
                delta: signed(now.metric_value).saturating_sub(signed(old)),
                metric_value: now.metric_value,
                entity_id: now.entity_id,
                display_name: now.display_name,
                source_url: now.source_url,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        b.delta
            .cmp(&a.delta)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });

    Some(TrendView {
        latest_date,
        target_date,
        compare_date,
        entries,
    })
}

pub(crate) fn signed(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// One point of the global total series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TotalPoint {
    pub date: NaiveDate,
    pub total: u64,
}

/// Sum of all metric values per capture date, ascending by date.
///
/// Every date present is included, even if only some entities were captured
/// that day. Rows without a date are not counted. Sums saturate at
/// `u64::MAX`.
pub fn total_time_series(rows: &[SnapshotRow]) -> Vec<TotalPoint> {
    let mut totals: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for row in rows {
        if let Some(date) = row.capture_date {
            let total = totals.entry(date).or_insert(0);
            *total = total.saturating_add(row.metric_value);
        }
    }

    totals
        .into_iter()
        .map(|(date, total)| TotalPoint { date, total })
        .collect()
}

/// All dated rows for one entity, ascending by date.
pub fn entity_history(rows: &[SnapshotRow], entity_id: &str) -> Vec<SnapshotRow> {
    let entity_id = entity_id.trim().trim_start_matches('@');
    let mut history: Vec<SnapshotRow> = rows
        .iter()
        .filter(|r| r.entity_id == entity_id && r.capture_date.is_some())
        .cloned()
        .collect();
    history.sort_by_key(|r| r.capture_date);
    history
}

/// Everything the report shows, computed from one read of the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DashboardViews {
    pub rows: Vec<SnapshotRow>,
    pub latest_date: NaiveDate,
    pub ranking: Vec<RankedEntry>,
    pub trend: TrendView,
    pub totals: Vec<TotalPoint>,
}

impl DashboardViews {
    /// Run the full pipeline. Returns `None` when the table has no dated rows.
    pub fn build(records: &[RawRecord], weeks_back: u32) -> Option<Self> {
        let rows = dedupe_latest_per_day(normalize(records));
        let trend = compute_trend(&rows, weeks_back)?;
        let ranking = rank(&latest_per_entity(&rows));
        let totals = total_time_series(&rows);

        Some(Self {
            latest_date: trend.latest_date,
            rows,
            ranking,
            trend,
            totals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::to_record;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn row(entity: &str, value: u64, d: u32) -> SnapshotRow {
        SnapshotRow {
            entity_id: entity.to_string(),
            display_name: entity.to_uppercase(),
            metric_value: value,
            capture_date: Some(day(d)),
            source_url: format!("https://www.instagram.com/{entity}/"),
        }
    }

    fn record(pairs: &[(&str, Value)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_normalize_case_insensitive_columns() {
        let records = vec![record(&[
            (" date ", json!("2025-01-03")),
            ("Club_Name", json!("Futsal Club")),
            ("handle", json!("@fc")),
            ("Follower", json!("250")),
            ("url", json!(" https://www.instagram.com/fc/ ")),
        ])];

        let rows = normalize(&records);
        assert_eq!(
            rows,
            vec![SnapshotRow {
                entity_id: "fc".to_string(),
                display_name: "Futsal Club".to_string(),
                metric_value: 250,
                capture_date: Some(day(3)),
                source_url: "https://www.instagram.com/fc/".to_string(),
            }]
        );
    }

    #[test]
    fn test_normalize_is_total() {
        let records = vec![
            record(&[]),
            record(&[
                ("FOLLOWERS", json!("lots")),
                ("DATE", json!("soon")),
            ]),
            record(&[("URL", json!("https://www.instagram.com/from_url/"))]),
        ];

        let rows = normalize(&records);
        assert_eq!(rows.len(), 3, "no record is dropped");
        assert_eq!(rows[0].entity_id, "");
        assert_eq!(rows[0].metric_value, 0);
        assert_eq!(rows[1].metric_value, 0);
        assert_eq!(rows[1].capture_date, None);
        assert_eq!(rows[2].entity_id, "from_url");
    }

    #[test]
    fn test_dedupe_keeps_one_per_day() {
        let rows = vec![row("a", 10, 1), row("a", 99, 1)];

        let once = dedupe_latest_per_day(rows.clone());
        assert_eq!(once, vec![row("a", 99, 1)]);
        // Same input, same answer.
        assert_eq!(dedupe_latest_per_day(rows), once);
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let rows = vec![
            row("b", 5, 2),
            row("a", 10, 1),
            row("b", 6, 2),
            row("a", 20, 2),
            row("a", 11, 1),
            row("c", 1, 1),
        ];

        let once = dedupe_latest_per_day(rows);
        let twice = dedupe_latest_per_day(once.clone());
        assert_eq!(once, twice);
        assert_eq!(
            once,
            vec![row("a", 11, 1), row("a", 20, 2), row("b", 6, 2), row("c", 1, 1)]
        );
    }

    #[test]
    fn test_latest_per_entity_one_row_each() {
        let rows = vec![
            row("a", 10, 1),
            row("a", 20, 2),
            row("a", 30, 3),
            row("b", 5, 1),
            row("c", 7, 3),
        ];

        let latest = latest_per_entity(&rows);
        assert_eq!(latest.len(), 3);
        assert_eq!(latest, vec![row("a", 30, 3), row("c", 7, 3), row("b", 5, 1)]);
    }

    #[test]
    fn test_ranking_ties_break_by_entity_id() {
        let rows = vec![row("zeta", 50, 1), row("alpha", 50, 1), row("mid", 80, 1)];

        let ranking = rank(&latest_per_entity(&rows));
        let order: Vec<(usize, &str)> = ranking
            .iter()
            .map(|e| (e.rank, e.entity_id.as_str()))
            .collect();
        assert_eq!(order, vec![(1, "mid"), (2, "alpha"), (3, "zeta")]);

        let reversed: Vec<SnapshotRow> = rows.into_iter().rev().collect();
        assert_eq!(rank(&latest_per_entity(&reversed)), ranking);
    }

    #[test]
    fn test_trend_scenario() {
        let rows = vec![row("a", 10, 1), row("a", 20, 2), row("b", 5, 1), row("b", 5, 2)];

        // One week back from day 2 is closest to day 1.
        let trend = compute_trend(&rows, 1).unwrap();
        assert_eq!(trend.latest_date, day(2));
        assert_eq!(trend.compare_date, day(1));

        let deltas: Vec<(&str, i64)> = trend
            .entries
            .iter()
            .map(|e| (e.entity_id.as_str(), e.delta))
            .collect();
        assert_eq!(deltas, vec![("a", 10), ("b", 0)]);
    }

    #[test]
    fn test_trend_ties_break_by_entity_id() {
        let rows = vec![
            row("zeta", 10, 1),
            row("zeta", 15, 8),
            row("alpha", 20, 1),
            row("alpha", 25, 8),
            row("mid", 0, 1),
            row("mid", 9, 8),
        ];

        let trend = compute_trend(&rows, 1).unwrap();
        let deltas: Vec<(&str, i64)> = trend
            .entries
            .iter()
            .map(|e| (e.entity_id.as_str(), e.delta))
            .collect();
        assert_eq!(deltas, vec![("mid", 9), ("alpha", 5), ("zeta", 5)]);

        let reversed: Vec<SnapshotRow> = rows.into_iter().rev().collect();
        assert_eq!(compute_trend(&reversed, 1).unwrap(), trend);
    }

    #[test]
    fn test_trend_weeks_beyond_date_range() {
        let rows = vec![row("a", 10, 1), row("a", 30, 15), row("a", 40, 29)];

        let trend = compute_trend(&rows, 20_000_000).unwrap();
        assert_eq!(trend.target_date, day(1));
        assert_eq!(trend.compare_date, day(1));
        assert_eq!(trend.entries[0].delta, 30);

        let trend = compute_trend(&rows, u32::MAX).unwrap();
        assert_eq!(trend.compare_date, day(1));
    }

    #[test]
    fn test_trend_excludes_entities_missing_on_compare_date() {
        let rows = vec![row("a", 10, 1), row("a", 15, 29), row("new", 900, 29)];

        let trend = compute_trend(&rows, 4).unwrap();
        assert_eq!(trend.compare_date, day(1));
        assert_eq!(trend.entries.len(), 1);
        assert_eq!(trend.entries[0].entity_id, "a");
        assert_eq!(trend.entries[0].delta, 5);
    }

    #[test]
    fn test_trend_negative_delta() {
        let rows = vec![row("a", 100, 1), row("a", 90, 8)];
        let trend = compute_trend(&rows, 1).unwrap();
        assert_eq!(trend.entries[0].delta, -10);
    }

    #[test]
    fn test_closest_date_tie_prefers_earlier() {
        let dates: BTreeSet<NaiveDate> = [day(1), day(5), day(9)].into_iter().collect();

        assert_eq!(closest_date(&dates, day(3)), Some(day(1)));
        assert_eq!(closest_date(&dates, day(7)), Some(day(5)));
        assert_eq!(closest_date(&dates, day(8)), Some(day(9)));
        assert_eq!(closest_date(&BTreeSet::new(), day(8)), None);
    }

    #[test]
    fn test_trend_with_single_date() {
        let rows = vec![row("a", 10, 5)];
        let trend = compute_trend(&rows, 4).unwrap();
        assert_eq!(trend.compare_date, day(5));
        assert_eq!(trend.entries[0].delta, 0);

        assert_eq!(compute_trend(&[], 4), None);
    }

    #[test]
    fn test_total_time_series() {
        let rows = vec![row("a", 10, 1), row("b", 5, 1), row("a", 25, 2)];

        let totals = total_time_series(&rows);
        assert_eq!(
            totals,
            vec![
                TotalPoint {
                    date: day(1),
                    total: 15
                },
                TotalPoint {
                    date: day(2),
                    total: 25
                },
            ]
        );
    }

    #[test]
    fn test_dedupe_keeps_rows_without_entity() {
        let rows = vec![row("", 10, 1), row("", 20, 1), row("a", 5, 1)];

        let deduped = dedupe_latest_per_day(rows);
        assert_eq!(deduped.len(), 3);
        assert_eq!(dedupe_latest_per_day(deduped.clone()), deduped);
        assert_eq!(total_time_series(&deduped)[0].total, 35);
    }

    #[test]
    fn test_total_time_series_saturates() {
        let rows = vec![row("a", u64::MAX, 1), row("b", u64::MAX, 1), row("c", 1, 2)];

        let totals = total_time_series(&rows);
        assert_eq!(totals[0].total, u64::MAX);
        assert_eq!(totals[1].total, 1);
    }

    #[test]
    fn test_out_of_range_counts_do_not_corrupt_totals() {
        let records = vec![
            record(&[
                ("DATE", json!("2025-01-01")),
                ("HANDLE", json!("@a")),
                ("FOLLOWERS", json!("1e20")),
            ]),
            record(&[
                ("DATE", json!("2025-01-01")),
                ("HANDLE", json!("@b")),
                ("FOLLOWERS", json!("1e20")),
            ]),
            record(&[
                ("DATE", json!("2025-01-01")),
                ("HANDLE", json!("@c")),
                ("FOLLOWERS", json!(7)),
            ]),
        ];

        let views = DashboardViews::build(&records, 4).unwrap();
        assert_eq!(
            views.totals,
            vec![TotalPoint {
                date: day(1),
                total: 7
            }]
        );
    }

    #[test]
    fn test_entity_history() {
        let rows = vec![row("a", 30, 3), row("b", 1, 1), row("a", 10, 1)];

        let history = entity_history(&rows, "@a");
        assert_eq!(history, vec![row("a", 10, 1), row("a", 30, 3)]);
        assert!(entity_history(&rows, "nobody").is_empty());
    }

    #[test]
    fn test_dashboard_views() {
        let rows = [
            row("a", 10, 1),
            row("a", 99, 1),
            row("a", 120, 8),
            row("b", 50, 1),
            row("b", 60, 8),
        ];
        let records: Vec<RawRecord> = rows.iter().map(to_record).collect();

        let views = DashboardViews::build(&records, 1).unwrap();
        assert_eq!(views.latest_date, day(8));
        assert_eq!(views.ranking[0].entity_id, "a");
        assert_eq!(views.trend.entries[0].delta, 21);
        assert_eq!(views.trend.entries[1].delta, 10);
        assert_eq!(views.totals[0].total, 149);

        // Pure: same input, same views.
        assert_eq!(DashboardViews::build(&records, 1).unwrap(), views);
    }

    #[test]
    fn test_dashboard_views_count_rows_without_entity() {
        let records = vec![
            record(&[
                ("DATE", json!("2025-01-01")),
                ("FOLLOWERS", json!(10)),
            ]),
            record(&[
                ("DATE", json!("2025-01-01")),
                ("FOLLOWERS", json!(20)),
            ]),
            record(&[
                ("DATE", json!("2025-01-01")),
                ("HANDLE", json!("@a")),
                ("FOLLOWERS", json!(5)),
            ]),
        ];

        let views = DashboardViews::build(&records, 4).unwrap();
        assert_eq!(
            views.totals,
            vec![TotalPoint {
                date: day(1),
                total: 35
            }]
        );
        assert_eq!(views.ranking.len(), 1);
        assert_eq!(views.trend.entries.len(), 1);
    }

    #[test]
    fn test_dashboard_views_no_data() {
        assert_eq!(DashboardViews::build(&[], 4), None);

        let undated = vec![record(&[("HANDLE", json!("@a")), ("DATE", json!(""))])];
        assert_eq!(DashboardViews::build(&undated, 4), None);
    }
}
