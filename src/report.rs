// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Printing and exporting the derived views.

use crate::{
    aggregate::{DashboardViews, RankedEntry, TotalPoint, TrendEntry, TrendView, signed},
    cache::Freshness,
    snapshot::{SnapshotRow, format_delta, format_number},
};
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::NaiveDate;
use serde::Serialize;
use std::{fs::File, io::Write};

/// Which view to export.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ViewKind {
    Ranking,
    Trend,
    Series,
}

pub enum ExportKind {
    Csv { output: String, view: ViewKind },
    Json { output: String, view: ViewKind },
}

/// Describe where the data came from, for the report header.
pub fn describe_freshness(freshness: Freshness) -> String {
    match freshness {
        Freshness::Live => "live".to_string(),
        Freshness::Cached { age } => format!("cached, {}s old", age.as_secs()),
    }
}

/// Print the full report. `views` is `None` when the table has no data.
pub fn print_report(views: Option<&DashboardViews>, freshness: Freshness, top: usize) {
    let Some(views) = views else {
        println!("\nNo data ({}).", describe_freshness(freshness));
        return;
    };

    println!(
        "\nFollower statistics as of {} ({})",
        format_date(views.latest_date),
        describe_freshness(freshness)
    );

    print_ranking(&views.ranking);
    print_trend(&views.trend, top);
    print_series(&views.totals);
}

fn print_ranking(ranking: &[RankedEntry]) {
    println!("\nRanking");
    println!(
        "{:>4}  {:<30} {:<28} {:>12}  {:<10}",
        "#", "Account", "Handle", "Followers", "As of"
    );
    println!("{}", "=".repeat(90));

    for entry in ranking {
        println!(
            "{:>4}  {:<30} {:<28} {:>12}  {:<10}",
            entry.rank,
            truncate(display_or_handle(&entry.display_name, &entry.entity_id), 30),
            format!("@{}", entry.entity_id),
            format_number(entry.metric_value),
            entry.as_of.map(format_date).unwrap_or_else(|| "-".to_string()),
        );
    }
}

fn print_trend(trend: &TrendView, top: usize) {
    println!(
        "\nTrend since {} (closest to {})",
        format_date(trend.compare_date),
        format_date(trend.target_date)
    );

    if trend.entries.is_empty() {
        println!("  no accounts were tracked on {}", format_date(trend.compare_date));
        return;
    }

    println!("{:>4}  {:<30} {:>12}", "#", "Account", "Change");
    println!("{}", "=".repeat(48));

    let (head, tail) = top_and_bottom(&trend.entries, top);
    for (i, entry) in head.iter().enumerate() {
        print_trend_line(i + 1, entry);
    }
    if !tail.is_empty() {
        println!("{:>4}", "...");
        let first_rank = trend.entries.len() - tail.len() + 1;
        for (i, entry) in tail.iter().enumerate() {
            print_trend_line(first_rank + i, entry);
        }
    }
}

fn print_trend_line(rank: usize, entry: &TrendEntry) {
    println!(
        "{:>4}  {:<30} {:>12}",
        rank,
        truncate(display_or_handle(&entry.display_name, &entry.entity_id), 30),
        format_delta(entry.delta)
    );
}

/// The first `n` entries and, if there are more than `2 * n`, the last `n`.
/// With fewer entries everything goes in the head.
fn top_and_bottom<T>(entries: &[T], n: usize) -> (&[T], &[T]) {
    if entries.len() <= 2 * n {
        (entries, &entries[..0])
    } else {
        (&entries[..n], &entries[entries.len() - n..])
    }
}

fn print_series(totals: &[TotalPoint]) {
    println!("\nTotal followers");
    println!("{:<12} {:>15}", "Date", "Followers");
    println!("{}", "=".repeat(28));

    for point in totals {
        println!(
            "{:<12} {:>15}",
            format_date(point.date),
            format_number(point.total)
        );
    }
}

/// Print one account's history.
pub fn print_history(handle: &str, history: &[SnapshotRow]) {
    let Some(last) = history.last() else {
        println!("\nNo snapshots for @{}.", handle.trim_start_matches('@'));
        return;
    };

    println!(
        "\n{} (@{})",
        display_or_handle(&last.display_name, &last.entity_id),
        last.entity_id
    );
    println!("{:<12} {:>12} {:>10}", "Date", "Followers", "Change");
    println!("{}", "=".repeat(36));

    let mut previous: Option<u64> = None;
    for row in history {
        let change = previous
            .map(|p| format_delta(change_between(p, row.metric_value)))
            .unwrap_or_default();
        println!(
            "{:<12} {:>12} {:>10}",
            row.capture_date.map(format_date).unwrap_or_default(),
            format_number(row.metric_value),
            change
        );
        previous = Some(row.metric_value);
    }
}

fn change_between(previous: u64, current: u64) -> i64 {
    signed(current).saturating_sub(signed(previous))
}

pub fn run_export(views: Option<&DashboardViews>, export: ExportKind) -> Result<()> {
    let Some(views) = views else {
        anyhow::bail!("no data to export");
    };

    match export {
        ExportKind::Csv { output, view } => match view {
            ViewKind::Ranking => export_csv(output.as_ref(), &views.ranking)?,
            ViewKind::Trend => export_csv(output.as_ref(), &views.trend.entries)?,
            ViewKind::Series => export_csv(output.as_ref(), &views.totals)?,
        },
        ExportKind::Json { output, view } => match view {
            ViewKind::Ranking => export_json(output.as_ref(), &views.ranking)?,
            ViewKind::Trend => export_json(output.as_ref(), &views.trend)?,
            ViewKind::Series => export_json(output.as_ref(), &views.totals)?,
        },
    }
    Ok(())
}

fn export_csv<T: Serialize>(output: &Utf8Path, records: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(output.as_std_path())
        .with_context(|| format!("failed to create file at {}", output))?;

    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("failed to write to {}", output))?;
    }
    writer.flush()?;

    println!("Exported to {}.", output);
    Ok(())
}

fn export_json<T: Serialize + ?Sized>(output: &Utf8Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    let mut file = File::create(output.as_std_path())
        .with_context(|| format!("failed to create file at {}", output))?;
    file.write_all(json.as_bytes())?;

    println!("Exported to {}.", output);
    Ok(())
}

fn display_or_handle<'a>(display_name: &'a str, entity_id: &'a str) -> &'a str {
    if display_name.is_empty() {
        entity_id
    } else {
        display_name
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut truncated: String = s.chars().take(max_chars.saturating_sub(1)).collect();
        truncated.push('…');
        truncated
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
