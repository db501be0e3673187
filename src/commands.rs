// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations.

use crate::{
    aggregate::{self, DashboardViews},
    cache::{Freshness, ReadCache},
    charts,
    collect::{self, Collector},
    config::Config,
    instagram::{InstagramFetcher, SESSION_ID_ENV},
    report::{self, ExportKind},
    retry::TokioSleeper,
    snapshot::SnapshotRow,
    store::{self, CsvStore, SnapshotStore},
};
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{Local, NaiveDate};
use std::{collections::HashSet, time::Duration};

fn open_store(database: &Utf8Path) -> Result<Box<dyn SnapshotStore>> {
    store::open(database).with_context(|| format!("failed to open snapshot table at {}", database))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Run the collect command.
pub async fn run_collect(database: &Utf8Path, config: &Config, dry_run: bool) -> Result<()> {
    let targets = config.targets()?;
    let mut store = open_store(database)?;
    let today = today();

    if dry_run {
        let records = store
            .read_all()
            .with_context(|| format!("failed to read {}", store.describe()))?;
        let existing = aggregate::normalize(&records);
        let pending = collect::identify_pending_targets(&targets, &existing, today);

        println!(
            "{} of {} target(s) still need a snapshot for {}:",
            pending.len(),
            targets.len(),
            today
        );
        for target in &pending {
            println!("  @{:<40} {}", target.handle, target.url);
        }
        return Ok(());
    }

    let fetcher = InstagramFetcher::new(config.request_timeout())
        .context("failed to create HTTP client")?;
    if !fetcher.has_session() {
        log::warn!("{} is not set; requests are likely to be blocked", SESSION_ID_ENV);
    }

    let collector = Collector {
        fetcher: &fetcher,
        sleeper: &TokioSleeper,
        policy: config.retry_policy(),
        politeness: config.politeness(),
    };

    log::info!("collecting into {}", store.describe());
    let report = collector
        .run_collection_cycle(&targets, store.as_mut(), today)
        .await
        .context("collection cycle aborted")?;

    println!("\nCollection for {} complete.", today);
    println!("  Targets:   {}", report.total);
    println!("  Skipped:   {} (already captured today)", report.already_done);
    println!("  Pending:   {}", report.pending);
    println!("  Succeeded: {}", report.succeeded());
    println!("  Failed:    {}", report.failed());
    for failure in &report.failures {
        println!("    @{}: {}", failure.target.handle, failure.error);
    }

    Ok(())
}

fn load_views(store: &dyn SnapshotStore, weeks: u32) -> Result<Option<DashboardViews>> {
    let records = store
        .read_all()
        .with_context(|| format!("failed to read {}", store.describe()))?;
    Ok(DashboardViews::build(&records, weeks))
}

/// Run the report command, optionally re-rendering every `watch` interval.
pub async fn run_report(
    database: &Utf8Path,
    config: &Config,
    weeks: Option<u32>,
    top: Option<usize>,
    watch: Option<u64>,
) -> Result<()> {
    let store = open_store(database)?;
    let weeks = weeks.unwrap_or(config.report.trend_weeks);
    let top = top.unwrap_or(config.report.top);

    let Some(interval) = watch else {
        let views = load_views(store.as_ref(), weeks)?;
        report::print_report(views.as_ref(), Freshness::Live, top);
        return Ok(());
    };

    let mut cache = ReadCache::new(config.cache_ttl());
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let read = cache
                    .read(store.as_ref())
                    .with_context(|| format!("failed to read {}", store.describe()))?;
                let views = DashboardViews::build(&read.records, weeks);
                report::print_report(views.as_ref(), read.freshness, top);
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("stopping");
                return Ok(());
            }
        }
    }
}

/// Run the history command.
pub fn run_history(database: &Utf8Path, handle: &str) -> Result<()> {
    let store = open_store(database)?;
    let records = store
        .read_all()
        .with_context(|| format!("failed to read {}", store.describe()))?;
    let rows = aggregate::dedupe_latest_per_day(aggregate::normalize(&records));

    report::print_history(handle, &aggregate::entity_history(&rows, handle));
    Ok(())
}

/// Run the export command.
pub fn run_export(database: &Utf8Path, config: &Config, export: ExportKind) -> Result<()> {
    let store = open_store(database)?;
    let views = load_views(store.as_ref(), config.report.trend_weeks)?;
    report::run_export(views.as_ref(), export)
}

/// Run the charts command.
pub fn run_charts(
    database: &Utf8Path,
    config: &Config,
    output_dir: &Utf8Path,
    entity: Option<&str>,
) -> Result<()> {
    let store = open_store(database)?;
    let Some(views) = load_views(store.as_ref(), config.report.trend_weeks)? else {
        println!("No data, no charts generated.");
        return Ok(());
    };
    charts::generate_all_charts(&views, output_dir, entity)
}

/// Run the import command: copy a spreadsheet export into the snapshot table.
pub fn run_import(database: &Utf8Path, source: &Utf8Path) -> Result<()> {
    if !source.exists() {
        anyhow::bail!("import source {} does not exist", source);
    }
    let source_store = CsvStore::new(source);
    let records = source_store
        .read_all()
        .with_context(|| format!("failed to read {}", source_store.describe()))?;

    let mut store = open_store(database)?;
    let existing = aggregate::normalize(
        &store
            .read_all()
            .with_context(|| format!("failed to read {}", store.describe()))?,
    );

    let (rows, skipped) = rows_to_import(aggregate::normalize(&records), &existing);
    if !rows.is_empty() {
        store
            .append(&rows)
            .with_context(|| format!("failed to append to {}", store.describe()))?;
    }

    println!(
        "Imported {} row(s) into {} ({} skipped).",
        rows.len(),
        store.describe(),
        skipped
    );
    Ok(())
}

/// Rows worth importing: dated, with an entity, and not already stored for
/// that entity and day. Returns the rows and the number skipped.
fn rows_to_import(incoming: Vec<SnapshotRow>, existing: &[SnapshotRow]) -> (Vec<SnapshotRow>, usize) {
    let mut seen: HashSet<(String, NaiveDate)> = existing
        .iter()
        .filter_map(|r| r.capture_date.map(|d| (r.entity_id.clone(), d)))
        .collect();

    let total = incoming.len();
    let rows: Vec<SnapshotRow> = incoming
        .into_iter()
        .filter(|row| {
            let Some(date) = row.capture_date else {
                return false;
            };
            !row.entity_id.is_empty() && seen.insert((row.entity_id.clone(), date))
        })
        .collect();

    let skipped = total - rows.len();
    (rows, skipped)
}
