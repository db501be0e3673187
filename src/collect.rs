// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily collection of follower snapshots.
//!
//! A cycle reads the whole table once, works out which targets have no
//! snapshot for today, fetches those one at a time, and appends every
//! successful row in a single batch at the end.

use crate::{
    aggregate,
    instagram::{FetchError, ProfileFetcher},
    retry::{self, PolitenessDelay, RetryPolicy, Sleeper},
    snapshot::{SnapshotRow, format_number},
    store::{SnapshotStore, StorageError},
    target::Target,
};
use chrono::NaiveDate;

/// A target that could not be fetched in this cycle.
#[derive(Debug)]
pub struct FetchFailure {
    pub target: Target,
    pub attempts: u32,
    pub error: FetchError,
}

/// Errors that end a cycle.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("storage unavailable, no profiles were fetched")]
    StorageUnavailable(#[source] StorageError),

    #[error("failed to append {lost_rows} fetched snapshot(s); they are lost for this cycle")]
    BatchWrite {
        lost_rows: usize,
        #[source]
        source: StorageError,
    },
}

/// Outcome of a collection cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Configured targets.
    pub total: usize,
    /// Targets skipped because today's snapshot already exists.
    pub already_done: usize,
    /// Targets that needed fetching.
    pub pending: usize,
    /// Rows appended to the table.
    pub appended: Vec<SnapshotRow>,
    pub failures: Vec<FetchFailure>,
}

impl CycleReport {
    pub fn succeeded(&self) -> usize {
        self.appended.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Targets with no stored row dated `today`, in configured order.
///
/// A row counts for a target if its trimmed URL or its entity id matches.
pub fn identify_pending_targets(
    targets: &[Target],
    existing: &[SnapshotRow],
    today: NaiveDate,
) -> Vec<Target> {
    let done_today: Vec<&SnapshotRow> = existing
        .iter()
        .filter(|row| row.capture_date == Some(today))
        .collect();

    targets
        .iter()
        .filter(|target| !done_today.iter().any(|row| target.matches(row)))
        .cloned()
        .collect()
}

/// Fetch one target, retrying per `policy`.
pub async fn fetch_with_retry(
    fetcher: &dyn ProfileFetcher,
    sleeper: &dyn Sleeper,
    policy: RetryPolicy,
    target: &Target,
    today: NaiveDate,
) -> Result<SnapshotRow, FetchFailure> {
    let result = retry::execute_with_retry(policy, sleeper, move |_attempt| {
        fetcher.fetch_profile(&target.handle)
    })
    .await;

    match result {
        Ok(profile) => Ok(SnapshotRow {
            entity_id: target.handle.clone(),
            display_name: profile.display_name,
            metric_value: profile.follower_count,
            capture_date: Some(today),
            source_url: target.url.clone(),
        }),
        Err(exhausted) => Err(FetchFailure {
            target: target.clone(),
            attempts: exhausted.attempts,
            error: exhausted.last_error,
        }),
    }
}

/// Everything a cycle needs besides the table and the target list.
pub struct Collector<'a> {
    pub fetcher: &'a dyn ProfileFetcher,
    pub sleeper: &'a dyn Sleeper,
    pub policy: RetryPolicy,
    pub politeness: PolitenessDelay,
}

impl Collector<'_> {
    /// Bring the table up to date for `today`.
    ///
    /// Targets are fetched one at a time. Between two targets the collector
    /// waits for the politeness delay after a success, or the retry backoff
    /// after a target that failed every attempt.
    ///
    /// Individual fetch failures are recorded in the report. Only storage
    /// failures abort the cycle: a failed initial read stops it before any
    /// fetch, a failed final append loses the fetched rows.
    pub async fn run_collection_cycle(
        &self,
        targets: &[Target],
        store: &mut dyn SnapshotStore,
        today: NaiveDate,
    ) -> Result<CycleReport, CollectError> {
        let records = store.read_all().map_err(|e| {
            log::error!("cannot read {}: {e}", store.describe());
            CollectError::StorageUnavailable(e)
        })?;
        let existing = aggregate::normalize(&records);

        let pending = identify_pending_targets(targets, &existing, today);
        let mut report = CycleReport {
            total: targets.len(),
            already_done: targets.len() - pending.len(),
            pending: pending.len(),
            ..CycleReport::default()
        };

        log::info!(
            "{} target(s) configured, {} already captured on {today}, {} to fetch",
            report.total,
            report.already_done,
            report.pending
        );

        let mut batch = Vec::new();
        for (i, target) in pending.iter().enumerate() {
            log::info!("[{}/{}] @{}", i + 1, pending.len(), target.handle);

            let pause =
                match fetch_with_retry(self.fetcher, self.sleeper, self.policy, target, today)
                    .await
                {
                    Ok(row) => {
                        log::info!("  {} followers", format_number(row.metric_value));
                        batch.push(row);
                        self.politeness.sample()
                    }
                    Err(failure) => {
                        log::warn!(
                            "  giving up on @{} after {} attempt(s): {}",
                            failure.target.handle,
                            failure.attempts,
                            failure.error
                        );
                        report.failures.push(failure);
                        self.policy.backoff
                    }
                };

            // Every request is spaced from the next one, whatever its outcome.
            if i + 1 < pending.len() {
                log::debug!("  pausing {pause:?}");
                self.sleeper.sleep(pause).await;
            }
        }

        if !batch.is_empty() {
            log::info!("appending {} row(s) to {}", batch.len(), store.describe());
            if let Err(source) = store.append(&batch) {
                log::error!(
                    "append to {} failed, {} fetched row(s) lost: {source}",
                    store.describe(),
                    batch.len()
                );
                return Err(CollectError::BatchWrite {
                    lost_rows: batch.len(),
                    source,
                });
            }
        }

        report.appended = batch;
        Ok(report)
    }
}
