// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-boxed cache for full-table reads.

use crate::{
    snapshot::RawRecord,
    store::{SnapshotStore, StorageError},
};
use std::time::{Duration, Instant};

/// Where a table read came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Live,
    Cached { age: Duration },
}

#[derive(Clone, Debug)]
pub struct TableRead {
    pub records: Vec<RawRecord>,
    pub freshness: Freshness,
}

/// Serves the last full read for up to `ttl`, then reads again.
///
/// An expired entry is never served: if the refresh fails, the error is
/// returned and the entry is dropped.
#[derive(Debug)]
pub struct ReadCache {
    ttl: Duration,
    entry: Option<(Instant, Vec<RawRecord>)>,
}

impl ReadCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn read(&mut self, store: &dyn SnapshotStore) -> Result<TableRead, StorageError> {
        self.read_at(store, Instant::now())
    }

    pub fn read_at(
        &mut self,
        store: &dyn SnapshotStore,
        now: Instant,
    ) -> Result<TableRead, StorageError> {
        if let Some((fetched_at, records)) = &self.entry {
            let age = now.saturating_duration_since(*fetched_at);
            if age < self.ttl {
                return Ok(TableRead {
                    records: records.clone(),
                    freshness: Freshness::Cached { age },
                });
            }
        }

        self.entry = None;
        let records = store.read_all()?;
        self.entry = Some((now, records.clone()));

        Ok(TableRead {
            records,
            freshness: Freshness::Live,
        })
    }
}
