// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Daily follower statistics collector for a list of Instagram accounts.

pub mod aggregate;
pub mod cache;
pub mod charts;
pub mod collect;
pub mod commands;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod instagram;
pub mod report;
pub mod retry;
pub mod snapshot;
pub mod store;
pub mod target;
