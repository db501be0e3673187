// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracked accounts and handle extraction from profile URLs.

use crate::snapshot::SnapshotRow;
use anyhow::Result;

/// A tracked account, identified by the handle in its profile URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub url: String,
    pub handle: String,
}

impl Target {
    /// Parse a canonical profile URL such as `https://www.instagram.com/somebody/`.
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        let handle = extract_handle(url)
            .ok_or_else(|| anyhow::anyhow!("no account handle in URL '{}'", url))?;

        Ok(Self {
            url: url.to_string(),
            handle,
        })
    }

    /// Whether a stored row was captured for this target.
    pub fn matches(&self, row: &SnapshotRow) -> bool {
        row.source_url.trim() == self.url || row.entity_id == self.handle
    }
}

/// Extract the first path segment after the host.
///
/// The query string, fragment and trailing slash are ignored. Returns `None`
/// if there is no such segment.
pub fn extract_handle(url: &str) -> Option<String> {
    let url = url.trim();
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let (_host, path) = without_scheme.split_once('/')?;

    let segment = path
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim();

    if segment.is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_handle() {
        assert_eq!(
            extract_handle("https://www.instagram.com/ybbalkan/").as_deref(),
            Some("ybbalkan")
        );
        assert_eq!(
            extract_handle("https://www.instagram.com/fc.liria.1985.futsal").as_deref(),
            Some("fc.liria.1985.futsal")
        );
        assert_eq!(
            extract_handle("https://www.instagram.com/hsvfutsal?hl=de").as_deref(),
            Some("hsvfutsal")
        );
        assert_eq!(
            extract_handle("www.instagram.com/sv_pars/reels/").as_deref(),
            Some("sv_pars")
        );
        assert_eq!(extract_handle("https://www.instagram.com/"), None);
        assert_eq!(extract_handle("https://www.instagram.com"), None);
        assert_eq!(extract_handle("https://www.instagram.com/?x=1"), None);
    }

    #[test]
    fn test_parse_trims() {
        let target = Target::parse("  https://www.instagram.com/futsal_hamburg/ \n").unwrap();
        assert_eq!(target.url, "https://www.instagram.com/futsal_hamburg/");
        assert_eq!(target.handle, "futsal_hamburg");

        assert!(Target::parse("not a url").is_err());
    }

    #[test]
    fn test_matches_by_url_or_handle() {
        let target = Target::parse("https://www.instagram.com/h96futsal/").unwrap();
        let mut row = SnapshotRow {
            entity_id: "other".to_string(),
            display_name: String::new(),
            metric_value: 0,
            capture_date: None,
            source_url: " https://www.instagram.com/h96futsal/ ".to_string(),
        };
        assert!(target.matches(&row));

        row.source_url = "https://instagram.com/h96futsal".to_string();
        assert!(!target.matches(&row));

        row.entity_id = "h96futsal".to_string();
        assert!(target.matches(&row));
    }
}
