// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for follower statistics collection.

use crate::{
    retry::{PolitenessDelay, RetryPolicy},
    target::Target,
};
use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::{fs, time::Duration};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub target: Vec<TargetConfig>,

    #[serde(default)]
    pub collect: CollectConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TargetConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CollectConfig {
    pub max_attempts: u32,
    pub backoff_secs: u64,
    pub politeness_min_secs: u64,
    pub politeness_max_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_secs: 60,
            politeness_min_secs: 45,
            politeness_max_secs: 90,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReportConfig {
    pub trend_weeks: u32,
    pub top: usize,
    pub cache_ttl_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            trend_weeks: 4,
            top: 10,
            cache_ttl_secs: 3600,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = fs::read_to_string(path.as_std_path())
            .with_context(|| format!("failed to read config file at {}", path))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file at {}", path))?;
        config
            .validate()
            .with_context(|| format!("invalid config file at {}", path))?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.targets()?;
        if self.collect.max_attempts == 0 {
            anyhow::bail!("collect.max-attempts must be at least 1");
        }
        if self.collect.politeness_min_secs > self.collect.politeness_max_secs {
            anyhow::bail!(
                "collect.politeness-min-secs ({}) exceeds collect.politeness-max-secs ({})",
                self.collect.politeness_min_secs,
                self.collect.politeness_max_secs
            );
        }
        Ok(())
    }

    /// Get all targets, in configured order.
    pub fn targets(&self) -> Result<Vec<Target>> {
        self.target.iter().map(|t| Target::parse(&t.url)).collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.collect.max_attempts,
            backoff: Duration::from_secs(self.collect.backoff_secs),
        }
    }

    pub fn politeness(&self) -> PolitenessDelay {
        PolitenessDelay {
            min: Duration::from_secs(self.collect.politeness_min_secs),
            max: Duration::from_secs(self.collect.politeness_max_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.collect.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.report.cache_ttl_secs)
    }
}
