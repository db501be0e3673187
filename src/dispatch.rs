// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing and command dispatch.

use crate::{
    commands, config,
    report::{ExportKind, ViewKind},
};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the snapshot table: a SQLite database, or a CSV file if the
    /// extension is .csv
    #[arg(short, long, default_value = "snapshots.db", global = true)]
    database: Utf8PathBuf,

    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: Utf8PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
enum Command {
    /// Capture today's follower counts for every configured account
    Collect {
        /// Only list the accounts that still need a snapshot today
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the ranking, the trend and the total follower series
    Report {
        /// Compare against the snapshot closest to this many weeks ago
        #[arg(short, long)]
        weeks: Option<u32>,

        /// Number of accounts shown at each end of the trend list
        #[arg(short = 'n', long)]
        top: Option<usize>,

        /// Re-render every SECS seconds until interrupted
        #[arg(long, value_name = "SECS")]
        watch: Option<u64>,
    },

    /// Show the follower history of one account
    History {
        /// Account handle, with or without a leading '@'
        handle: String,
    },

    /// Generate charts from collected statistics
    Charts {
        /// Output directory for charts
        #[arg(short, long, default_value = "charts")]
        output: Utf8PathBuf,

        /// Also chart the history of this account
        #[arg(short, long)]
        entity: Option<String>,
    },

    /// Export a view to various formats
    Export {
        #[command(subcommand)]
        export_type: ExportType,
    },

    /// Import a spreadsheet export (CSV) into the snapshot table
    Import {
        /// CSV file to import
        source: Utf8PathBuf,
    },
}

#[derive(Parser, Debug)]
enum ExportType {
    /// Export to CSV format
    Csv {
        /// Output file path
        #[arg(short, long)]
        output: Utf8PathBuf,

        /// Which view to export
        #[arg(short, long, value_enum, default_value = "ranking")]
        view: ViewKind,
    },

    /// Export to JSON format
    Json {
        /// Output file path
        #[arg(short, long)]
        output: Utf8PathBuf,

        /// Which view to export
        #[arg(short, long, value_enum, default_value = "ranking")]
        view: ViewKind,
    },
}

/// Parse arguments and dispatch to the appropriate command.
pub async fn dispatch() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Collect { dry_run } => {
            let config =
                config::Config::load(&args.config).context("failed to load configuration")?;
            commands::run_collect(&args.database, &config, dry_run).await?;
        }
        Command::Report { weeks, top, watch } => {
            let config = load_config_or_default(&args.config)?;
            commands::run_report(&args.database, &config, weeks, top, watch).await?;
        }
        Command::History { handle } => {
            commands::run_history(&args.database, &handle)?;
        }
        Command::Charts { output, entity } => {
            let config = load_config_or_default(&args.config)?;
            commands::run_charts(&args.database, &config, &output, entity.as_deref())?;
        }
        Command::Export { export_type } => {
            let config = load_config_or_default(&args.config)?;
            let export_kind = match export_type {
                ExportType::Csv { output, view } => ExportKind::Csv {
                    output: output.to_string(),
                    view,
                },
                ExportType::Json { output, view } => ExportKind::Json {
                    output: output.to_string(),
                    view,
                },
            };
            commands::run_export(&args.database, &config, export_kind)?;
        }
        Command::Import { source } => {
            commands::run_import(&args.database, &source)?;
        }
    }

    Ok(())
}

/// Read-only commands work without a config file.
fn load_config_or_default(path: &camino::Utf8Path) -> Result<config::Config> {
    if path.exists() {
        config::Config::load(path).context("failed to load configuration")
    } else {
        log::debug!("no config file at {}, using defaults", path);
        Ok(config::Config::default())
    }
}
