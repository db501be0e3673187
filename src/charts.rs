// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chart generation for follower statistics visualization.

use crate::{
    aggregate::{DashboardViews, TotalPoint, entity_history, signed},
    snapshot::{SnapshotRow, format_number},
};
use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{Duration, NaiveDate};
use plotters::coord::types::RangedCoordi64;
use plotters::prelude::*;

const CHART_WIDTH: u32 = 1600;
const CHART_HEIGHT: u32 = 900;

// Typography - Inter font family
const FONT_FAMILY: &str = "Inter";
const TITLE_SIZE: i32 = 24;
const LABEL_SIZE: i32 = 16;
const AXIS_SIZE: i32 = 14;

// Colors - Modern, minimal palette
const BACKGROUND: RGBColor = RGBColor(250, 250, 252); // Off-white
const TEXT_PRIMARY: RGBColor = RGBColor(15, 23, 42); // Slate 900
const TEXT_SECONDARY: RGBColor = RGBColor(100, 116, 139); // Slate 500
const GRID_COLOR: RGBColor = RGBColor(226, 232, 240); // Slate 200
const ACCENT_GREEN: RGBColor = RGBColor(34, 197, 94); // Green 500

const SERIES_COLORS: [RGBColor; 5] = [
    RGBColor(99, 102, 241),  // Indigo
    RGBColor(59, 130, 246),  // Blue
    RGBColor(34, 197, 94),   // Green
    RGBColor(251, 146, 60),  // Orange
    RGBColor(236, 72, 153),  // Pink
];

/// At most this many accounts share the top-accounts chart.
const MAX_SERIES: usize = SERIES_COLORS.len();

/// Generate all charts from the computed views.
///
/// With `entity`, also draws that account's history.
pub fn generate_all_charts(
    views: &DashboardViews,
    output_dir: &Utf8Path,
    entity: Option<&str>,
) -> Result<()> {
    std::fs::create_dir_all(output_dir.as_std_path())
        .with_context(|| format!("failed to create output directory at {}", output_dir))?;

    log::info!("generating charts in {}", output_dir);

    generate_total_followers(&views.totals, &output_dir.join("total-followers.png"))?;
    generate_top_accounts(views, &output_dir.join("top-accounts.png"))?;

    if let Some(entity) = entity {
        let handle = entity.trim().trim_start_matches('@');
        let history = entity_history(&views.rows, handle);
        if history.is_empty() {
            anyhow::bail!("no snapshots for @{}", handle);
        }
        let file_name = format!("history-{}.png", sanitize_file_name(handle));
        generate_entity_history(handle, &history, &output_dir.join(file_name))?;
    }

    println!("Charts saved to {}.", output_dir);
    Ok(())
}

/// Create a styled drawing area with background.
fn create_drawing_area(
    output_path: &Utf8Path,
) -> Result<DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>> {
    let root = BitMapBackend::new(output_path.as_std_path(), (CHART_WIDTH, CHART_HEIGHT))
        .into_drawing_area();
    root.fill(&BACKGROUND)?;
    Ok(root)
}

/// Configure common mesh styling for date-based charts.
fn configure_date_mesh<DB: DrawingBackend>(
    chart: &mut ChartContext<DB, Cartesian2d<RangedDate<NaiveDate>, RangedCoordi64>>,
) -> Result<()>
where
    <DB as DrawingBackend>::ErrorType: 'static,
{
    chart
        .configure_mesh()
        .bold_line_style(&GRID_COLOR.mix(0.3))
        .light_line_style(&TRANSPARENT)
        .x_labels(8)
        .y_labels(6)
        .x_label_style((FONT_FAMILY, AXIS_SIZE).into_font().color(&TEXT_SECONDARY))
        .y_label_style((FONT_FAMILY, AXIS_SIZE).into_font().color(&TEXT_SECONDARY))
        .x_label_formatter(&|date| date.format("%Y-%m-%d").to_string())
        .y_label_formatter(&|y| format_number((*y).max(0) as u64))
        .disable_x_mesh()
        .draw()?;
    Ok(())
}

/// Date range for the x axis. A single day is widened so the range is not
/// empty.
fn date_range(dates: impl Iterator<Item = NaiveDate>) -> Option<(NaiveDate, NaiveDate)> {
    let (min, max) = dates.fold(None, |acc: Option<(NaiveDate, NaiveDate)>, d| match acc {
        None => Some((d, d)),
        Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
    })?;
    if min == max {
        Some((min, max + Duration::days(1)))
    } else {
        Some((min, max))
    }
}

fn y_max(values: impl Iterator<Item = u64>) -> i64 {
    let max = signed(values.max().unwrap_or(0));
    // Leave some headroom above the highest point.
    max.saturating_add(max / 10).max(1)
}

/// Generate the total followers chart (area + line).
fn generate_total_followers(totals: &[TotalPoint], output_path: &Utf8Path) -> Result<()> {
    let Some((min_date, max_date)) = date_range(totals.iter().map(|p| p.date)) else {
        return Ok(());
    };

    let root = create_drawing_area(output_path)?;
    let max_followers = y_max(totals.iter().map(|p| p.total));

    let mut chart = ChartBuilder::on(&root)
        .caption(
            "Total Followers - All Tracked Accounts",
            (FONT_FAMILY, TITLE_SIZE).into_font().color(&TEXT_PRIMARY),
        )
        .margin(60)
        .x_label_area_size(70)
        .y_label_area_size(100)
        .build_cartesian_2d(min_date..max_date, 0i64..max_followers)?;

    configure_date_mesh(&mut chart)?;

    chart.draw_series(AreaSeries::new(
        totals.iter().map(|p| (p.date, signed(p.total))),
        0,
        ACCENT_GREEN.mix(0.15),
    ))?;

    chart.draw_series(LineSeries::new(
        totals.iter().map(|p| (p.date, signed(p.total))),
        ShapeStyle {
            color: ACCENT_GREEN.to_rgba(),
            filled: true,
            stroke_width: 2,
        },
    ))?;

    root.present()?;
    println!("  • total-followers.png");
    Ok(())
}

/// Generate the follower history of the top-ranked accounts (one line each).
fn generate_top_accounts(views: &DashboardViews, output_path: &Utf8Path) -> Result<()> {
    let series: Vec<(String, Vec<SnapshotRow>)> = views
        .ranking
        .iter()
        .take(MAX_SERIES)
        .map(|entry| {
            let label = if entry.display_name.is_empty() {
                format!("@{}", entry.entity_id)
            } else {
                entry.display_name.clone()
            };
            (label, entity_history(&views.rows, &entry.entity_id))
        })
        .collect();

    let all_rows: Vec<&SnapshotRow> = series.iter().flat_map(|(_, rows)| rows).collect();
    let Some((min_date, max_date)) = date_range(all_rows.iter().filter_map(|r| r.capture_date))
    else {
        return Ok(());
    };
    let max_followers = y_max(all_rows.iter().map(|r| r.metric_value));

    let root = create_drawing_area(output_path)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Followers - Top {} Accounts", series.len()),
            (FONT_FAMILY, TITLE_SIZE).into_font().color(&TEXT_PRIMARY),
        )
        .margin(60)
        .x_label_area_size(70)
        .y_label_area_size(100)
        .build_cartesian_2d(min_date..max_date, 0i64..max_followers)?;

    configure_date_mesh(&mut chart)?;

    for (idx, (label, rows)) in series.iter().enumerate() {
        let color = SERIES_COLORS[idx % SERIES_COLORS.len()];
        chart
            .draw_series(LineSeries::new(
                points(rows),
                ShapeStyle {
                    color: color.to_rgba(),
                    filled: true,
                    stroke_width: 3,
                },
            ))?
            .label(label.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .label_font((FONT_FAMILY, LABEL_SIZE).into_font().color(&TEXT_PRIMARY))
        .background_style(&BACKGROUND)
        .border_style(&GRID_COLOR)
        .position(SeriesLabelPosition::UpperLeft)
        .margin(15)
        .draw()?;

    root.present()?;
    println!("  • top-accounts.png");
    Ok(())
}

/// Generate one account's follower history with point markers.
fn generate_entity_history(
    handle: &str,
    history: &[SnapshotRow],
    output_path: &Utf8Path,
) -> Result<()> {
    let Some((min_date, max_date)) = date_range(history.iter().filter_map(|r| r.capture_date))
    else {
        return Ok(());
    };
    let max_followers = y_max(history.iter().map(|r| r.metric_value));
    let title = match history.last() {
        Some(last) if !last.display_name.is_empty() => {
            format!("Followers - {} (@{})", last.display_name, handle)
        }
        _ => format!("Followers - @{}", handle),
    };

    let root = create_drawing_area(output_path)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            title,
            (FONT_FAMILY, TITLE_SIZE).into_font().color(&TEXT_PRIMARY),
        )
        .margin(60)
        .x_label_area_size(70)
        .y_label_area_size(100)
        .build_cartesian_2d(min_date..max_date, 0i64..max_followers)?;

    configure_date_mesh(&mut chart)?;

    chart.draw_series(LineSeries::new(
        points(history),
        ShapeStyle {
            color: ACCENT_GREEN.to_rgba(),
            filled: true,
            stroke_width: 3,
        },
    ))?;
    chart.draw_series(
        points(history).map(|(d, v)| Circle::new((d, v), 5, ACCENT_GREEN.filled())),
    )?;

    root.present()?;
    println!("  • {}", output_path.file_name().unwrap_or_default());
    Ok(())
}

fn points(rows: &[SnapshotRow]) -> impl Iterator<Item = (NaiveDate, i64)> + '_ {
    rows.iter()
        .filter_map(|r| r.capture_date.map(|d| (d, signed(r.metric_value))))
}

fn sanitize_file_name(handle: &str) -> String {
    handle
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
