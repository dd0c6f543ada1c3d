//! PNG rendering of the bucket size chart
//!
//! Text is drawn with an embedded copy of DejaVu Sans, registered with the
//! plotters glyph renderer on first use, so rendering needs no system fonts.

use std::sync::OnceLock;

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use plotters::prelude::*;
use plotters::style::register_font;

use crate::error::{MonitorError, Result};
use crate::models::SizeSnapshot;

pub const CHART_WIDTH: u32 = 1000;
pub const CHART_HEIGHT: u32 = 600;

/// Family the embedded font is registered under
const FONT_FAMILY: &str = "sans-serif";
static FONT_BYTES: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// Number of dashes across the max-size reference line
const DASH_COUNT: i64 = 40;

fn render_error<E: std::fmt::Display>(e: E) -> MonitorError {
    MonitorError::Render(e.to_string())
}

/// Format a unix timestamp as `HH:MM:SS` (UTC)
pub fn format_time_label(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Label of the historical maximum reference line
pub fn max_line_label(max_size: u64) -> String {
    format!("Max Size: {} bytes", max_size)
}

fn window_phrase(window_secs: i64) -> String {
    match window_secs {
        1 => "Last 1 Second".to_string(),
        n => format!("Last {} Seconds", n),
    }
}

/// Chart title for a report covering `window_secs`
pub fn chart_title(window_secs: i64) -> String {
    format!("Changes in Bucket Size ({})", window_phrase(window_secs))
}

/// Legend label of the size series
pub fn series_label(window_secs: i64) -> String {
    format!("Bucket Size ({})", window_phrase(window_secs))
}

/// Register the embedded chart font with plotters; idempotent
pub fn register_chart_font() -> Result<()> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let ok = *REGISTERED
        .get_or_init(|| register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES).is_ok());
    if ok {
        Ok(())
    } else {
        Err(MonitorError::Render("embedded chart font is invalid".to_string()))
    }
}

/// X range covering the points, or the fallback window when there are none.
/// Always at least one second wide.
fn x_range(points: &[(i64, i64)], fallback: (i64, i64)) -> (i64, i64) {
    let (start, end) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (first.0, last.0),
        _ => fallback,
    };
    let (start, end) = (start.min(end), start.max(end));
    (start.saturating_sub(1), end.saturating_add(1))
}

/// Y range from zero to comfortably above both the series and the max line
fn y_range(points: &[(i64, i64)], max_size: u64) -> i64 {
    let top = points
        .iter()
        .map(|p| p.1)
        .chain(std::iter::once(max_size as i64))
        .max()
        .unwrap_or(0);
    top + top / 10 + 1
}

/// Dash segments of a horizontal line at `y` between `start` and `end`
fn dashes(start: i64, end: i64, y: i64) -> Vec<Vec<(i64, i64)>> {
    let span = (end - start).max(1);
    let step = (span / DASH_COUNT).max(1);
    let mut segments = Vec::new();
    let mut x = start;
    while x < end {
        segments.push(vec![(x, y), ((x + step).min(end), y)]);
        x += step * 2;
    }
    segments
}

/// Render a line chart of `(timestamp, total_size)` with a dashed reference
/// line at `max_size`, encoded as PNG.
///
/// `window` is the reported time range; it titles the chart and is the x
/// range shown when `snapshots` is empty.
pub fn render_size_chart(snapshots: &[SizeSnapshot], max_size: u64, window: (i64, i64)) -> Result<Vec<u8>> {
    register_chart_font()?;

    let mut points: Vec<(i64, i64)> = snapshots
        .iter()
        .map(|s| (s.timestamp, s.total_size as i64))
        .collect();
    points.sort_by_key(|p| p.0);

    let window_secs = window.1.saturating_sub(window.0).max(0);
    let (x_min, x_max) = x_range(&points, window);
    let y_max = y_range(&points, max_size);
    let max_line = max_size as i64;

    let mut pixels = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (CHART_WIDTH, CHART_HEIGHT))
            .into_drawing_area();
        root.fill(&WHITE).map_err(render_error)?;

        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .caption(chart_title(window_secs), (FONT_FAMILY, 24))
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(x_min..x_max, 0i64..y_max)
            .map_err(render_error)?;

        chart
            .configure_mesh()
            .x_desc("Time")
            .y_desc("Size (Bytes)")
            .x_label_formatter(&|ts| format_time_label(*ts))
            .label_style((FONT_FAMILY, 14))
            .axis_desc_style((FONT_FAMILY, 16))
            .draw()
            .map_err(render_error)?;

        chart
            .draw_series(LineSeries::new(points.iter().copied(), BLUE.stroke_width(2)))
            .map_err(render_error)?
            .label(series_label(window_secs))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.stroke_width(2)));

        chart
            .draw_series(
                points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 4, BLUE.filled())),
            )
            .map_err(render_error)?;

        chart
            .draw_series(
                dashes(x_min, x_max, max_line)
                    .into_iter()
                    .map(|segment| PathElement::new(segment, RED.stroke_width(2))),
            )
            .map_err(render_error)?
            .label(max_line_label(max_size))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));

        chart
            .configure_series_labels()
            .label_font((FONT_FAMILY, 14))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_error)?;

        root.present().map_err(render_error)?;
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(&pixels, CHART_WIDTH, CHART_HEIGHT, ColorType::Rgb8)
        .map_err(render_error)?;

    Ok(png)
}
