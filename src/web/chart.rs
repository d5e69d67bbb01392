//! Bar-chart geometry for test results.
//!
//! Reduces an [`AggregateSummary`] into everything the inline SVG needs:
//! margins, bar rectangles, "nice" y-axis ticks and the average line. Pure
//! computation, no I/O; rendering happens in the template layer.

use crate::probe::AggregateSummary;

const BASE_WIDTH: u64 = 720;
const HEIGHT: u64 = 220;
const MARGIN_LEFT: u64 = 48;
const MARGIN_RIGHT: u64 = 12;
const MARGIN_TOP: u64 = 12;
const MARGIN_BOTTOM: u64 = 28;
const GAP: u64 = 8;
const MIN_BAR_WIDTH: u64 = 3;

/// One bar of the chart.
#[derive(Debug, Clone)]
pub struct Bar {
    pub x: u64,
    pub y: u64,
    pub width: u64,
    pub height: u64,
    pub color: &'static str,
    pub label: String,
    pub ms: u64,
    pub xlabel: String,
    pub show_xlabel: bool,
}

/// A labeled y-axis tick.
#[derive(Debug, Clone)]
pub struct YTick {
    pub y: u64,
    pub label: String,
}

/// Full chart geometry.
#[derive(Debug, Clone)]
pub struct Chart {
    pub width: u64,
    pub height: u64,
    pub series: Vec<Bar>,
    pub y_ticks: Vec<YTick>,
    pub max_ms: u64,
    pub plot_w: u64,
    pub plot_h: u64,
    pub margin_left: u64,
    pub margin_top: u64,
    pub baseline_y: u64,
    pub avg_y: Option<u64>,
    pub x_step: usize,
    pub count_total: usize,
    pub count_measured: usize,
    pub avg_ms: Option<u64>,
}

/// Pick a tick step on a 1-2-5 progression covering `raw`.
fn nice_step(raw: f64) -> u64 {
    if raw <= 0.0 {
        return 1;
    }
    let exp = raw.log10().floor();
    let base = raw / 10f64.powf(exp);
    let nice = if base <= 1.0 {
        1.0
    } else if base <= 2.0 {
        2.0
    } else if base <= 5.0 {
        5.0
    } else {
        10.0
    };
    (nice * 10f64.powf(exp)) as u64
}

/// X-axis labels are thinned out as the bar count grows.
fn x_label_step(n: usize) -> usize {
    if n <= 20 {
        1
    } else if n <= 100 {
        10
    } else if n <= 250 {
        25
    } else if n <= 500 {
        50
    } else {
        100
    }
}

/// Build chart geometry from a summary.
///
/// The width grows beyond the 720px base when needed to keep every bar at
/// least [`MIN_BAR_WIDTH`] wide.
pub fn build_chart(summary: &AggregateSummary) -> Chart {
    let mut dmax: u64 = summary
        .entries
        .iter()
        .filter_map(|e| e.elapsed_ms)
        .max()
        .unwrap_or(0);
    if dmax == 0 {
        dmax = 1;
    }

    // Nice y maximum: round up to a multiple of a 1-2-5 step aiming at ~5 ticks
    let baseline_max = dmax.div_ceil(10) * 10;
    let step = nice_step(baseline_max as f64 / 5.0).max(1);
    let nice_max = dmax.div_ceil(step) * step;

    let n = summary.entries.len().max(1) as u64;
    let required_plot_w = (n + 1) * GAP + n * MIN_BAR_WIDTH;
    let width = BASE_WIDTH.max(MARGIN_LEFT + required_plot_w + MARGIN_RIGHT);
    let plot_w = (width - MARGIN_LEFT - MARGIN_RIGHT).max(1);
    let plot_h = (HEIGHT - MARGIN_TOP - MARGIN_BOTTOM).max(1);

    let y_for = |ms: u64| -> u64 {
        let frac = (ms as f64 / nice_max as f64).clamp(0.0, 1.0);
        MARGIN_TOP + ((1.0 - frac) * plot_h as f64).round() as u64
    };

    let bar_width = MIN_BAR_WIDTH.max((plot_w - (n + 1) * GAP) / n);
    let x_step = x_label_step(summary.entries.len());

    let series: Vec<Bar> = summary
        .entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let ms = entry.elapsed_ms.unwrap_or(0);
            let y = y_for(ms);
            let index1 = idx + 1;
            Bar {
                x: MARGIN_LEFT + GAP + idx as u64 * (bar_width + GAP),
                y,
                width: bar_width,
                height: MARGIN_TOP + plot_h - y,
                color: entry.color,
                label: if entry.label.is_empty() {
                    index1.to_string()
                } else {
                    entry.label.clone()
                },
                ms,
                xlabel: index1.to_string(),
                show_xlabel: index1 == 1
                    || index1 == summary.entries.len()
                    || index1 % x_step == 0,
            }
        })
        .collect();

    let y_ticks: Vec<YTick> = (0..=nice_max)
        .step_by(step as usize)
        .map(|ms| YTick {
            y: y_for(ms),
            label: format!("{} ms", ms),
        })
        .collect();

    Chart {
        width,
        height: HEIGHT,
        series,
        y_ticks,
        max_ms: nice_max,
        plot_w,
        plot_h,
        margin_left: MARGIN_LEFT,
        margin_top: MARGIN_TOP,
        baseline_y: MARGIN_TOP + plot_h,
        avg_y: summary.avg_ms.map(y_for),
        x_step,
        count_total: summary.count_total,
        count_measured: summary.count_measured,
        avg_ms: summary.avg_ms,
    }
}
