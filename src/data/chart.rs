//! Chart assembly: pick the x axis for each run's series, join on step when the
//! axis is another metric, then run the smoothing pipeline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::align::align_by_step;
use super::memo::Memo;
use super::samples::{self, MetricSample};
use super::smoothing::{apply_smoothing, SmoothedSeries, SmoothingConfig};
use super::trace_look::TraceLook;
use super::traces::SeriesTrace;

/// What a line chart is plotted against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "logName", rename_all = "camelCase")]
pub enum XAxis {
    #[default]
    Step,
    /// Seconds since the run's first sample.
    RelativeTime,
    /// Unix seconds.
    WallTime,
    /// Another logged metric of the same run, joined on step.
    Metric(String),
}

impl XAxis {
    pub fn label(&self) -> String {
        match self {
            XAxis::Step => "Step".to_string(),
            XAxis::RelativeTime => "Relative time (s)".to_string(),
            XAxis::WallTime => "Wall time".to_string(),
            XAxis::Metric(name) => name.clone(),
        }
    }
}

/// Per-chart preferences persisted per (organization, project, run or all).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChartSettings {
    pub x_axis: XAxis,
    pub log_x: bool,
    pub log_y: bool,
    pub smoothing: SmoothingConfig,
}

/// Outcome for one run's series.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesOutcome {
    NoData,
    /// The x-axis metric shares no step with the plotted metric.
    CannotCompare,
    Ready(SmoothedSeries),
}

/// Ready-to-render chart content.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartData {
    pub x_label: String,
    pub traces: Vec<SeriesTrace>,
    pub log_x: bool,
    pub log_y: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartView {
    NoData,
    /// No run could be joined against the chosen x axis.
    CannotCompare { x: String, y: String },
    Ready(ChartData),
}

impl ChartView {
    /// Message shown in place of the chart, if any.
    pub fn notice(&self) -> Option<String> {
        match self {
            ChartView::NoData => Some("No data".to_string()),
            ChartView::CannotCompare { x, y } => Some(format!("Cannot compare {x} with {y}")),
            ChartView::Ready(_) => None,
        }
    }
}

/// The inputs of one run's line.
#[derive(Debug, Clone, Copy)]
pub struct RunSeries<'a> {
    pub run: &'a str,
    pub log_name: &'a str,
    pub samples: &'a [MetricSample],
    /// Samples of the x-axis metric when [`XAxis::Metric`] is selected.
    pub x_samples: Option<&'a [MetricSample]>,
}

/// `(x, y)` arrays for `samples` against `axis`. `None` when a metric axis is
/// selected and its samples are missing.
pub fn series_xy(
    axis: &XAxis,
    samples: &[MetricSample],
    x_samples: Option<&[MetricSample]>,
) -> Option<(Vec<f64>, Vec<f64>)> {
    let ys = || samples::values(samples);
    match axis {
        XAxis::Step => Some((samples::steps_as_x(samples), ys())),
        XAxis::RelativeTime => Some((samples::relative_seconds(samples), ys())),
        XAxis::WallTime => Some((samples::wall_seconds(samples), ys())),
        XAxis::Metric(_) => {
            let aligned = align_by_step(x_samples?, samples);
            Some((aligned.x, aligned.y))
        }
    }
}

/// Build one run's traces.
pub fn build_series(
    name: &str,
    samples: &[MetricSample],
    x_samples: Option<&[MetricSample]>,
    settings: &ChartSettings,
    look: &TraceLook,
) -> SeriesOutcome {
    if samples.is_empty() {
        return SeriesOutcome::NoData;
    }
    match series_xy(&settings.x_axis, samples, x_samples) {
        Some((x, y)) if !x.is_empty() => {
            SeriesOutcome::Ready(apply_smoothing(name, &x, &y, &settings.smoothing, look))
        }
        _ => SeriesOutcome::CannotCompare,
    }
}

/// Build the whole chart across runs. Runs that cannot be joined are left out;
/// only when none remain is the chart reported as not comparable.
pub fn build_chart(series: &[RunSeries<'_>], settings: &ChartSettings) -> ChartView {
    let mut traces = Vec::new();
    let mut any_data = false;
    let mut y_name = String::new();
    for (index, s) in series.iter().enumerate() {
        if y_name.is_empty() {
            y_name = s.log_name.to_string();
        }
        let name = format!("{}/{}", s.run, s.log_name);
        match build_series(&name, s.samples, s.x_samples, settings, &TraceLook::new(index)) {
            SeriesOutcome::NoData => {}
            SeriesOutcome::CannotCompare => {
                any_data = true;
                log::debug!("{name}: no shared steps with {}", settings.x_axis.label());
            }
            SeriesOutcome::Ready(out) => {
                any_data = true;
                traces.extend(out.into_traces());
            }
        }
    }
    if !any_data {
        return ChartView::NoData;
    }
    if traces.is_empty() {
        return ChartView::CannotCompare {
            x: settings.x_axis.label(),
            y: y_name,
        };
    }
    ChartView::Ready(ChartData {
        x_label: settings.x_axis.label(),
        traces,
        log_x: settings.log_x,
        log_y: settings.log_y,
    })
}

/// Memoized single-series view: recomputed only when the sample collections
/// are new allocations or the name, settings or look change.
#[derive(Debug, Default)]
pub struct SeriesView {
    x_source: Option<Arc<[MetricSample]>>,
    memo: Memo<[MetricSample], (String, ChartSettings, TraceLook), SeriesOutcome>,
}

impl SeriesView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(
        &mut self,
        name: &str,
        samples: &Arc<[MetricSample]>,
        x_samples: Option<&Arc<[MetricSample]>>,
        settings: &ChartSettings,
        look: &TraceLook,
    ) -> &SeriesOutcome {
        let same_x = match (self.x_source.as_ref(), x_samples) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        };
        if !same_x {
            self.memo.invalidate();
            self.x_source = x_samples.cloned();
        }
        let x_slice = self.x_source.clone();
        self.memo.get_or_compute(
            samples,
            &(name.to_string(), settings.clone(), look.clone()),
            |samples, (name, settings, look)| {
                build_series(name, samples, x_slice.as_deref(), settings, look)
            },
        )
    }

    pub fn recomputes(&self) -> usize {
        self.memo.recomputes()
    }
}
