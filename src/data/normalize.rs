//! Multi-frame normalization: one shared bin grid and one vertical scale for a
//! batch of histogram frames (steps of one run, or one step across runs).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::histogram::{rebin_frame, GlobalBinGrid, HistogramFrame};
use super::memo::Memo;

/// Default fraction of the union range added on each side of the grid.
pub const DEFAULT_PADDING_FRACTION: f64 = 0.10;

/// Half-width used when every frame in the batch collapses onto one value.
const ZERO_RANGE_HALF_WIDTH: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    pub padding_fraction: f64,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            padding_fraction: DEFAULT_PADDING_FRACTION,
        }
    }
}

/// Frames rebinned onto one grid, plus the largest cell across all of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSet {
    /// `None` when the batch was empty.
    pub grid: Option<GlobalBinGrid>,
    pub frames: Vec<HistogramFrame>,
    pub global_max_freq: f64,
}

impl NormalizedSet {
    /// The "no data" state.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<&HistogramFrame> {
        self.frames.get(index)
    }

    pub fn steps(&self) -> Vec<i64> {
        self.frames.iter().map(|f| f.step).collect()
    }

    /// Index of the frame recorded at `step`, if any.
    pub fn index_of_step(&self, step: i64) -> Option<usize> {
        self.frames.iter().position(|f| f.step == step)
    }

    /// Index of the last frame in playback order.
    pub fn max_index(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }
}

/// Union range of all frames, padded on both sides, with the finest bin count seen.
pub fn global_grid(frames: &[HistogramFrame], options: &NormalizeOptions) -> Option<GlobalBinGrid> {
    let first = frames.first()?;
    let (mut min, mut max, mut count) = (first.bins.min, first.bins.max, first.bins.count);
    for f in &frames[1..] {
        min = min.min(f.bins.min);
        max = max.max(f.bins.max);
        count = count.max(f.bins.count);
    }
    let range = max - min;
    let pad = if range > 0.0 {
        range * options.padding_fraction.max(0.0)
    } else {
        ZERO_RANGE_HALF_WIDTH
    };
    Some(GlobalBinGrid::new(min - pad, max + pad, count))
}

/// Rebin every frame of the batch onto the batch's global grid.
///
/// Costs `O(frames * max_count)`. Frame order is preserved.
pub fn normalize(frames: &[HistogramFrame], options: &NormalizeOptions) -> NormalizedSet {
    let Some(grid) = global_grid(frames, options) else {
        return NormalizedSet::default();
    };
    let frames: Vec<HistogramFrame> = frames.iter().map(|f| rebin_frame(f, &grid)).collect();
    let global_max_freq = frames.iter().map(HistogramFrame::max_freq).fold(0.0, f64::max);
    log::debug!(
        "normalized {} frames onto [{:.4}, {:.4}] x {} (max {:.4})",
        frames.len(),
        grid.min,
        grid.max,
        grid.count,
        global_max_freq
    );
    NormalizedSet {
        grid: Some(grid),
        frames,
        global_max_freq,
    }
}

/// All distribution frames of one run, ordered by step.
#[derive(Debug, Clone, PartialEq)]
pub struct RunHistograms {
    pub run: String,
    pub frames: Vec<HistogramFrame>,
}

/// One step compared across runs. `runs[i]` labels `set.frames[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunComparison {
    pub step: i64,
    pub runs: Vec<String>,
    pub set: NormalizedSet,
}

/// The frame a run shows at `step`: an exact match, otherwise its closest earlier step.
pub fn frame_at_or_before(frames: &[HistogramFrame], step: i64) -> Option<&HistogramFrame> {
    frames
        .iter()
        .filter(|f| f.step <= step)
        .max_by_key(|f| f.step)
}

/// Normalize one step across runs. Runs with nothing at or before `step` are left out.
pub fn normalize_runs_at_step(
    runs: &[RunHistograms],
    step: i64,
    options: &NormalizeOptions,
) -> RunComparison {
    let mut labels = Vec::new();
    let mut batch = Vec::new();
    for run in runs {
        if let Some(frame) = frame_at_or_before(&run.frames, step) {
            labels.push(run.run.clone());
            batch.push(frame.clone());
        }
    }
    RunComparison {
        step,
        runs: labels,
        set: normalize(&batch, options),
    }
}

/// Sorted, de-duplicated steps present in any run; the playback axis for
/// cross-run comparison.
pub fn union_steps(runs: &[RunHistograms]) -> Vec<i64> {
    let mut steps: Vec<i64> = runs
        .iter()
        .flat_map(|r| r.frames.iter().map(|f| f.step))
        .collect();
    steps.sort_unstable();
    steps.dedup();
    steps
}

/// Normalizer that only recomputes when the source batch is a new allocation
/// or the options change.
#[derive(Debug, Default)]
pub struct Normalizer {
    options: NormalizeOptions,
    memo: Memo<[HistogramFrame], NormalizeOptions, NormalizedSet>,
}

impl Normalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self {
            options,
            memo: Memo::new(),
        }
    }

    pub fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: NormalizeOptions) {
        self.options = options;
    }

    pub fn normalized(&mut self, frames: &Arc<[HistogramFrame]>) -> &NormalizedSet {
        let options = self.options;
        self.memo
            .get_or_compute(frames, &options, |frames, options| normalize(frames, options))
    }

    pub fn recomputes(&self) -> usize {
        self.memo.recomputes()
    }
}
