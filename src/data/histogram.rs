//! Histogram frames and rebinning onto a shared bin grid.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rebinned cells are rounded to this resolution to suppress floating noise.
pub const REBIN_ROUNDING: f64 = 1e-6;

/// Positions closer than this to an integer bin boundary are snapped onto it.
const BOUNDARY_SNAP: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("invalid bin range: min {min} > max {max}")]
    InvalidRange { min: f64, max: f64 },
    #[error("bin range is not finite")]
    NonFiniteRange,
    #[error("histogram must have at least one bin")]
    ZeroBins,
    #[error("expected {expected} frequencies, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("frequency at bin {index} is invalid: {value}")]
    InvalidFrequency { index: usize, value: f64 },
}

/// Bin layout of a single frame: `count` equal-width bins spanning `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinSpec {
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl BinSpec {
    pub fn new(min: f64, max: f64, count: usize) -> Self {
        Self { min, max, count }
    }

    /// Width of one bin. Zero for a point-mass frame (`min == max`).
    pub fn bin_width(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.max - self.min) / self.count as f64
    }
}

/// One distribution sample at a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramFrame {
    pub step: i64,
    pub bins: BinSpec,
    pub freq: Vec<f64>,
}

impl HistogramFrame {
    /// Build a frame, checking `min <= max`, `count >= 1`, `freq.len() == count`
    /// and that every frequency is finite and non-negative.
    pub fn try_new(step: i64, bins: BinSpec, freq: Vec<f64>) -> Result<Self, FrameError> {
        if !bins.min.is_finite() || !bins.max.is_finite() {
            return Err(FrameError::NonFiniteRange);
        }
        if bins.min > bins.max {
            return Err(FrameError::InvalidRange {
                min: bins.min,
                max: bins.max,
            });
        }
        if bins.count == 0 {
            return Err(FrameError::ZeroBins);
        }
        if freq.len() != bins.count {
            return Err(FrameError::LengthMismatch {
                expected: bins.count,
                actual: freq.len(),
            });
        }
        if let Some((index, &value)) = freq
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(FrameError::InvalidFrequency { index, value });
        }
        Ok(Self { step, bins, freq })
    }

    /// Sum of all frequency values.
    pub fn mass(&self) -> f64 {
        self.freq.iter().sum()
    }

    pub fn max_freq(&self) -> f64 {
        self.freq.iter().copied().fold(0.0, f64::max)
    }
}

/// Shared binning scheme that a batch of frames is remapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalBinGrid {
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl GlobalBinGrid {
    pub fn new(min: f64, max: f64, count: usize) -> Self {
        Self { min, max, count }
    }

    /// The grid a frame already conforms to.
    pub fn of_frame(frame: &HistogramFrame) -> Self {
        Self::new(frame.bins.min, frame.bins.max, frame.bins.count)
    }

    /// Zero bins, or a range that is empty or not finite.
    pub fn is_degenerate(&self) -> bool {
        self.count == 0 || !(self.max > self.min) || !self.min.is_finite() || !self.max.is_finite()
    }

    pub fn bin_width(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        (self.max - self.min) / self.count as f64
    }

    /// Left edge of target bin `index`.
    pub fn edge(&self, index: usize) -> f64 {
        self.min + index as f64 * self.bin_width()
    }

    /// Target bin holding `x`; `max` itself belongs to the last bin.
    pub fn index_of(&self, x: f64) -> Option<usize> {
        if self.is_degenerate() || x < self.min || x > self.max {
            return None;
        }
        let pos = snap((x - self.min) / self.bin_width()).floor() as usize;
        Some(pos.min(self.count - 1))
    }
}

fn snap(pos: f64) -> f64 {
    let r = pos.round();
    if (pos - r).abs() < BOUNDARY_SNAP {
        r
    } else {
        pos
    }
}

fn round_cell(v: f64) -> f64 {
    if v <= 0.0 {
        return 0.0;
    }
    (v / REBIN_ROUNDING).round() * REBIN_ROUNDING
}

/// Remap `frame` onto `grid`, splitting each source bin across the target bins it
/// overlaps in proportion to the overlap width.
///
/// The result always has `grid.count` cells. A degenerate grid yields all zeros.
/// Mass falling outside the grid range is dropped.
pub fn rebin(frame: &HistogramFrame, grid: &GlobalBinGrid) -> Vec<f64> {
    let mut out = vec![0.0; grid.count];
    if grid.is_degenerate() {
        return out;
    }
    let dt = grid.bin_width();
    let count = grid.count as f64;
    let src_width = frame.bins.bin_width();

    for (i, &f) in frame.freq.iter().enumerate() {
        if !(f > 0.0) {
            continue;
        }
        let start = frame.bins.min + i as f64 * src_width;
        if src_width <= 0.0 {
            // point mass
            if let Some(idx) = grid.index_of(start) {
                out[idx] += f;
            }
            continue;
        }
        let end = start + src_width;
        let first = snap((start - grid.min) / dt).floor();
        let last = snap((end - grid.min) / dt).ceil();
        if last <= 0.0 || first >= count {
            continue;
        }

        if last - first <= 1.0 {
            out[first as usize] += f;
            continue;
        }

        let lo = first.max(0.0) as usize;
        let hi = last.min(count) as usize;
        for (t, cell) in out.iter_mut().enumerate().take(hi).skip(lo) {
            let t_start = grid.edge(t);
            let t_end = t_start + dt;
            let overlap = end.min(t_end) - start.max(t_start);
            if overlap > 0.0 {
                *cell += f * overlap / src_width;
            }
        }
    }

    for v in out.iter_mut() {
        *v = round_cell(*v);
    }
    out
}

/// Rebin a whole frame, keeping its step.
pub fn rebin_frame(frame: &HistogramFrame, grid: &GlobalBinGrid) -> HistogramFrame {
    HistogramFrame {
        step: frame.step,
        bins: BinSpec::new(grid.min, grid.max, grid.count),
        freq: rebin(frame, grid),
    }
}
