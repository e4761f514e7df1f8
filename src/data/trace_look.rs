//! TraceLook: visual styling for series traces.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Opacity of the raw series drawn beneath its smoothed counterpart.
pub const ORIGINAL_DATA_OPACITY: f32 = 0.1;

static PALETTE: Lazy<Vec<[u8; 3]>> = Lazy::new(|| {
    vec![
        [31, 119, 180],
        [255, 127, 14],
        [44, 160, 44],
        [214, 39, 40],
        [148, 103, 189],
        [140, 86, 75],
        [227, 119, 194],
        [127, 127, 127],
        [188, 189, 34],
        [23, 190, 207],
    ]
});

/// The visual presentation of a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceLook {
    pub color: [u8; 3],
    pub opacity: f32,
    pub width: f32,
    pub visible: bool,
    pub show_in_legend: bool,
}

impl Default for TraceLook {
    fn default() -> Self {
        Self {
            color: [127, 127, 127],
            opacity: 1.0,
            width: 1.5,
            visible: true,
            show_in_legend: true,
        }
    }
}

impl TraceLook {
    /// Create a new TraceLook with a color allocated based on the trace index.
    pub fn new(index: usize) -> Self {
        Self {
            color: Self::alloc_color(index),
            ..Default::default()
        }
    }

    /// Allocate a distinct color for the given trace index.
    pub fn alloc_color(index: usize) -> [u8; 3] {
        PALETTE[index % PALETTE.len()]
    }

    /// Same color, faded and kept out of the legend.
    pub fn faded(&self) -> Self {
        Self {
            opacity: ORIGINAL_DATA_OPACITY,
            show_in_legend: false,
            ..self.clone()
        }
    }

    /// Color with the opacity folded into an alpha channel.
    pub fn rgba(&self) -> [u8; 4] {
        let a = (self.opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        [self.color[0], self.color[1], self.color[2], a]
    }
}
