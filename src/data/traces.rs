use serde::{Deserialize, Serialize};

use crate::data::trace_look::TraceLook;

/// Name of a series as shown in the legend (typically `run/log name`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceRef(pub String);

/// A render-ready line: parallel `x`/`y` arrays and how to draw them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SeriesTrace {
    pub name: TraceRef,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub look: TraceLook,
    pub info: String,
}

impl SeriesTrace {
    pub fn new(name: impl Into<String>, x: Vec<f64>, y: Vec<f64>, look: TraceLook) -> Self {
        Self {
            name: TraceRef(name.into()),
            x,
            y,
            look,
            info: String::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.x.len().min(self.y.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn points(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        self.x.iter().zip(self.y.iter()).map(|(&x, &y)| [x, y])
    }
}
