//! Scalar metric samples as fetched for one (run, log name).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scalar value logged at a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub step: i64,
    pub time: DateTime<Utc>,
    pub value: f64,
}

impl MetricSample {
    pub fn new(step: i64, time: DateTime<Utc>, value: f64) -> Self {
        Self { step, time, value }
    }

    /// Sample with a placeholder timestamp; handy when only steps matter.
    pub fn at_step(step: i64, value: f64) -> Self {
        Self {
            step,
            time: DateTime::<Utc>::UNIX_EPOCH,
            value,
        }
    }

    /// Unix time in (fractional) seconds.
    pub fn unix_seconds(&self) -> f64 {
        self.time.timestamp_millis() as f64 / 1_000.0
    }
}

/// Values of a series split into parallel arrays.
pub fn values(samples: &[MetricSample]) -> Vec<f64> {
    samples.iter().map(|s| s.value).collect()
}

pub fn steps_as_x(samples: &[MetricSample]) -> Vec<f64> {
    samples.iter().map(|s| s.step as f64).collect()
}

/// Seconds elapsed since the first sample.
pub fn relative_seconds(samples: &[MetricSample]) -> Vec<f64> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    samples
        .iter()
        .map(|s| (s.time - first.time).num_milliseconds() as f64 / 1_000.0)
        .collect()
}

pub fn wall_seconds(samples: &[MetricSample]) -> Vec<f64> {
    samples.iter().map(MetricSample::unix_seconds).collect()
}
