//! Join two independently stepped series on their shared steps.

use std::collections::HashMap;

use super::samples::MetricSample;

/// Paired arrays sorted ascending by `x`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedSeries {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl AlignedSeries {
    /// No shared steps: the two series cannot be compared.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }
}

// -0.0 and 0.0 must collide as keys
fn key_bits(v: f64) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

/// Inner-join `reference` (x axis) with `values` (y axis) on `step`.
///
/// Pairs are keyed by the reference value: when several `values` samples land on
/// the same reference value, the later one wins.
pub fn align_by_step(reference: &[MetricSample], values: &[MetricSample]) -> AlignedSeries {
    let by_step: HashMap<i64, f64> = reference.iter().map(|s| (s.step, s.value)).collect();

    let mut slot_of: HashMap<u64, usize> = HashMap::new();
    let mut pairs: Vec<(f64, f64)> = Vec::new();
    for b in values {
        let Some(&a) = by_step.get(&b.step) else {
            continue;
        };
        match slot_of.get(&key_bits(a)) {
            Some(&slot) => pairs[slot].1 = b.value,
            None => {
                slot_of.insert(key_bits(a), pairs.len());
                pairs.push((a, b.value));
            }
        }
    }

    pairs.sort_by(|l, r| l.0.total_cmp(&r.0));
    let (x, y) = pairs.into_iter().unzip();
    AlignedSeries { x, y }
}
