//! Series smoothing: running average, bias-corrected EMA, time-weighted EMA and
//! Gaussian kernel smoothing, plus the pipeline that turns one raw series into
//! render-ready traces.

use serde::{Deserialize, Serialize};

use super::trace_look::TraceLook;
use super::traces::SeriesTrace;

/// Largest decay weight accepted by the EMA variants.
pub const MAX_EMA_WEIGHT: f64 = 0.999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingAlgorithm {
    Ema,
    Twema,
    Gaussian,
    Running,
}

/// Valid parameter range and default of one algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
}

impl ParamRange {
    /// Clamp into `[min, max]` and snap onto the step grid. Non-finite input
    /// falls back to the default.
    pub fn clamp(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return self.default;
        }
        let v = value.clamp(self.min, self.max);
        let snapped = self.min + ((v - self.min) / self.step).round() * self.step;
        // keep the snapped value tidy, e.g. 0.6 instead of 0.6000000000000001
        let decimals = (-self.step.log10()).ceil().max(0.0) as i32;
        let scale = 10f64.powi(decimals);
        ((snapped * scale).round() / scale).clamp(self.min, self.max)
    }
}

impl SmoothingAlgorithm {
    pub fn all() -> &'static [SmoothingAlgorithm] {
        &[
            SmoothingAlgorithm::Ema,
            SmoothingAlgorithm::Twema,
            SmoothingAlgorithm::Gaussian,
            SmoothingAlgorithm::Running,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            SmoothingAlgorithm::Ema => "Exponential moving average",
            SmoothingAlgorithm::Twema => "Time-weighted EMA",
            SmoothingAlgorithm::Gaussian => "Gaussian",
            SmoothingAlgorithm::Running => "Running average",
        }
    }

    pub fn range(&self) -> ParamRange {
        match self {
            SmoothingAlgorithm::Running => ParamRange {
                min: 1.0,
                max: 100.0,
                step: 1.0,
                default: 10.0,
            },
            SmoothingAlgorithm::Gaussian => ParamRange {
                min: 0.1,
                max: 10.0,
                step: 0.1,
                default: 2.0,
            },
            SmoothingAlgorithm::Ema | SmoothingAlgorithm::Twema => ParamRange {
                min: 0.0,
                max: MAX_EMA_WEIGHT,
                step: 0.001,
                default: 0.6,
            },
        }
    }
}

/// User-facing smoothing settings for one chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmoothingConfig {
    pub enabled: bool,
    pub algorithm: SmoothingAlgorithm,
    pub parameter: f64,
    pub show_original_data: bool,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: SmoothingAlgorithm::Ema,
            parameter: SmoothingAlgorithm::Ema.range().default,
            show_original_data: true,
        }
    }
}

impl SmoothingConfig {
    /// Switch algorithm and reset the parameter to that algorithm's default.
    pub fn with_algorithm(mut self, algorithm: SmoothingAlgorithm) -> Self {
        self.algorithm = algorithm;
        self.parameter = algorithm.range().default;
        self
    }

    /// The parameter actually used: clamped to the algorithm's range.
    pub fn effective_parameter(&self) -> f64 {
        self.algorithm.range().clamp(self.parameter)
    }
}

/// Trailing moving average: `out[i] = mean(y[max(0, i-window+1) ..= i])`.
///
/// Non-finite values are left out of every window they fall in. A window with
/// no finite value yields the raw sample.
pub fn running_average(y: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(y.len());
    let mut sum = 0.0;
    let mut finite = 0usize;
    for i in 0..y.len() {
        if y[i].is_finite() {
            sum += y[i];
            finite += 1;
        }
        if i >= window {
            let gone = y[i - window];
            if gone.is_finite() {
                sum -= gone;
                finite -= 1;
            }
        }
        out.push(if finite > 0 { sum / finite as f64 } else { y[i] });
    }
    out
}

/// Exponential moving average with start-up bias correction.
///
/// The running weighted sum is divided by `1 - weight^(k+1)` (k counting finite
/// samples seen so far), so early points are not pulled toward zero.
/// Non-finite values pass through untouched and do not advance the average.
pub fn ema(y: &[f64], weight: f64) -> Vec<f64> {
    let weight = weight.clamp(0.0, MAX_EMA_WEIGHT);
    let mut out = Vec::with_capacity(y.len());
    let mut last = 0.0;
    let mut seen = 0i32;
    for &v in y {
        if !v.is_finite() {
            out.push(v);
            continue;
        }
        last = last * weight + (1.0 - weight) * v;
        seen += 1;
        let debias = 1.0 - weight.powi(seen);
        out.push(if debias > 0.0 { last / debias } else { v });
    }
    out
}

/// EMA whose per-point decay depends on the `x` distance to the previous point.
///
/// Distances are measured in units of the mean spacing, so evenly spaced input
/// reproduces [`ema`] exactly and gaps decay proportionally more.
pub fn time_weighted_ema(x: &[f64], y: &[f64], weight: f64) -> Vec<f64> {
    let weight = weight.clamp(0.0, MAX_EMA_WEIGHT);
    let n = x.len().min(y.len());
    let mut out = Vec::with_capacity(n);
    if n == 0 {
        return out;
    }
    let span = if n > 1 { (x[n - 1] - x[0]) / (n - 1) as f64 } else { 1.0 };
    let span = if span > 0.0 && span.is_finite() { span } else { 1.0 };

    let mut last = 0.0;
    let mut norm = 0.0;
    let mut prev_x: Option<f64> = None;
    for i in 0..n {
        let v = y[i];
        if !v.is_finite() {
            out.push(v);
            continue;
        }
        let decay = match prev_x {
            None => weight,
            Some(px) => weight.powf(((x[i] - px) / span).max(0.0)),
        };
        last = last * decay + (1.0 - decay) * v;
        norm = norm * decay + (1.0 - decay);
        prev_x = Some(x[i]);
        out.push(if norm > 0.0 { last / norm } else { v });
    }
    out
}

/// Gaussian kernel smoothing over `x` distance with standard deviation `sigma`.
///
/// Each output is `sum(w_j * y_j) / sum(w_j)` with `w_j = exp(-(x_j - x_i)^2 / (2 sigma^2))`,
/// taken over every finite sample of the series.
pub fn gaussian(x: &[f64], y: &[f64], sigma: f64) -> Vec<f64> {
    let n = x.len().min(y.len());
    if !(sigma > 0.0) {
        return y[..n].to_vec();
    }
    let two_var = 2.0 * sigma * sigma;
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let mut num = 0.0;
        let mut den = 0.0;
        for j in 0..n {
            let dx = x[j] - x[i];
            if !y[j].is_finite() {
                continue;
            }
            let w = (-(dx * dx) / two_var).exp();
            num += w * y[j];
            den += w;
        }
        out.push(if den > 0.0 { num / den } else { y[i] });
    }
    out
}

/// Apply `algorithm` with `parameter` to the series.
pub fn smooth(x: &[f64], y: &[f64], algorithm: SmoothingAlgorithm, parameter: f64) -> Vec<f64> {
    let parameter = algorithm.range().clamp(parameter);
    match algorithm {
        SmoothingAlgorithm::Running => running_average(y, parameter.round() as usize),
        SmoothingAlgorithm::Ema => ema(y, parameter),
        SmoothingAlgorithm::Twema => time_weighted_ema(x, y, parameter),
        SmoothingAlgorithm::Gaussian => gaussian(x, y, parameter),
    }
}

/// Result of running one series through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedSeries {
    /// Full opacity and listed in the legend.
    pub primary: SeriesTrace,
    /// The raw data, faded and kept out of the legend, when requested.
    pub original: Option<SeriesTrace>,
}

impl SmoothedSeries {
    /// Traces in paint order: the faint original first so the primary sits on top.
    pub fn into_traces(self) -> Vec<SeriesTrace> {
        let mut v = Vec::with_capacity(2);
        if let Some(o) = self.original {
            v.push(o);
        }
        v.push(self.primary);
        v
    }
}

/// Turn a raw `(x, y)` series into render-ready traces according to `config`.
pub fn apply_smoothing(
    name: &str,
    x: &[f64],
    y: &[f64],
    config: &SmoothingConfig,
    look: &TraceLook,
) -> SmoothedSeries {
    let n = x.len().min(y.len());
    let (x, y) = (&x[..n], &y[..n]);
    let primary_look = TraceLook {
        opacity: 1.0,
        show_in_legend: true,
        ..look.clone()
    };

    if !config.enabled {
        return SmoothedSeries {
            primary: SeriesTrace::new(name, x.to_vec(), y.to_vec(), primary_look),
            original: None,
        };
    }

    let parameter = config.effective_parameter();
    let smoothed = smooth(x, y, config.algorithm, parameter);
    let mut primary = SeriesTrace::new(name, x.to_vec(), smoothed, primary_look);
    primary.info = format!("{} ({})", config.algorithm.label(), parameter);

    let original = config.show_original_data.then(|| {
        let label = format!("{name} (original)");
        let mut t = SeriesTrace::new(label, x.to_vec(), y.to_vec(), look.faded());
        t.info = "original data".to_string();
        t
    });
    SmoothedSeries { primary, original }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-9, "{a:?} vs {b:?}");
        }
    }

    #[test]
    fn running_average_uses_trailing_window() {
        let out = running_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        approx(&out, &[1.0, 1.5, 2.0, 3.0, 4.0]);
        approx(&running_average(&[4.0, 8.0], 0), &[4.0, 8.0]);
    }

    #[test]
    fn running_average_skips_non_finite_samples() {
        let out = running_average(&[1.0, f64::NAN, 1.0, 1.0, 3.0, 1.0, 1.0], 2);
        approx(&out, &[1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 1.0]);

        let gap = running_average(&[2.0, f64::NAN, f64::NAN, 4.0], 2);
        assert_eq!(gap[1], 2.0);
        assert!(gap[2].is_nan());
        assert_eq!(gap[3], 4.0);
    }

    #[test]
    fn ema_is_bias_corrected() {
        let out = ema(&[10.0, 10.0, 10.0], 0.5);
        approx(&out, &[10.0, 10.0, 10.0]);
    }

    #[test]
    fn ema_tracks_step_change() {
        let out = ema(&[0.0, 10.0], 0.5);
        // last = 0 then 5; debias 0.5 then 0.75
        approx(&out, &[0.0, 5.0 / 0.75]);
    }

    #[test]
    fn ema_zero_weight_is_identity() {
        approx(&ema(&[3.0, -1.0, 7.0], 0.0), &[3.0, -1.0, 7.0]);
    }

    #[test]
    fn ema_passes_non_finite_through() {
        let out = ema(&[2.0, f64::NAN, 2.0], 0.9);
        assert!(out[1].is_nan());
        assert!((out[0] - 2.0).abs() < 1e-12);
        assert!((out[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn twema_matches_ema_on_even_spacing() {
        let x = [0.0, 10.0, 20.0, 30.0, 40.0];
        let y = [1.0, 5.0, 2.0, 8.0, 3.0];
        approx(&time_weighted_ema(&x, &y, 0.7), &ema(&y, 0.7));
    }

    #[test]
    fn twema_decays_more_across_gaps() {
        let y = [0.0, 0.0, 10.0];
        let even = time_weighted_ema(&[0.0, 1.0, 2.0], &y, 0.8);
        let gap = time_weighted_ema(&[0.0, 0.1, 2.0], &y, 0.8);
        // a long gap before the last point lets it pull harder
        assert!(gap[2] > even[2]);
    }

    #[test]
    fn gaussian_of_constant_is_constant() {
        let x = [0.0, 1.0, 2.5, 3.0, 7.0];
        let y = [4.0; 5];
        approx(&gaussian(&x, &y, 2.0), &y);
    }

    #[test]
    fn gaussian_is_symmetric_weight_average() {
        let x = [0.0, 1.0, 2.0];
        let y = [0.0, 0.0, 3.0];
        let out = gaussian(&x, &y, 1.0);
        let w1 = (-0.5f64).exp();
        let w2 = (-2.0f64).exp();
        let mid = 3.0 * w1 / (1.0 + 2.0 * w1);
        assert!((out[1] - mid).abs() < 1e-12);
        let first = 3.0 * w2 / (1.0 + w1 + w2);
        assert!((out[0] - first).abs() < 1e-12);
    }

    #[test]
    fn gaussian_weighs_distant_points() {
        let x = [0.0, 4.5];
        let y = [0.0, 1.0];
        let out = gaussian(&x, &y, 1.0);
        let w = (-4.5f64 * 4.5 / 2.0).exp();
        assert!(out[0] > 0.0);
        assert!((out[0] - w / (1.0 + w)).abs() < 1e-15);
    }

    #[test]
    fn params_clamp_and_snap() {
        let r = SmoothingAlgorithm::Running.range();
        assert_eq!(r.clamp(0.0), 1.0);
        assert_eq!(r.clamp(250.0), 100.0);
        assert_eq!(r.clamp(3.4), 3.0);
        let e = SmoothingAlgorithm::Ema.range();
        assert_eq!(e.clamp(1.0), 0.999);
        assert_eq!(e.clamp(0.6), 0.6);
        assert_eq!(e.clamp(f64::NAN), 0.6);
        let g = SmoothingAlgorithm::Gaussian.range();
        assert_eq!(g.clamp(0.0), 0.1);
        assert_eq!(g.default, 2.0);
    }

    #[test]
    fn pipeline_emits_faint_original_when_requested() {
        let cfg = SmoothingConfig::default().with_algorithm(SmoothingAlgorithm::Running);
        let out = apply_smoothing("loss", &[0.0, 1.0], &[1.0, 3.0], &cfg, &TraceLook::new(0));
        let original = out.original.clone().unwrap();
        assert_eq!(original.look.opacity, 0.1);
        assert!(!original.look.show_in_legend);
        assert_eq!(original.y, vec![1.0, 3.0]);
        assert_eq!(out.primary.look.opacity, 1.0);
        assert!(out.primary.look.show_in_legend);
        assert_eq!(out.primary.y, vec![1.0, 2.0]);
        let traces = out.into_traces();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[1].name.0, "loss");
    }

    #[test]
    fn disabled_pipeline_returns_raw_series_only() {
        let cfg = SmoothingConfig {
            enabled: false,
            ..SmoothingConfig::default()
        };
        let out = apply_smoothing("acc", &[0.0, 1.0], &[0.2, 0.4], &cfg, &TraceLook::default());
        assert!(out.original.is_none());
        assert_eq!(out.primary.y, vec![0.2, 0.4]);
    }
}
