use runscope::data::align::align_by_step;
use runscope::data::chart::{build_chart, ChartSettings, ChartView, RunSeries, XAxis};
use runscope::data::samples::MetricSample;
use runscope::data::smoothing::{
    apply_smoothing, ema, gaussian, running_average, smooth, time_weighted_ema, SmoothingAlgorithm,
    SmoothingConfig,
};
use runscope::data::trace_look::{TraceLook, ORIGINAL_DATA_OPACITY};
use runscope::sink::decode_metric_samples;
use serde_json::json;

fn samples(points: &[(i64, f64)]) -> Vec<MetricSample> {
    points.iter().map(|&(s, v)| MetricSample::at_step(s, v)).collect()
}

#[test]
fn alignment_keeps_only_shared_steps() {
    let a = samples(&[(1, 10.0), (2, 20.0)]);
    let b = samples(&[(1, 1.0), (3, 3.0)]);
    let out = align_by_step(&a, &b);
    assert_eq!(out.x, vec![10.0]);
    assert_eq!(out.y, vec![1.0]);
}

#[test]
fn alignment_sorts_by_reference_value() {
    let lr = samples(&[(0, 0.3), (1, 0.2), (2, 0.1)]);
    let loss = samples(&[(0, 5.0), (1, 4.0), (2, 3.0)]);
    let out = align_by_step(&lr, &loss);
    assert_eq!(out.x, vec![0.1, 0.2, 0.3]);
    assert_eq!(out.y, vec![3.0, 4.0, 5.0]);
}

#[test]
fn duplicate_reference_values_keep_last_seen() {
    let a = samples(&[(1, 7.0), (2, 7.0)]);
    let b = samples(&[(1, 100.0), (2, 200.0)]);
    let out = align_by_step(&a, &b);
    assert_eq!(out.x, vec![7.0]);
    assert_eq!(out.y, vec![200.0]);
}

#[test]
fn running_average_uses_trailing_window() {
    let out = running_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
    assert_eq!(out[2], 2.0);
    assert_eq!(out[4], 4.0);
    assert_eq!(out[0], 1.0);
}

#[test]
fn ema_is_bias_corrected() {
    let out = ema(&[10.0, 10.0, 10.0], 0.5);
    for v in out {
        assert!((v - 10.0).abs() < 1e-12);
    }
}

#[test]
fn twema_matches_ema_on_even_spacing() {
    let x = [0.0, 2.0, 4.0, 6.0, 8.0];
    let y = [1.0, 5.0, 2.0, 8.0, 3.0];
    let a = ema(&y, 0.6);
    let b = time_weighted_ema(&x, &y, 0.6);
    for (p, q) in a.iter().zip(&b) {
        assert!((p - q).abs() < 1e-9, "{p} vs {q}");
    }
}

#[test]
fn gaussian_flattens_constant_series_to_itself() {
    let x = [0.0, 1.0, 2.0, 3.0];
    let out = gaussian(&x, &[4.0; 4], 2.0);
    for v in out {
        assert!((v - 4.0).abs() < 1e-12);
    }
}

#[test]
fn smoothing_keeps_length_for_every_algorithm() {
    let x: Vec<f64> = (0..20).map(f64::from).collect();
    let y: Vec<f64> = x.iter().map(|v| (v * 0.7).sin()).collect();
    for &alg in SmoothingAlgorithm::all() {
        let out = smooth(&x, &y, alg, alg.range().default);
        assert_eq!(out.len(), y.len(), "{}", alg.label());
    }
}

#[test]
fn original_trace_is_faint_and_hidden_from_legend() {
    let config = SmoothingConfig::default();
    let out = apply_smoothing("loss", &[0.0, 1.0], &[1.0, 3.0], &config, &TraceLook::new(2));
    let original = out.original.as_ref().unwrap();
    assert_eq!(original.look.opacity, ORIGINAL_DATA_OPACITY);
    assert!(!original.look.show_in_legend);
    assert_eq!(original.y, vec![1.0, 3.0]);
    assert!(out.primary.look.show_in_legend);
    assert_eq!(out.primary.look.color, original.look.color);

    let hidden = SmoothingConfig {
        show_original_data: false,
        ..config
    };
    let out = apply_smoothing("loss", &[0.0, 1.0], &[1.0, 3.0], &hidden, &TraceLook::new(2));
    assert!(out.original.is_none());
}

#[test]
fn decoded_payloads_feed_a_metric_axis_chart() {
    let loss = decode_metric_samples(&json!([
        {"step": 2, "time": "2024-05-01T10:00:02Z", "value": 0.5},
        {"step": 1, "time": "2024-05-01T10:00:01Z", "value": 0.9},
        {"step": 3, "time": "2024-05-01T10:00:03Z", "value": 0.4},
    ]))
    .unwrap();
    let lr = decode_metric_samples(&json!([
        {"step": 1, "time": "2024-05-01T10:00:01Z", "value": 0.01},
        {"step": 3, "time": "2024-05-01T10:00:03Z", "value": 0.001},
    ]))
    .unwrap();
    assert_eq!(loss[0].step, 1);

    let settings = ChartSettings {
        x_axis: XAxis::Metric("lr".into()),
        smoothing: SmoothingConfig {
            enabled: false,
            ..SmoothingConfig::default()
        },
        ..ChartSettings::default()
    };
    let view = build_chart(
        &[RunSeries {
            run: "run-1",
            log_name: "loss",
            samples: &loss,
            x_samples: Some(&lr),
        }],
        &settings,
    );
    let ChartView::Ready(data) = view else {
        panic!("expected chart, got {view:?}");
    };
    assert_eq!(data.traces[0].x, vec![0.001, 0.01]);
    assert_eq!(data.traces[0].y, vec![0.4, 0.9]);

    let relative = ChartSettings {
        x_axis: XAxis::RelativeTime,
        ..settings
    };
    let ChartView::Ready(data) = build_chart(
        &[RunSeries {
            run: "run-1",
            log_name: "loss",
            samples: &loss,
            x_samples: None,
        }],
        &relative,
    ) else {
        panic!("expected chart");
    };
    assert_eq!(data.traces[0].x, vec![0.0, 1.0, 2.0]);
}
