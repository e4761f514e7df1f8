//! Fetch boundary: decode remote log payloads into typed, validated collections.
//!
//! Payloads are checked once here. Everything downstream (normalization,
//! smoothing, rendering) works on [`HistogramFrame`] and [`MetricSample`] and
//! never re-validates.
//!
//! Wire shapes:
//! - metric sample: `{"step": int, "time": ISO-8601 string, "value": number}`
//! - histogram entry: `{"step": int, "histogramData": {"freq": [..], "bins": {"min", "max", "num"}, "maxFreq": int}}`

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::cache::{key_segment, QueryCache};
use crate::clock::Clock;
use crate::data::histogram::{BinSpec, FrameError, HistogramFrame};
use crate::data::samples::MetricSample;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid histogram at step {step}: {source}")]
    Frame {
        step: i64,
        #[source]
        source: FrameError,
    },
    #[error("invalid timestamp {value:?} at step {step}")]
    InvalidTime { step: i64, value: String },
    #[error("unknown log type {0:?}")]
    UnknownKind(String),
}

pub type PayloadResult<T> = Result<T, PayloadError>;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Remote(String),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Kind of logged data, as tagged by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogKind {
    Metric,
    Histogram,
    Image,
    Audio,
    Video,
}

/// How a kind of log is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Scalar series: alignment and smoothing apply.
    LineChart,
    /// Histogram frames: normalization and playback apply.
    Distribution,
    /// Files listed per step.
    MediaGallery,
}

impl LogKind {
    pub fn view(&self) -> ViewKind {
        match self {
            LogKind::Metric => ViewKind::LineChart,
            LogKind::Histogram => ViewKind::Distribution,
            LogKind::Image | LogKind::Audio | LogKind::Video => ViewKind::MediaGallery,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Metric => "METRIC",
            LogKind::Histogram => "HISTOGRAM",
            LogKind::Image => "IMAGE",
            LogKind::Audio => "AUDIO",
            LogKind::Video => "VIDEO",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LogKind {
    type Err = PayloadError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "METRIC" => Ok(LogKind::Metric),
            "HISTOGRAM" => Ok(LogKind::Histogram),
            "IMAGE" => Ok(LogKind::Image),
            "AUDIO" => Ok(LogKind::Audio),
            "VIDEO" => Ok(LogKind::Video),
            _ => Err(PayloadError::UnknownKind(s.to_string())),
        }
    }
}

/// Identifies one remote query; also the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub tenant: String,
    pub project: String,
    pub run: String,
    pub log_name: String,
    pub kind: LogKind,
}

impl QueryKey {
    pub fn new(
        tenant: impl Into<String>,
        project: impl Into<String>,
        run: impl Into<String>,
        log_name: impl Into<String>,
        kind: LogKind,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            project: project.into(),
            run: run.into(),
            log_name: log_name.into(),
            kind,
        }
    }

    /// `tenant/project/run/log_name#KIND`, each part escaped with [`key_segment`].
    pub fn cache_key(&self) -> String {
        format!(
            "{}/{}/{}/{}#{}",
            key_segment(&self.tenant),
            key_segment(&self.project),
            key_segment(&self.run),
            key_segment(&self.log_name),
            self.kind
        )
    }
}

#[derive(Debug, Deserialize)]
struct WireSample {
    step: i64,
    time: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct WireBins {
    min: f64,
    max: f64,
    num: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHistogram {
    freq: Vec<f64>,
    bins: WireBins,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHistogramEntry {
    step: i64,
    histogram_data: WireHistogram,
}

/// One media file logged at a step. Only the step is interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub step: i64,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

/// A decoded payload; one variant per [`ViewKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum LogPayload {
    Metric(Vec<MetricSample>),
    Histogram(Vec<HistogramFrame>),
    Media { kind: LogKind, entries: Vec<MediaEntry> },
}

impl LogPayload {
    pub fn empty(kind: LogKind) -> Self {
        match kind.view() {
            ViewKind::LineChart => LogPayload::Metric(Vec::new()),
            ViewKind::Distribution => LogPayload::Histogram(Vec::new()),
            ViewKind::MediaGallery => LogPayload::Media {
                kind,
                entries: Vec::new(),
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            LogPayload::Metric(v) => v.len(),
            LogPayload::Histogram(v) => v.len(),
            LogPayload::Media { entries, .. } => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_time(step: i64, raw: &str) -> PayloadResult<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    // zone-less timestamps are taken as UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|n| n.and_utc())
        .map_err(|_| PayloadError::InvalidTime {
            step,
            value: raw.to_string(),
        })
}

/// Decode and validate a metric series, sorted by step.
pub fn decode_metric_samples(value: &Value) -> PayloadResult<Vec<MetricSample>> {
    let wire: Vec<WireSample> = Vec::<WireSample>::deserialize(value)?;
    let mut out = wire
        .into_iter()
        .map(|w| Ok(MetricSample::new(w.step, parse_time(w.step, &w.time)?, w.value)))
        .collect::<PayloadResult<Vec<_>>>()?;
    out.sort_by_key(|s| s.step);
    Ok(out)
}

/// Decode and validate histogram frames, sorted by step.
pub fn decode_histogram_frames(value: &Value) -> PayloadResult<Vec<HistogramFrame>> {
    let wire: Vec<WireHistogramEntry> = Vec::<WireHistogramEntry>::deserialize(value)?;
    let mut out = wire
        .into_iter()
        .map(|w| {
            let h = w.histogram_data;
            let spec = BinSpec::new(h.bins.min, h.bins.max, h.bins.num);
            HistogramFrame::try_new(w.step, spec, h.freq).map_err(|source| PayloadError::Frame {
                step: w.step,
                source,
            })
        })
        .collect::<PayloadResult<Vec<_>>>()?;
    out.sort_by_key(|f| f.step);
    Ok(out)
}

pub fn decode_media_entries(value: &Value) -> PayloadResult<Vec<MediaEntry>> {
    let mut out = Vec::<MediaEntry>::deserialize(value)?;
    out.sort_by_key(|e| e.step);
    Ok(out)
}

/// Decode a payload of the given kind.
pub fn decode_payload(kind: LogKind, value: &Value) -> PayloadResult<LogPayload> {
    Ok(match kind.view() {
        ViewKind::LineChart => LogPayload::Metric(decode_metric_samples(value)?),
        ViewKind::Distribution => LogPayload::Histogram(decode_histogram_frames(value)?),
        ViewKind::MediaGallery => LogPayload::Media {
            kind,
            entries: decode_media_entries(value)?,
        },
    })
}

/// What a view should show for a fetched payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewData {
    Ready(LogPayload),
    /// Nothing was logged.
    Empty(LogKind),
    /// The payload or the fetch failed; the view shows an error state.
    Failed { kind: LogKind, reason: String },
}

/// Decode for display: malformed payloads degrade to [`ViewData::Failed`].
pub fn decode_for_view(kind: LogKind, value: &Value) -> ViewData {
    match decode_payload(kind, value) {
        Ok(p) if p.is_empty() => ViewData::Empty(kind),
        Ok(p) => ViewData::Ready(p),
        Err(e) => {
            log::warn!("rejecting {kind} payload: {e}");
            ViewData::Failed {
                kind,
                reason: e.to_string(),
            }
        }
    }
}

/// Fetch one log through the cache and decode it for display.
///
/// The raw JSON is what gets cached, so a payload that fails validation is
/// still served from cache on the next read and fails the same way.
pub async fn fetch_log<C, F, Fut>(
    cache: &QueryCache<C>,
    key: &QueryKey,
    ttl: Option<Duration>,
    fetch: F,
) -> ViewData
where
    C: Clock + Send + 'static,
    F: FnOnce(QueryKey) -> Fut,
    Fut: Future<Output = Result<Value, FetchError>>,
{
    let owned = key.clone();
    match cache
        .get_or_fetch(&key.cache_key(), ttl, move || fetch(owned))
        .await
    {
        Ok(raw) => decode_for_view(key.kind, &raw),
        Err(e) => {
            log::warn!("fetch of {} failed: {e}", key.cache_key());
            ViewData::Failed {
                kind: key.kind,
                reason: e.to_string(),
            }
        }
    }
}
