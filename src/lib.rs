//! Runscope crate root: re-exports and module wiring.
//!
//! The data core of a training-run dashboard: it turns independently sampled
//! metrics and histograms into comparable, render-ready data.
//!
//! - `data`: rebinning, multi-frame normalization, step alignment, smoothing, chart assembly
//! - `playback`: frame playback over a normalized distribution sequence
//! - `render` / `export`: offscreen drawing, PNG snapshots, GIF animations, CSV
//! - `cache`: byte-budgeted TTL cache and the read-through query layer
//! - `sink`: payload decoding at the fetch boundary
//! - `persistence`: per-project and per-run chart settings
//! - `config`: YAML configuration
//! - `clock`: injectable time source

pub mod cache;
pub mod clock;
pub mod config;
pub mod data;
pub mod export;
pub mod persistence;
pub mod playback;
pub mod render;
pub mod sink;

// Public re-exports for a compact external API
pub use cache::{CacheError, CacheMetricsSnapshot, CacheStore, QueryCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, RunscopeConfig};
pub use data::align::{align_by_step, AlignedSeries};
pub use data::chart::{build_chart, ChartSettings, ChartView, RunSeries, XAxis};
pub use data::histogram::{rebin, BinSpec, FrameError, GlobalBinGrid, HistogramFrame};
pub use data::normalize::{normalize, NormalizeOptions, NormalizedSet, Normalizer};
pub use data::samples::MetricSample;
pub use data::smoothing::{apply_smoothing, smooth, SmoothingAlgorithm, SmoothingConfig};
pub use export::{CancelToken, ExportError, ExportOptions};
pub use persistence::{RunScope, SettingsKey, SettingsStore};
pub use playback::{PlaybackController, PlaybackState, TickOutcome};
pub use sink::{FetchError, LogKind, LogPayload, PayloadError, QueryKey, ViewData, ViewKind};
