//! Configuration for the dashboard core, stored as YAML.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{CacheStore, QueryCache};
use crate::data::normalize::NormalizeOptions;
use crate::data::smoothing::SmoothingConfig;
use crate::export::{ExportOptions, DEFAULT_FRAME_DELAY_MS};
use crate::playback::{clamp_speed, PlaybackController, DEFAULT_SPEED_MS};
use crate::render::{HistogramStyle, Rgba};

const CONFIG_DIR: &str = ".runscope";
const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HOME env var not set")]
    NoHome,
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ─────────────────────────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte budget across all entries. Default: 50 MiB.
    pub budget_bytes: usize,
    /// TTL of query results. Default: 300 s.
    pub default_ttl_secs: u64,
    /// TTL of persisted chart settings. Default: 30 days.
    pub settings_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 50 * 1024 * 1024,
            default_ttl_secs: 300,
            settings_ttl_secs: 30 * 24 * 60 * 60,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn settings_ttl(&self) -> Duration {
        Duration::from_secs(self.settings_ttl_secs)
    }

    pub fn store(&self) -> CacheStore {
        CacheStore::new(self.budget_bytes)
    }

    pub fn query_cache(&self) -> QueryCache {
        QueryCache::new(self.store(), self.default_ttl())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Playback
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Frame interval in ms, clamped to `[1, 1000]` when applied.
    pub speed_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed_ms: DEFAULT_SPEED_MS,
        }
    }
}

impl PlaybackConfig {
    pub fn speed_ms(&self) -> u64 {
        clamp_speed(self.speed_ms)
    }

    pub fn controller(&self, frame_count: usize) -> PlaybackController {
        let mut c = PlaybackController::new(frame_count);
        c.set_speed(self.speed_ms);
        c
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Export
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub frame_delay_ms: u32,
    pub width: u32,
    pub height: u32,
    pub background: Rgba,
    pub bar_top: Rgba,
    pub bar_bottom: Rgba,
    pub axis: Rgba,
}

impl Default for ExportConfig {
    fn default() -> Self {
        let style = HistogramStyle::default();
        Self {
            frame_delay_ms: DEFAULT_FRAME_DELAY_MS,
            width: 800,
            height: 400,
            background: style.background,
            bar_top: style.bar_top,
            bar_bottom: style.bar_bottom,
            axis: style.axis,
        }
    }
}

impl ExportConfig {
    pub fn options(&self) -> ExportOptions {
        ExportOptions {
            width: self.width,
            height: self.height,
            frame_delay_ms: self.frame_delay_ms,
            style: HistogramStyle {
                background: self.background,
                bar_top: self.bar_top,
                bar_bottom: self.bar_bottom,
                axis: self.axis,
                ..HistogramStyle::default()
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RunscopeConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level configuration.
///
/// | Field       | Purpose |
/// |-------------|---------|
/// | `cache`     | Byte budget and TTLs of the local cache |
/// | `histogram` | Grid padding for distribution normalization |
/// | `playback`  | Default frame interval |
/// | `export`    | Offscreen size, colors, GIF frame delay |
/// | `smoothing` | Smoothing applied to new charts |
///
/// Missing keys fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunscopeConfig {
    pub cache: CacheConfig,
    pub histogram: NormalizeOptions,
    pub playback: PlaybackConfig,
    pub export: ExportConfig,
    pub smoothing: SmoothingConfig,
}

impl RunscopeConfig {
    pub fn from_yaml(s: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn save_to_path(&self, path: &Path) -> ConfigResult<()> {
        let s = self.to_yaml()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, s).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_from_path(path: &Path) -> ConfigResult<Self> {
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&s)
    }

    /// `$HOME/.runscope/config.yaml`
    pub fn default_path() -> ConfigResult<PathBuf> {
        let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
        Ok(PathBuf::from(home).join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn save_to_default_path(&self) -> ConfigResult<()> {
        self.save_to_path(&Self::default_path()?)
    }

    /// Load the default file, or defaults when it does not exist yet.
    pub fn load_from_default_path() -> ConfigResult<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("no config at {path:?}, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&path)
    }
}
