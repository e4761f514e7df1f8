//! Chart preference persistence.
//!
//! Settings are kept per `(organization, project, run or all runs)` in the local
//! cache with a long TTL, and can be exported to / imported from JSON files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{key_segment, CacheError, QueryCache};
use crate::clock::{Clock, SystemClock};
use crate::data::chart::ChartSettings;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Which runs a preference applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunScope {
    All,
    Run(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettingsKey {
    pub organization: String,
    pub project: String,
    pub scope: RunScope,
}

impl SettingsKey {
    pub fn all_runs(organization: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            scope: RunScope::All,
        }
    }

    pub fn run(
        organization: impl Into<String>,
        project: impl Into<String>,
        run: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            scope: RunScope::Run(run.into()),
        }
    }

    /// The project-wide key this one falls back to.
    pub fn project_wide(&self) -> Self {
        Self {
            scope: RunScope::All,
            ..self.clone()
        }
    }

    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SettingsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let org = key_segment(&self.organization);
        let project = key_segment(&self.project);
        match &self.scope {
            RunScope::All => write!(f, "settings/{org}/{project}/all"),
            RunScope::Run(id) => write!(f, "settings/{org}/{project}/run/{}", key_segment(id)),
        }
    }
}

/// Chart preferences read and written through a [`QueryCache`].
pub struct SettingsStore<C: Clock + Send + 'static = SystemClock> {
    cache: QueryCache<C>,
    ttl: Duration,
}

impl<C: Clock + Send + 'static> Clone for SettingsStore<C> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            ttl: self.ttl,
        }
    }
}

impl<C: Clock + Send + 'static> SettingsStore<C> {
    pub fn new(cache: QueryCache<C>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    pub fn cache(&self) -> &QueryCache<C> {
        &self.cache
    }

    /// Stored settings for exactly `key`.
    pub fn get(&self, key: &SettingsKey) -> Option<ChartSettings> {
        self.cache.get(&key.cache_key())
    }

    /// Settings for `key`: its own, else the project-wide ones, else defaults.
    pub fn load(&self, key: &SettingsKey) -> ChartSettings {
        if let Some(s) = self.get(key) {
            return s;
        }
        if matches!(key.scope, RunScope::Run(_)) {
            if let Some(s) = self.get(&key.project_wide()) {
                return s;
            }
        }
        ChartSettings::default()
    }

    pub fn save(&self, key: &SettingsKey, settings: &ChartSettings) -> PersistenceResult<()> {
        self.cache.set(&key.cache_key(), settings, Some(self.ttl))?;
        log::debug!("saved chart settings for {key}");
        Ok(())
    }

    pub fn reset(&self, key: &SettingsKey) -> PersistenceResult<()> {
        let cache_key = key.cache_key();
        self.cache.with_store(|s| {
            s.remove(&cache_key);
        })?;
        Ok(())
    }
}

/// Serialize chart settings as pretty JSON.
pub fn settings_to_json(settings: &ChartSettings) -> PersistenceResult<String> {
    Ok(serde_json::to_string_pretty(settings)?)
}

/// Deserialize chart settings; missing fields take their defaults.
pub fn settings_from_json(json: &str) -> PersistenceResult<ChartSettings> {
    Ok(serde_json::from_str(json)?)
}

pub fn save_settings_to_path(settings: &ChartSettings, path: &Path) -> PersistenceResult<()> {
    let txt = settings_to_json(settings)?;
    std::fs::write(path, txt).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_settings_from_path(path: &Path) -> PersistenceResult<ChartSettings> {
    let txt = std::fs::read_to_string(path).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    settings_from_json(&txt)
}
