//! Engine and per-field configuration.
//!
//! Durations are stored as integer milliseconds so the configuration can be
//! written by hand in TOML.

use crate::error::{EditError, EditResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration for one editable field instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOptions {
    /// Quiet period before an optimistic edit is persisted. `0` fires on the
    /// next scheduler tick, for discrete-choice fields.
    pub debounce_ms: u64,
    /// Persist while typing and keep failed values for retry. When `false`,
    /// edits are saved on `stop_editing` and rolled back on failure.
    pub optimistic: bool,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            optimistic: true,
        }
    }
}

impl FieldOptions {
    pub fn optimistic(debounce_ms: u64) -> Self {
        Self {
            debounce_ms,
            optimistic: true,
        }
    }

    pub fn pessimistic() -> Self {
        Self {
            debounce_ms: 0,
            optimistic: false,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Reconnect backoff for the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 1_000,
            max_ms: 30_000,
            max_attempts: None,
        }
    }
}

/// Configuration for an [`EditEngine`](crate::EditEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lifetime of a cached record.
    pub cache_ttl_ms: u64,
    /// Upper bound on a field's initial load.
    pub load_timeout_ms: u64,
    /// Window after a local save during which remote updates to that field
    /// are ignored.
    pub guard_window_ms: u64,
    /// Poll period for watched records. `0` disables polling.
    pub poll_interval_ms: u64,
    /// Minimum spacing between refreshes of the same record.
    pub refresh_min_interval_ms: u64,
    pub backoff: BackoffConfig,
    /// Options used by [`EditEngine::field`](crate::EditEngine::field) when
    /// none are given.
    pub default_field: FieldOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 60_000,
            load_timeout_ms: 15_000,
            guard_window_ms: 5_000,
            poll_interval_ms: 30_000,
            refresh_min_interval_ms: 1_000,
            backoff: BackoffConfig::default(),
            default_field: FieldOptions::default(),
        }
    }
}

impl EngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn guard_window(&self) -> Duration {
        Duration::from_millis(self.guard_window_ms)
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_interval_ms > 0).then(|| Duration::from_millis(self.poll_interval_ms))
    }

    pub fn refresh_min_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_min_interval_ms)
    }

    /// Checks values that would make the engine misbehave.
    pub fn validate(&self) -> EditResult<()> {
        if self.load_timeout_ms == 0 {
            return Err(EditError::Config("load_timeout_ms must be positive".into()));
        }
        if self.backoff.initial_ms == 0 {
            return Err(EditError::Config("backoff.initial_ms must be positive".into()));
        }
        if self.backoff.max_ms < self.backoff.initial_ms {
            return Err(EditError::Config(
                "backoff.max_ms must be at least backoff.initial_ms".into(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(contents: &str) -> EditResult<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| EditError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    /// Falls back to defaults with a warning when the file is missing or invalid.
    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            info!("No engine config at {:?}, using defaults", path);
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    info!("Loaded engine config from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Ignoring engine config {:?}: {}. Using defaults.", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read engine config {:?}: {}", path, e);
                Self::default()
            }
        }
    }
}
