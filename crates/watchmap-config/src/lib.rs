//! Configuration for watchmap stores.
//!
//! TOML file + `WATCHMAP_*` environment overrides, resolved into a
//! validated [`watchmap_core::StoreConfig`]. The core crate never reads
//! files; applications load a [`Config`] here and hand the resolved
//! `StoreConfig` to [`ObservableStore::with_config`](watchmap_core::ObservableStore::with_config).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use watchmap_core::FailureLevel;
use watchmap_core::StoreConfig;
use watchmap_core::config::{DEFAULT_STORE_NAME, MAX_CHANGE_BUFFER, MAX_INITIAL_CAPACITY};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Store section used when no name is requested. Unset means
    /// [`DEFAULT_STORE_NAME`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_store: Option<String>,

    /// Values applied to every store unless its own section overrides them.
    #[serde(default)]
    pub defaults: StoreSection,

    /// Named store sections.
    #[serde(default)]
    pub stores: HashMap<String, StoreSection>,
}

/// Per-store overrides. Unset fields fall through to `defaults`, then to
/// [`StoreConfig::default`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_capacity: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_buffer: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_level: Option<FailureLevel>,
}

impl Config {
    /// Resolve the section for `name` (or the default store) into a
    /// validated `StoreConfig`.
    ///
    /// A name without its own section resolves to the defaults.
    pub fn store_config(&self, name: Option<&str>) -> Result<StoreConfig, ConfigError> {
        let name = name
            .or(self.default_store.as_deref())
            .unwrap_or(DEFAULT_STORE_NAME);
        let section = self.stores.get(name);
        let base = StoreConfig::default();

        let config = StoreConfig {
            name: name.to_owned(),
            initial_capacity: section
                .and_then(|s| s.initial_capacity)
                .or(self.defaults.initial_capacity)
                .unwrap_or(base.initial_capacity),
            change_buffer: section
                .and_then(|s| s.change_buffer)
                .or(self.defaults.change_buffer)
                .unwrap_or(base.change_buffer),
            failure_level: section
                .and_then(|s| s.failure_level)
                .or(self.defaults.failure_level)
                .unwrap_or(base.failure_level),
        };

        validate(&config)?;
        Ok(config)
    }
}

/// Check a resolved `StoreConfig` against the limits the core enforces.
pub fn validate(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.name.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "name".into(),
            reason: "must not be empty".into(),
        });
    }
    if config.initial_capacity > MAX_INITIAL_CAPACITY {
        return Err(ConfigError::Validation {
            field: "initial_capacity".into(),
            reason: format!("must be at most {MAX_INITIAL_CAPACITY}"),
        });
    }
    if config.change_buffer == 0 {
        return Err(ConfigError::Validation {
            field: "change_buffer".into(),
            reason: "must be at least 1".into(),
        });
    }
    if config.change_buffer > MAX_CHANGE_BUFFER {
        return Err(ConfigError::Validation {
            field: "change_buffer".into(),
            reason: format!("must be at most {MAX_CHANGE_BUFFER}"),
        });
    }
    Ok(())
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "watchmap", "watchmap").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("watchmap");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// A missing file is not an error; defaults and environment still apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("WATCHMAP_").split("__"));

    let config: Config = figment.extract()?;
    tracing::debug!(path = %path.display(), stores = config.stores.len(), "config loaded");
    Ok(config)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "falling back to default config");
        Config::default()
    })
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`, creating parent
/// directories as needed.
pub fn save_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(cfg)?;
    std::fs::write(path, contents)?;
    Ok(())
}
