//! Runtime settings from an env file and the process environment.
//!
//! Settings are read from a `key=value` file (`.env` by default) and then
//! from environment variables, which take precedence. Nothing is required
//! at load time; missing values fail when they are first needed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, Map, Source, Value, ValueKind};
use serde::Deserialize;
use thiserror::Error;

use cpwatch_adapters::extract::ExtractOptions;

/// Env file read when none is named.
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Errors from loading or reading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A required key has no value.
    #[error("{0} is not set")]
    Missing(&'static str),

    /// The sources could not be read or deserialized.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// A `config` source for `.env` files, read with `dotenvy`.
///
/// Keys are lower-cased so they line up with the environment source.
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    required: bool,
}

impl EnvFile {
    /// Source for `path`; a missing file is an error only if `required`.
    pub fn new(path: impl Into<PathBuf>, required: bool) -> Self {
        Self {
            path: path.into(),
            required,
        }
    }
}

impl Source for EnvFile {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<Map<String, Value>, ConfigError> {
        let entries = match dotenvy::from_path_iter(&self.path) {
            Ok(entries) => entries,
            Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.required {
                    return Err(ConfigError::NotFound(self.path.display().to_string()));
                }
                return Ok(Map::new());
            }
            Err(e) => return Err(ConfigError::Foreign(Box::new(e))),
        };

        let origin = self.path.display().to_string();
        entries
            .map(|entry| {
                let (key, value) = entry.map_err(|e| ConfigError::Foreign(Box::new(e)))?;
                Ok((
                    key.to_lowercase(),
                    Value::new(Some(&origin), ValueKind::String(value)),
                ))
            })
            .collect()
    }
}

/// Settings recognised by cpwatch.
///
/// Keys are the lower-cased variable names, so `CP_API_KEY` in either the
/// env file or the environment sets `cp_api_key`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cp_api_key: Option<String>,
    pub cp_endpoint: Option<String>,
    pub cp_timeout_secs: Option<u64>,
    /// Comma-separated metric ids.
    pub cp_metric_ids: Option<String>,
    pub cp_dimension_ids: Option<String>,
    pub cp_sub_source_ids: Option<String>,
    pub cp_tracepoint_ids: Option<String>,
    pub cp_outlier_threshold: Option<f64>,
    pub cp_include_outliers: Option<bool>,
    pub cp_include_errors: Option<bool>,
    pub cp_debug: bool,
    pub cp_quiet: bool,
    pub cp_log_file: Option<PathBuf>,
}

impl Settings {
    /// Load from `env_file` (or `.env` if present) and the environment.
    pub fn load(env_file: Option<&Path>) -> Result<Self, SettingsError> {
        Self::load_with(env_file, Environment::default())
    }

    /// Load with an explicit environment source.
    pub fn load_with(env_file: Option<&Path>, environment: Environment) -> Result<Self, SettingsError> {
        let file = match env_file {
            Some(path) => EnvFile::new(path, true),
            None => EnvFile::new(DEFAULT_ENV_FILE, false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// API token, required for any provider call.
    pub fn api_key(&self) -> Result<&str, SettingsError> {
        self.cp_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(SettingsError::Missing("CP_API_KEY"))
    }

    /// Request timeout, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.cp_timeout_secs.map(Duration::from_secs)
    }

    pub fn metric_ids(&self) -> Option<Vec<String>> {
        split_ids(self.cp_metric_ids.as_deref())
    }

    pub fn dimension_ids(&self) -> Option<Vec<String>> {
        split_ids(self.cp_dimension_ids.as_deref())
    }

    pub fn sub_source_ids(&self) -> Option<Vec<String>> {
        split_ids(self.cp_sub_source_ids.as_deref())
    }

    pub fn tracepoint_ids(&self) -> Option<Vec<String>> {
        split_ids(self.cp_tracepoint_ids.as_deref())
    }

    /// Row inclusion policy, defaults overridden by whatever is set.
    pub fn extract_options(&self) -> ExtractOptions {
        let defaults = ExtractOptions::default();
        ExtractOptions {
            include_outliers: self.cp_include_outliers.unwrap_or(defaults.include_outliers),
            outlier_threshold: self.cp_outlier_threshold.unwrap_or(defaults.outlier_threshold),
            include_errors: self.cp_include_errors.unwrap_or(defaults.include_errors),
        }
    }
}

fn split_ids(raw: Option<&str>) -> Option<Vec<String>> {
    let ids: Vec<String> = raw?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    (!ids.is_empty()).then_some(ids)
}
