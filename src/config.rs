//! Settings resolution: explicit values, then environment, then config file.

use crate::error::CanvasDataError;
use crate::signer::Credentials;
use crate::types::ClientConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_API_KEY: &str = "CANVAS_DATA_API_KEY";
pub const ENV_API_SECRET: &str = "CANVAS_DATA_API_SECRET";
pub const ENV_CONFIG: &str = "CANVAS_DATA_CONFIG";

/// Contents of a TOML config file. Every field is optional.
///
/// ```toml
/// api_key = "..."
/// api_secret = "..."
/// download_dir = "./downloads"
/// data_dir = "./data"
/// retry_backoff = "2s"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_root: Option<String>,
    pub download_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub max_concurrent_downloads: Option<usize>,
    pub max_retries: Option<usize>,
    /// humantime duration, e.g. `"2s"`
    pub retry_backoff: Option<String>,
    /// humantime duration, e.g. `"1m"`
    pub request_timeout: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, CanvasDataError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CanvasDataError::ConfigurationError(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&text).map_err(|e| {
            CanvasDataError::ConfigurationError(format!("invalid config {}: {}", path.display(), e))
        })
    }
}

/// Values given directly by the caller (e.g. command-line flags).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_path: Option<PathBuf>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub download_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

/// Fully resolved settings.
#[derive(Debug, Clone)]
pub struct Settings {
    api_key: Option<String>,
    api_secret: Option<String>,
    pub download_dir: PathBuf,
    pub data_dir: PathBuf,
    pub client: ClientConfig,
}

impl Settings {
    /// Resolves settings against the process environment.
    pub fn resolve(overrides: Overrides) -> Result<Self, CanvasDataError> {
        Self::resolve_with(overrides, |name| std::env::var(name).ok())
    }

    /// Resolves settings with `env` standing in for the process environment.
    pub fn resolve_with(
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CanvasDataError> {
        let env = |name: &str| env(name).filter(|value| !value.is_empty());

        let config_path = overrides
            .config_path
            .or_else(|| env(ENV_CONFIG).map(PathBuf::from));
        let file = match config_path {
            Some(path) => FileConfig::load(&path)?,
            None => FileConfig::default(),
        };

        let defaults = ClientConfig::default();
        let client = ClientConfig {
            api_root: file.api_root.unwrap_or(defaults.api_root),
            max_concurrent_downloads: file
                .max_concurrent_downloads
                .unwrap_or(defaults.max_concurrent_downloads),
            max_retries: file.max_retries.unwrap_or(defaults.max_retries),
            retry_backoff: parse_duration("retry_backoff", file.retry_backoff)?
                .unwrap_or(defaults.retry_backoff),
            request_timeout: parse_duration("request_timeout", file.request_timeout)?
                .unwrap_or(defaults.request_timeout),
            ..defaults
        };

        Ok(Settings {
            api_key: overrides.api_key.or_else(|| env(ENV_API_KEY)).or(file.api_key),
            api_secret: overrides
                .api_secret
                .or_else(|| env(ENV_API_SECRET))
                .or(file.api_secret),
            download_dir: overrides
                .download_dir
                .or(file.download_dir)
                .unwrap_or_else(|| PathBuf::from("./downloads")),
            data_dir: overrides
                .data_dir
                .or(file.data_dir)
                .unwrap_or_else(|| PathBuf::from("./data")),
            client,
        })
    }

    /// Validated credentials; missing or empty values are a configuration error.
    pub fn credentials(&self) -> Result<Credentials, CanvasDataError> {
        Credentials::new(
            self.api_key.clone().unwrap_or_default(),
            self.api_secret.clone().unwrap_or_default(),
        )
    }
}

fn parse_duration(field: &str, value: Option<String>) -> Result<Option<Duration>, CanvasDataError> {
    value
        .map(|text| {
            humantime::parse_duration(&text).map_err(|e| {
                CanvasDataError::ConfigurationError(format!("invalid {} {:?}: {}", field, text, e))
            })
        })
        .transpose()
}
