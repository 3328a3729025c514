//! The client instance: HTTP plumbing plus the schema caches it owns.

use crate::config::Settings;
use crate::error::CanvasDataError;
use crate::fetch::{Auth, Fetcher};
use crate::retry::RetryPolicy;
use crate::signer::{Credentials, Signer};
use crate::types::{ClientConfig, Schema, SchemaVersion};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

/// Account id that stands for the account owning the API key.
pub const SELF_ACCOUNT: &str = "self";

/// Client for the Canvas Data API.
///
/// Schema versions and schemas are cached for the lifetime of the instance;
/// build a new client to start from an empty cache.
///
/// # Example
///
/// ```no_run
/// use canvas_data::{CanvasDataClient, Credentials, SELF_ACCOUNT};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = CanvasDataClient::new(Credentials::new("key", "secret")?)?;
/// let dumps = client.list_dumps(SELF_ACCOUNT, 10, None).await?;
/// println!("{} dumps", dumps.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CanvasDataClient {
    pub(crate) fetcher: Fetcher,
    pub(crate) config: ClientConfig,
    api_root: Url,
    pub(crate) schema_versions: OnceCell<Vec<SchemaVersion>>,
    pub(crate) schemas: RwLock<HashMap<(String, bool), Schema>>,
}

#[derive(Deserialize)]
struct ApiMessage {
    message: String,
}

impl CanvasDataClient {
    pub fn new(credentials: Credentials) -> Result<Self, CanvasDataError> {
        Self::with_config(credentials, ClientConfig::default())
    }

    pub fn with_config(
        credentials: Credentials,
        config: ClientConfig,
    ) -> Result<Self, CanvasDataError> {
        let api_root = Url::parse(config.api_root.trim_end_matches('/')).map_err(|e| {
            CanvasDataError::ConfigurationError(format!(
                "invalid API root {}: {}",
                config.api_root, e
            ))
        })?;
        if config.max_concurrent_downloads == 0 {
            return Err(CanvasDataError::ConfigurationError(
                "max_concurrent_downloads must be at least 1".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        let policy = RetryPolicy::new(config.max_retries, config.retry_backoff);
        let fetcher = Fetcher::new(http, Signer::new(credentials), policy)
            .with_request_timeout(config.request_timeout);

        Ok(Self {
            fetcher,
            config,
            api_root,
            schema_versions: OnceCell::new(),
            schemas: RwLock::new(HashMap::new()),
        })
    }

    /// Builds a client from resolved settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, CanvasDataError> {
        let credentials = settings.credentials()?;
        Self::with_config(credentials, settings.client.clone())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Absolute URL of an API path such as `/api/schema`.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, CanvasDataError> {
        self.api_root
            .join(path)
            .map_err(|e| CanvasDataError::InvalidArgument(format!("bad API path {}: {}", path, e)))
    }

    /// Signed GET that decodes a JSON body, turning non-success into an API error.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: &Url,
    ) -> Result<T, CanvasDataError> {
        let response = self.fetcher.get(url, Auth::Signed).await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!("{} returned {} bytes", url, body.len());
        serde_json::from_str(&body).map_err(|e| CanvasDataError::ApiError {
            status: Some(status),
            message: format!("invalid response format from {}: {}", url, e),
        })
    }
}

/// Best available diagnostic for a non-success response: the JSON
/// `message` field, else the raw body, else the status reason.
pub(crate) async fn api_error(response: Response) -> CanvasDataError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiMessage>(&body) {
        Ok(parsed) => parsed.message,
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    CanvasDataError::ApiError {
        status: Some(status.as_u16()),
        message,
    }
}
