//! HMAC request signing for the Canvas Data API.

use crate::error::CanvasDataError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, DATE};
use reqwest::Url;
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Format of the `Date` header and of the timestamp line in the signed message.
pub const DATE_FORMAT: &str = "%a, %d %b %y %H:%M:%S GMT";

/// API key and secret. The secret never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"***")
            .finish()
    }
}

impl Credentials {
    /// Fails with a configuration error when either value is empty.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Result<Self, CanvasDataError> {
        let key = key.into();
        let secret = secret.into();
        if key.trim().is_empty() || secret.trim().is_empty() {
            return Err(CanvasDataError::ConfigurationError(
                "the API key or API secret is missing".to_string(),
            ));
        }
        Ok(Credentials { key, secret })
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// The parts of a GET request that go into its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub host: String,
    pub path: String,
    /// Raw query string without the leading `?`; empty when there is none.
    pub query: String,
}

impl CanonicalRequest {
    pub fn from_url(url: &Url) -> Self {
        CanonicalRequest {
            host: url.host_str().unwrap_or_default().to_string(),
            path: url.path().to_string(),
            query: url.query().unwrap_or_default().to_string(),
        }
    }

    /// Query pairs sorted by the whole `key=value` text and re-joined.
    pub fn sorted_query(&self) -> String {
        if self.query.is_empty() {
            return String::new();
        }
        let mut pairs: Vec<&str> = self.query.split('&').collect();
        pairs.sort_unstable();
        pairs.join("&")
    }
}

/// Computes `Authorization` and `Date` headers for API requests.
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        Signer { credentials }
    }

    /// Formats `at` the way the signature and the `Date` header expect.
    pub fn format_timestamp(at: DateTime<Utc>) -> String {
        at.format(DATE_FORMAT).to_string()
    }

    /// The six-line message that gets signed, with the secret as a final line.
    pub fn canonical_message(&self, request: &CanonicalRequest, timestamp: &str) -> String {
        format!(
            "GET\n{}\n\n\n{}\n{}\n{}\n{}",
            request.host,
            request.path,
            request.sorted_query(),
            timestamp,
            self.credentials.secret
        )
    }

    /// Base64 of HMAC-SHA256 over the canonical message, keyed by the secret.
    pub fn signature(
        &self,
        request: &CanonicalRequest,
        timestamp: &str,
    ) -> Result<String, CanvasDataError> {
        let message = self.canonical_message(request, timestamp);
        let mut mac =
            HmacSha256::new_from_slice(self.credentials.secret.as_bytes()).map_err(|e| {
                CanvasDataError::ConfigurationError(format!("unusable API secret: {}", e))
            })?;
        mac.update(message.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// Headers for one attempt at `url`, signed at `timestamp`.
    pub fn headers_at(&self, url: &Url, timestamp: &str) -> Result<HeaderMap, CanvasDataError> {
        let request = CanonicalRequest::from_url(url);
        let authorization = format!(
            "HMACAuth {}:{}",
            self.credentials.key,
            self.signature(&request, timestamp)?
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&authorization).map_err(|e| {
                CanvasDataError::ConfigurationError(format!(
                    "API key is not a valid header value: {}",
                    e
                ))
            })?,
        );
        headers.insert(
            DATE,
            HeaderValue::from_str(timestamp).map_err(|e| {
                CanvasDataError::InvalidArgument(format!("bad request timestamp: {}", e))
            })?,
        );
        Ok(headers)
    }

    /// Headers for one attempt at `url`, signed now. Call once per attempt.
    pub fn headers(&self, url: &Url) -> Result<HeaderMap, CanvasDataError> {
        self.headers_at(url, &Self::format_timestamp(Utc::now()))
    }
}
