//! Signed, retried HTTP GETs.

use crate::error::CanvasDataError;
use crate::retry::RetryPolicy;
use crate::signer::Signer;
use reqwest::{Client, Response, Url};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Whether a request carries the HMAC `Authorization` and `Date` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Auth {
    /// API endpoints.
    Signed,
    /// Pre-signed fragment URLs.
    Unsigned,
}

/// Why a single attempt did not produce a success response.
#[derive(Debug)]
enum AttemptFailure {
    Status(Response),
    Transport(reqwest::Error),
    Signing(CanvasDataError),
}

impl AttemptFailure {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptFailure::Status(_) => true,
            AttemptFailure::Transport(e) => !e.is_builder(),
            AttemptFailure::Signing(_) => false,
        }
    }
}

/// Issues GET requests, signing each attempt afresh and retrying transient
/// failures.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http: Client,
    signer: Signer,
    policy: RetryPolicy,
    request_timeout: Option<Duration>,
}

impl Fetcher {
    pub fn new(http: Client, signer: Signer, policy: RetryPolicy) -> Self {
        Self {
            http,
            signer,
            policy,
            request_timeout: None,
        }
    }

    /// Applies a whole-request timeout to every attempt made by [`Fetcher::get`].
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Fetches `url`, retrying connection failures and non-success statuses.
    ///
    /// When retries run out, a connection failure becomes
    /// [`CanvasDataError::ConnectionFailure`], while a non-success response
    /// is handed back as-is for the caller to interpret.
    pub async fn get(&self, url: &Url, auth: Auth) -> Result<Response, CanvasDataError> {
        self.send(url, auth, self.request_timeout).await
    }

    /// Like [`Fetcher::get`] but without the whole-request timeout, for
    /// streaming large bodies.
    pub async fn get_stream(&self, url: &Url) -> Result<Response, CanvasDataError> {
        self.send(url, Auth::Unsigned, None).await
    }

    async fn send(
        &self,
        url: &Url,
        auth: Auth,
        timeout: Option<Duration>,
    ) -> Result<Response, CanvasDataError> {
        let max_attempts = self.policy.max_attempts();
        let mut attempt = 0usize;

        let outcome = self
            .policy
            .run(
                || {
                    attempt += 1;
                    let current = attempt;
                    async move { self.attempt(url, auth, timeout, current, max_attempts).await }
                },
                AttemptFailure::is_retryable,
            )
            .await;

        match outcome {
            Ok(response) => Ok(response),
            Err(AttemptFailure::Status(response)) => {
                warn!(
                    "Giving up on {} with HTTP {} after {} attempts",
                    url,
                    response.status(),
                    max_attempts
                );
                Ok(response)
            }
            Err(AttemptFailure::Transport(e)) if e.is_builder() => {
                Err(CanvasDataError::ReqwestError(e))
            }
            Err(AttemptFailure::Transport(e)) => {
                error!("Connection to {} failed, reached the retry limit", url);
                Err(CanvasDataError::ConnectionFailure {
                    url: url.to_string(),
                    attempts: max_attempts,
                    source: e,
                })
            }
            Err(AttemptFailure::Signing(e)) => Err(e),
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        auth: Auth,
        timeout: Option<Duration>,
        attempt: usize,
        max_attempts: usize,
    ) -> Result<Response, AttemptFailure> {
        let mut request = self.http.get(url.clone());
        if auth == Auth::Signed {
            // The signature covers the timestamp, so every attempt signs again.
            let headers = self.signer.headers(url).map_err(AttemptFailure::Signing)?;
            request = request.headers(headers);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        debug!("GET {} (attempt {}/{})", url, attempt, max_attempts);
        match request.send().await {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => {
                warn!(
                    "Got a non-success response ({}) from {} - attempt {}/{}",
                    response.status(),
                    url,
                    attempt,
                    max_attempts
                );
                Err(AttemptFailure::Status(response))
            }
            Err(e) => {
                warn!(
                    "Connection error for {} - attempt {}/{}: {}",
                    url, attempt, max_attempts, e
                );
                Err(AttemptFailure::Transport(e))
            }
        }
    }
}
