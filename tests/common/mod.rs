#![allow(dead_code)]

use canvas_data::{CanvasDataClient, ClientConfig, Credentials};
use flate2::write::GzEncoder;
use flate2::Compression;
use mockito::{Mock, Request, ServerGuard};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const API_KEY: &str = "test-key";
pub const API_SECRET: &str = "test-secret";

pub fn test_config(server: &ServerGuard) -> ClientConfig {
    ClientConfig {
        api_root: server.url(),
        retry_backoff: Duration::from_millis(10),
        request_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(5),
        ..ClientConfig::default()
    }
}

pub fn client_with(config: ClientConfig) -> CanvasDataClient {
    CanvasDataClient::with_config(Credentials::new(API_KEY, API_SECRET).unwrap(), config)
        .unwrap()
}

pub fn test_client(server: &ServerGuard) -> CanvasDataClient {
    client_with(test_config(server))
}

pub fn gzip(content: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content).unwrap();
    encoder.finish().unwrap()
}

/// JSON mock for a GET on `path`, expected exactly `hits` times.
pub async fn mock_json(
    server: &mut ServerGuard,
    path: &str,
    status: usize,
    body: serde_json::Value,
    hits: usize,
) -> Mock {
    server
        .mock("GET", path)
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .expect(hits)
        .create_async()
        .await
}

/// `Date` and `Authorization` values of the requests a mock answered.
#[derive(Debug, Clone, Default)]
pub struct SeenHeaders(Arc<Mutex<Vec<(String, String)>>>);

impl SeenHeaders {
    pub fn all(&self) -> Vec<(String, String)> {
        self.0.lock().unwrap().clone()
    }

    /// Response body callback that records the signing headers and answers
    /// with `body`.
    pub fn recorder(
        &self,
        body: serde_json::Value,
    ) -> impl Fn(&Request) -> Vec<u8> + Send + Sync + 'static {
        let seen = self.clone();
        let body = body.to_string().into_bytes();
        move |request: &Request| {
            let value = |name: &'static str| {
                request
                    .header(name)
                    .first()
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            };
            seen.0
                .lock()
                .unwrap()
                .push((value("date"), value("authorization")));
            body.clone()
        }
    }
}
