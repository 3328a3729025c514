//! canvas-data - client library for the Canvas Data export API
//!
//! This library signs requests to the Canvas Data API, looks up schemas,
//! dumps and fragment manifests, and downloads the gzip fragments of each
//! table, reassembling them into one flat file per table.
//!
//! # Features
//!
//! - **HMAC Signing**: Every API request carries a freshly computed `HMACAuth` signature
//! - **Automatic Retry**: Fixed-interval retries for connection failures and error statuses
//! - **Schema Caching**: Schema versions and schemas are fetched once per client
//! - **Idempotent Downloads**: Existing fragments and table files are reused unless forced
//! - **Ordered Reassembly**: Fragments are concatenated in manifest order, even when
//!   downloaded in parallel
//!
//! # Example
//!
//! ```no_run
//! use canvas_data::{CanvasDataClient, Credentials, DumpRef, SELF_ACCOUNT};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CanvasDataClient::new(Credentials::new("key", "secret")?)?;
//! let dump_id = client.get_latest_regular_dump(SELF_ACCOUNT).await?;
//! client
//!     .materialize_dump(
//!         &DumpRef::Id(dump_id),
//!         SELF_ACCOUNT,
//!         Path::new("./data"),
//!         Path::new("./downloads"),
//!         false,
//!         false,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod aliases;
pub mod client;
pub mod config;
mod download;
pub mod error;
pub mod fetch;
mod merge;
mod metadata;
mod orchestrator;
mod part_file;
pub mod retry;
pub mod signer;
pub mod sql;
pub mod types;

pub use aliases::{api_table_key, dump_table_name};
pub use client::{CanvasDataClient, SELF_ACCOUNT};
pub use config::{Overrides, Settings};
pub use error::CanvasDataError;
pub use fetch::{Auth, Fetcher};
pub use metadata::normalize_schema_keys;
pub use orchestrator::table_output_path;
pub use retry::RetryPolicy;
pub use signer::{Credentials, Signer};
pub use types::{
    ClientConfig, Column, Dump, DumpManifest, DumpRef, FileManifest, FileRef, FileSelector,
    HistoryEntry, Schema, SchemaVersion, SyncFile, SyncManifest, TableArtifacts, TableDefinition,
    TableHistory, REQUESTS_TABLE,
};
