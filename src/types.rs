//! Data structures returned by the Canvas Data API.

use crate::error::CanvasDataError;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Name of the synthetic page-view table that dwarfs every other table.
pub const REQUESTS_TABLE: &str = "requests";

/// Default API root for hosted Canvas Data.
pub const DEFAULT_API_ROOT: &str = "https://api.inshosteddata.com";

/// Tuning knobs for a [`CanvasDataClient`](crate::CanvasDataClient).
///
/// # Example
///
/// ```
/// use canvas_data::ClientConfig;
///
/// let config = ClientConfig {
///     max_concurrent_downloads: 8,
///     ..ClientConfig::default()
/// };
/// assert_eq!(config.max_retries, 3);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme and host the API endpoints hang off (e.g. `<https://api.inshosteddata.com>`)
    pub api_root: String,
    /// Write buffer size used while streaming fragment bodies to disk (default: 1 MiB).
    pub download_chunk_size: usize,
    /// Maximum number of fragments downloaded at once (default: 4).
    pub max_concurrent_downloads: usize,
    /// Retries after the first attempt of every request (default: 3).
    pub max_retries: usize,
    /// Fixed delay between attempts (default: 2s).
    pub retry_backoff: Duration,
    /// Whole-request timeout for API calls (default: 60s).
    pub request_timeout: Duration,
    /// Connect timeout for every request, fragment downloads included (default: 30s).
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_root: DEFAULT_API_ROOT.to_string(),
            download_chunk_size: 1024 * 1024,
            max_concurrent_downloads: 4,
            max_retries: 3,
            retry_backoff: Duration::from_secs(2),
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// One entry of `GET /api/schema`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchemaVersion {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A column of a table definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Definition of one table in a schema version.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    pub table_name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub incremental: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Table definitions keyed either by API key or by table name, in server order.
pub type Schema = IndexMap<String, TableDefinition>;

/// Envelope of `GET /api/schema/{version}`.
#[derive(Deserialize, Debug, Clone)]
pub(crate) struct SchemaEnvelope {
    pub schema: Schema,
}

/// One entry of the dump listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dump {
    pub dump_id: String,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub schema_version: String,
    pub num_files: u64,
}

/// A remote fragment: a gzip file and the URL it can be fetched from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub filename: String,
    pub url: String,
}

/// Fragments of a single table within a dump.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TableArtifacts {
    #[serde(default)]
    pub files: Vec<FileRef>,
    /// `true` when the dump only carries changes since the previous dump,
    /// so the destination table must not be truncated before loading.
    #[serde(default)]
    pub partial: bool,
}

/// File manifest for one dump.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DumpManifest {
    #[serde(default)]
    pub dump_id: Option<String>,
    pub sequence: u64,
    /// Tables in the order the server listed them.
    pub artifacts_by_table: IndexMap<String, TableArtifacts>,
}

impl DumpManifest {
    /// Table names in this dump, optionally leaving out `requests`.
    pub fn table_names(&self, include_requests: bool) -> Vec<String> {
        self.artifacts_by_table
            .keys()
            .filter(|name| include_requests || name.as_str() != REQUESTS_TABLE)
            .cloned()
            .collect()
    }
}

/// One dump's worth of fragments in a table history.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(default)]
    pub dump_id: Option<String>,
    #[serde(default)]
    pub sequence: Option<u64>,
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

/// Fragments of one table across every dump that still holds it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableHistory {
    #[serde(default)]
    pub table: Option<String>,
    pub history: Vec<HistoryEntry>,
}

/// A file of the sync snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SyncFile {
    pub table: String,
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub partial: bool,
}

/// Files that together make up a complete snapshot of the current data.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncManifest {
    #[serde(default)]
    pub schema_version: Option<String>,
    #[serde(default)]
    pub incomplete: bool,
    pub files: Vec<SyncFile>,
}

/// Either manifest shape the file endpoints return.
#[derive(Debug, Clone, PartialEq)]
pub enum FileManifest {
    Dump(DumpManifest),
    History(TableHistory),
}

impl FileManifest {
    /// All fragments in server order.
    pub fn files(&self) -> Vec<&FileRef> {
        match self {
            FileManifest::Dump(manifest) => manifest
                .artifacts_by_table
                .values()
                .flat_map(|artifacts| artifacts.files.iter())
                .collect(),
            FileManifest::History(history) => history
                .history
                .iter()
                .flat_map(|entry| entry.files.iter())
                .collect(),
        }
    }
}

/// A dump addressed by id, or the server's most recent one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DumpRef {
    #[default]
    Latest,
    Id(String),
}

impl DumpRef {
    /// Parses user input, treating `"latest"` as the sentinel.
    pub fn parse(value: &str) -> Self {
        if value == "latest" {
            DumpRef::Latest
        } else {
            DumpRef::Id(value.to_string())
        }
    }
}

impl fmt::Display for DumpRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DumpRef::Latest => f.write_str("latest"),
            DumpRef::Id(id) => f.write_str(id),
        }
    }
}

/// Which fragments a file manifest request is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSelector {
    /// Every table of one dump.
    ByDump(DumpRef),
    /// One table across its whole history.
    ByTable(String),
    /// One table within one dump.
    ByTableAndDump(String, DumpRef),
}

impl FileSelector {
    /// Builds a selector from optional inputs, failing when neither is given.
    pub fn from_options(
        dump: Option<DumpRef>,
        table: Option<String>,
    ) -> Result<Self, CanvasDataError> {
        match (dump, table) {
            (Some(dump), Some(table)) => Ok(FileSelector::ByTableAndDump(table, dump)),
            (Some(dump), None) => Ok(FileSelector::ByDump(dump)),
            (None, Some(table)) => Ok(FileSelector::ByTable(table)),
            (None, None) => Err(CanvasDataError::InvalidArgument(
                "must specify a dump id, a table name, or both".to_string(),
            )),
        }
    }
}
