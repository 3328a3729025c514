//! Schema, dump and file-manifest lookups.

use crate::aliases::dump_table_name;
use crate::client::CanvasDataClient;
use crate::error::CanvasDataError;
use crate::types::{
    Dump, DumpManifest, DumpRef, FileManifest, FileSelector, Schema, SchemaEnvelope,
    SchemaVersion, SyncManifest, TableHistory, REQUESTS_TABLE,
};
use tracing::{debug, info};

impl CanvasDataClient {
    /// All available schema versions. Fetched once per client.
    pub async fn list_schema_versions(&self) -> Result<Vec<SchemaVersion>, CanvasDataError> {
        let versions = self
            .schema_versions
            .get_or_try_init(|| async {
                let url = self.endpoint("/api/schema")?;
                info!("Retrieving schema versions from {}", url);
                self.get_json::<Vec<SchemaVersion>>(&url).await
            })
            .await?;
        Ok(versions.clone())
    }

    /// One schema version (`"latest"` for the newest).
    ///
    /// Keys are the API's table keys, which usually but not always match the
    /// table names. With `normalize_keys` the map is keyed by each entry's
    /// `tableName` instead. Results are cached per `(version, normalize_keys)`.
    pub async fn get_schema(
        &self,
        version: &str,
        normalize_keys: bool,
    ) -> Result<Schema, CanvasDataError> {
        let cache_key = (version.to_string(), normalize_keys);
        if let Some(schema) = self.schemas.read().await.get(&cache_key) {
            debug!("Schema {} served from cache", version);
            return Ok(schema.clone());
        }

        let url = self.endpoint(&format!("/api/schema/{}", version))?;
        info!("Retrieving schema {} from {}", version, url);
        let envelope: SchemaEnvelope = self.get_json(&url).await?;
        let schema = if normalize_keys {
            normalize_schema_keys(envelope.schema)
        } else {
            envelope.schema
        };

        let mut cache = self.schemas.write().await;
        Ok(cache.entry(cache_key).or_insert(schema).clone())
    }

    /// Dumps for an account, most recent first.
    ///
    /// `after_sequence` is an exclusive lower bound on the sequence number.
    pub async fn list_dumps(
        &self,
        account_id: &str,
        limit: u32,
        after_sequence: Option<u64>,
    ) -> Result<Vec<Dump>, CanvasDataError> {
        if limit == 0 {
            return Err(CanvasDataError::InvalidArgument(
                "dump listing limit must be at least 1".to_string(),
            ));
        }

        let mut url = self.endpoint(&format!("/api/account/{}/dump", account_id))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(after) = after_sequence {
                query.append_pair("after", &after.to_string());
            }
        }
        self.get_json(&url).await
    }

    /// Fragment manifest of one dump.
    pub async fn get_dump_manifest(
        &self,
        account_id: &str,
        dump: &DumpRef,
    ) -> Result<DumpManifest, CanvasDataError> {
        let path = match dump {
            DumpRef::Latest => format!("/api/account/{}/file/latest", account_id),
            DumpRef::Id(id) => format!("/api/account/{}/file/byDump/{}", account_id, id),
        };
        let url = self.endpoint(&path)?;
        self.get_json(&url).await
    }

    /// Fragments of one table across every dump that still holds it.
    pub async fn get_table_history(
        &self,
        account_id: &str,
        table_name: &str,
    ) -> Result<TableHistory, CanvasDataError> {
        let table = dump_table_name(table_name);
        let url = self.endpoint(&format!("/api/account/{}/file/byTable/{}", account_id, table))?;
        self.get_json(&url).await
    }

    /// Files that together form a complete snapshot of the current data.
    pub async fn get_sync_manifest(
        &self,
        account_id: &str,
    ) -> Result<SyncManifest, CanvasDataError> {
        let url = self.endpoint(&format!("/api/account/{}/file/sync", account_id))?;
        self.get_json(&url).await
    }

    /// Manifest for whatever `selector` names.
    ///
    /// For [`FileSelector::ByTableAndDump`] the dump manifest is narrowed to
    /// that one table, which must be present in the dump.
    pub async fn get_file_manifest(
        &self,
        account_id: &str,
        selector: &FileSelector,
    ) -> Result<FileManifest, CanvasDataError> {
        match selector {
            FileSelector::ByDump(dump) => {
                Ok(FileManifest::Dump(self.get_dump_manifest(account_id, dump).await?))
            }
            FileSelector::ByTable(table) => Ok(FileManifest::History(
                self.get_table_history(account_id, table).await?,
            )),
            FileSelector::ByTableAndDump(table, dump) => {
                let manifest = self.get_dump_manifest(account_id, dump).await?;
                Ok(FileManifest::Dump(narrow_to_table(manifest, table, dump)?))
            }
        }
    }

    /// Id of the most recent dump that is not a full `requests` snapshot.
    ///
    /// A latest dump that carries the whole `requests` table is an
    /// exceptionally heavy one, so the dump before it is returned instead.
    pub async fn get_latest_regular_dump(
        &self,
        account_id: &str,
    ) -> Result<String, CanvasDataError> {
        let dumps = self.list_dumps(account_id, 2, None).await?;
        let (latest, previous) = match dumps.as_slice() {
            [latest, previous, ..] => (latest, previous),
            _ => {
                return Err(CanvasDataError::DumpNotFound(format!(
                    "account {} has {} dump(s); at least 2 are needed to pick a regular dump",
                    account_id,
                    dumps.len()
                )))
            }
        };

        let manifest = self
            .get_dump_manifest(account_id, &DumpRef::Id(latest.dump_id.clone()))
            .await?;
        let full_requests_dump = manifest
            .artifacts_by_table
            .get(REQUESTS_TABLE)
            .map(|requests| !requests.partial)
            .unwrap_or(false);

        if full_requests_dump {
            info!(
                "Dump {} is a full requests dump; using {} instead",
                latest.dump_id, previous.dump_id
            );
            Ok(previous.dump_id.clone())
        } else {
            Ok(latest.dump_id.clone())
        }
    }
}

/// Re-keys a schema by each definition's `tableName`.
pub fn normalize_schema_keys(schema: Schema) -> Schema {
    schema
        .into_values()
        .map(|definition| (definition.table_name.clone(), definition))
        .collect()
}

fn narrow_to_table(
    mut manifest: DumpManifest,
    table_name: &str,
    dump: &DumpRef,
) -> Result<DumpManifest, CanvasDataError> {
    let table = dump_table_name(table_name);
    let artifacts = manifest.artifacts_by_table.shift_remove(table).ok_or_else(|| {
        CanvasDataError::InvalidArgument(format!("table {} is not part of dump {}", table, dump))
    })?;
    manifest.artifacts_by_table.clear();
    manifest.artifacts_by_table.insert(table.to_string(), artifacts);
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TableArtifacts, TableDefinition};
    use indexmap::IndexMap;

    #[test]
    fn normalized_schema_is_keyed_by_table_name() {
        let json = r#"{"x1": {"tableName": "course_dim", "columns": []}}"#;
        let schema: Schema = serde_json::from_str(json).unwrap();

        let normalized = normalize_schema_keys(schema);
        let expected: Schema = IndexMap::from([(
            "course_dim".to_string(),
            TableDefinition {
                table_name: "course_dim".to_string(),
                columns: vec![],
                incremental: false,
                description: None,
            },
        )]);
        assert_eq!(normalized, expected);
    }

    #[test]
    fn narrowing_accepts_either_table_spelling() {
        let manifest = DumpManifest {
            dump_id: None,
            sequence: 3,
            artifacts_by_table: IndexMap::from([
                (
                    "course_dim".to_string(),
                    TableArtifacts { files: vec![], partial: false },
                ),
                (
                    "user_dim".to_string(),
                    TableArtifacts { files: vec![], partial: true },
                ),
            ]),
        };

        let by_key = narrow_to_table(manifest.clone(), "course", &DumpRef::Latest).unwrap();
        let by_name = narrow_to_table(manifest.clone(), "course_dim", &DumpRef::Latest).unwrap();
        assert_eq!(by_key, by_name);
        assert_eq!(by_key.table_names(true), vec!["course_dim"]);

        assert!(matches!(
            narrow_to_table(manifest, "quiz_dim", &DumpRef::Latest),
            Err(CanvasDataError::InvalidArgument(_))
        ));
    }
}
