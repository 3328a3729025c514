//! Download-and-reassemble orchestration for tables and dumps.

use crate::aliases::dump_table_name;
use crate::client::CanvasDataClient;
use crate::download::download_fragment;
use crate::error::CanvasDataError;
use crate::merge::merge_fragments;
use crate::types::{DumpManifest, DumpRef, FileManifest, FileRef, FileSelector, REQUESTS_TABLE};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

impl CanvasDataClient {
    /// Downloads every fragment `selector` refers to and returns their local
    /// paths in manifest order.
    ///
    /// With `include_requests == false` the `requests` table is skipped when
    /// a whole dump is selected.
    pub async fn fetch_table_files(
        &self,
        account_id: &str,
        selector: &FileSelector,
        download_dir: &Path,
        include_requests: bool,
        force: bool,
    ) -> Result<Vec<PathBuf>, CanvasDataError> {
        let manifest = self.get_file_manifest(account_id, selector).await?;
        let files: Vec<FileRef> = match (&manifest, selector) {
            (FileManifest::Dump(dump), FileSelector::ByDump(_)) => dump
                .artifacts_by_table
                .iter()
                .filter(|(table, _)| include_requests || table.as_str() != REQUESTS_TABLE)
                .flat_map(|(_, artifacts)| artifacts.files.iter().cloned())
                .collect(),
            _ => manifest.files().into_iter().cloned().collect(),
        };
        self.fetch_files(&files, download_dir, force).await
    }

    /// Downloads `files` with bounded parallelism, returning local paths in
    /// the order of `files`. Each distinct filename is written by one task.
    pub async fn fetch_files(
        &self,
        files: &[FileRef],
        download_dir: &Path,
        force: bool,
    ) -> Result<Vec<PathBuf>, CanvasDataError> {
        tokio::fs::create_dir_all(download_dir).await?;

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_downloads));
        let mut task_for_filename: HashMap<&str, usize> = HashMap::new();
        let mut download_tasks = vec![];
        let mut task_order = Vec::with_capacity(files.len());

        for file in files {
            if let Some(&index) = task_for_filename.get(file.filename.as_str()) {
                task_order.push(index);
                continue;
            }

            let semaphore = Arc::clone(&semaphore);
            let fetcher = self.fetcher.clone();
            let file_clone = file.clone();
            let dir = download_dir.to_path_buf();
            let chunk_size = self.config.download_chunk_size;

            let task = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|e| {
                    CanvasDataError::IoError(std::io::Error::other(format!(
                        "Semaphore closed: {}",
                        e
                    )))
                })?;
                download_fragment(&fetcher, &file_clone, &dir, force, chunk_size).await
            });

            task_for_filename.insert(file.filename.as_str(), download_tasks.len());
            task_order.push(download_tasks.len());
            download_tasks.push(task);
        }

        // Wait for every download; the first failure aborts the rest
        let mut local_paths = Vec::with_capacity(download_tasks.len());
        let mut pending = download_tasks.into_iter();
        while let Some(task) = pending.next() {
            let outcome = match task.await {
                Ok(result) => result,
                Err(e) => Err(CanvasDataError::IoError(std::io::Error::other(format!(
                    "Task failed: {}",
                    e
                )))),
            };
            match outcome {
                Ok(path) => local_paths.push(path),
                Err(e) => {
                    error!("Fragment download failed: {}", e);
                    for remaining in pending.by_ref() {
                        remaining.abort();
                    }
                    return Err(e);
                }
            }
        }

        Ok(task_order
            .into_iter()
            .map(|index| local_paths[index].clone())
            .collect())
    }

    /// Reassembles one table of a dump into `data_dir/<table>.txt`.
    ///
    /// An existing output file is returned untouched unless `force` is set,
    /// in which case fragments are also re-downloaded.
    pub async fn materialize_table(
        &self,
        table_name: &str,
        account_id: &str,
        dump: &DumpRef,
        data_dir: &Path,
        download_dir: &Path,
        force: bool,
    ) -> Result<PathBuf, CanvasDataError> {
        let table = dump_table_name(table_name);
        let destination = table_output_path(data_dir, table);
        if !force && tokio::fs::try_exists(&destination).await? {
            info!("Not overwriting {} because it already exists", destination.display());
            return Ok(destination);
        }

        let selector = FileSelector::ByTableAndDump(table.to_string(), dump.clone());
        let fragments = self
            .fetch_table_files(account_id, &selector, download_dir, true, force)
            .await?;
        write_table(fragments, data_dir, destination).await
    }

    /// Reassembles every table of a dump, stopping at the first failure.
    pub async fn materialize_dump(
        &self,
        dump: &DumpRef,
        account_id: &str,
        data_dir: &Path,
        download_dir: &Path,
        include_requests: bool,
        force: bool,
    ) -> Result<Vec<PathBuf>, CanvasDataError> {
        let manifest = self.get_dump_manifest(account_id, dump).await?;
        self.materialize_manifest(&manifest, data_dir, download_dir, include_requests, force)
            .await
    }

    /// Reassembles the tables of an already fetched dump manifest.
    pub async fn materialize_manifest(
        &self,
        manifest: &DumpManifest,
        data_dir: &Path,
        download_dir: &Path,
        include_requests: bool,
        force: bool,
    ) -> Result<Vec<PathBuf>, CanvasDataError> {
        let mut outputs = vec![];
        for table in manifest.table_names(include_requests) {
            outputs.push(
                self.materialize_manifest_table(manifest, &table, data_dir, download_dir, force)
                    .await?,
            );
        }
        Ok(outputs)
    }

    /// Reassembles one table of an already fetched dump manifest.
    pub async fn materialize_manifest_table(
        &self,
        manifest: &DumpManifest,
        table_name: &str,
        data_dir: &Path,
        download_dir: &Path,
        force: bool,
    ) -> Result<PathBuf, CanvasDataError> {
        let table = dump_table_name(table_name);
        let destination = table_output_path(data_dir, table);
        if !force && tokio::fs::try_exists(&destination).await? {
            info!("Not overwriting {} because it already exists", destination.display());
            return Ok(destination);
        }

        let artifacts = manifest.artifacts_by_table.get(table).ok_or_else(|| {
            CanvasDataError::InvalidArgument(format!(
                "table {} is not part of dump sequence {}",
                table, manifest.sequence
            ))
        })?;
        let fragments = self.fetch_files(&artifacts.files, download_dir, force).await?;
        write_table(fragments, data_dir, destination).await
    }
}

/// `data_dir/<table>.txt`.
pub fn table_output_path(data_dir: &Path, table_name: &str) -> PathBuf {
    data_dir.join(format!("{}.txt", table_name))
}

async fn write_table(
    fragments: Vec<PathBuf>,
    data_dir: &Path,
    destination: PathBuf,
) -> Result<PathBuf, CanvasDataError> {
    tokio::fs::create_dir_all(data_dir).await?;
    let fragment_count = fragments.len();
    let lines = merge_fragments(fragments, destination.clone()).await?;
    info!(
        "Wrote {} lines from {} fragments to {}",
        lines,
        fragment_count,
        destination.display()
    );
    Ok(destination)
}
