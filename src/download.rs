//! Fragment download functionality.

use crate::client::{api_error, CanvasDataClient};
use crate::error::CanvasDataError;
use crate::fetch::Fetcher;
use crate::part_file::PartFile;
use crate::types::FileRef;
use futures_util::StreamExt;
use reqwest::Url;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

impl CanvasDataClient {
    /// Downloads one fragment into `download_dir`, returning its local path.
    ///
    /// An existing file is reused without any network call unless `force`
    /// is set.
    pub async fn fetch_file(
        &self,
        file: &FileRef,
        download_dir: &Path,
        force: bool,
    ) -> Result<PathBuf, CanvasDataError> {
        tokio::fs::create_dir_all(download_dir).await?;
        download_fragment(
            &self.fetcher,
            file,
            download_dir,
            force,
            self.config.download_chunk_size,
        )
        .await
    }
}

/// Local path a fragment is stored under. Rejects names that would escape
/// the download directory.
pub(crate) fn fragment_path(
    download_dir: &Path,
    filename: &str,
) -> Result<PathBuf, CanvasDataError> {
    let is_plain_name = !filename.is_empty()
        && filename != "."
        && filename != ".."
        && !filename.contains(['/', '\\']);
    if !is_plain_name {
        return Err(CanvasDataError::InvalidArgument(format!(
            "refusing to store fragment under name {:?}",
            filename
        )));
    }
    Ok(download_dir.join(filename))
}

/// Streams `file` to `download_dir/<filename>` through a `.part` file.
///
/// # Arguments
///
/// * `fetcher` - Fetcher used for the (unsigned) GET
/// * `file` - The fragment to fetch
/// * `download_dir` - Existing directory to store the fragment in
/// * `force` - Re-download even if the target exists
/// * `chunk_size` - Write buffer size
pub(crate) async fn download_fragment(
    fetcher: &Fetcher,
    file: &FileRef,
    download_dir: &Path,
    force: bool,
    chunk_size: usize,
) -> Result<PathBuf, CanvasDataError> {
    let target = fragment_path(download_dir, &file.filename)?;
    if !force && tokio::fs::try_exists(&target).await? {
        debug!("Not downloading {} because it already exists", target.display());
        return Ok(target);
    }

    let url = Url::parse(&file.url).map_err(|e| {
        CanvasDataError::InvalidArgument(format!("bad URL for {}: {}", file.filename, e))
    })?;
    debug!("Downloading {}", target.display());

    let response = fetcher.get_stream(&url).await?;
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let part = PartFile::for_target(&target);
    let write_err = |e| CanvasDataError::io_failure(file.url.as_str(), part.path(), e);

    let mut out = BufWriter::with_capacity(
        chunk_size,
        tokio::fs::File::create(part.path()).await.map_err(write_err)?,
    );
    let mut byte_stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(piece) = byte_stream.next().await {
        let chunk = piece?;
        out.write_all(&chunk).await.map_err(write_err)?;
        written += chunk.len() as u64;
    }
    out.flush().await.map_err(write_err)?;
    drop(out);

    part.commit()
        .await
        .map_err(|e| CanvasDataError::io_failure(file.url.as_str(), &target, e))?;
    info!("Downloaded {} ({} bytes)", file.filename, written);
    Ok(target)
}
