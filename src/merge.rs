//! Fragment decompression and concatenation.

use crate::error::CanvasDataError;
use crate::part_file::PartFile;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Decompresses `fragments` in the given order and writes their lines to
/// `destination`, one after another. Runs on the blocking pool.
///
/// # Returns
///
/// The number of lines written.
pub(crate) async fn merge_fragments(
    fragments: Vec<PathBuf>,
    destination: PathBuf,
) -> Result<u64, CanvasDataError> {
    tokio::task::spawn_blocking(move || concatenate_fragments(&fragments, &destination))
        .await
        .map_err(|e| {
            CanvasDataError::IoError(std::io::Error::other(format!("Task join error: {}", e)))
        })?
}

/// Synchronous core of [`merge_fragments`].
///
/// The destination only appears once every fragment has been copied. Errors
/// name the destination along with the fragment being read, or the `.part`
/// staging file when the failure is on the write side.
pub(crate) fn concatenate_fragments(
    fragments: &[PathBuf],
    destination: &Path,
) -> Result<u64, CanvasDataError> {
    let part = PartFile::for_target(destination);
    let staging_err = |e| CanvasDataError::io_failure(part.path(), destination, e);
    let out_file = File::create(part.path()).map_err(staging_err)?;
    let mut out = BufWriter::with_capacity(4 * 1024 * 1024, out_file);

    let mut lines = 0u64;
    let mut line = Vec::new();
    for fragment in fragments {
        let fail = |e| CanvasDataError::io_failure(fragment, destination, e);
        let file = File::open(fragment).map_err(fail)?;
        let mut reader = BufReader::new(MultiGzDecoder::new(BufReader::new(file)));
        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line).map_err(fail)?;
            if n == 0 {
                break;
            }
            out.write_all(&line).map_err(fail)?;
            lines += 1;
        }
    }

    out.flush().map_err(staging_err)?;
    drop(out);
    let part_path = part.path().to_path_buf();
    part.commit_blocking()
        .map_err(|e| CanvasDataError::io_failure(part_path, destination, e))?;
    Ok(lines)
}
