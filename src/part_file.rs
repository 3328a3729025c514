//! Write-then-rename helper for downloaded and reassembled files.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// A `<target>.part` sibling that is renamed over the target on success and
/// removed when dropped uncommitted, so a failed write never leaves a
/// truncated file under the target name.
#[derive(Debug)]
pub(crate) struct PartFile {
    path: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl PartFile {
    pub(crate) fn for_target(target: &Path) -> Self {
        let mut name = target
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("output"));
        name.push(".part");
        Self {
            path: target.with_file_name(name),
            target: target.to_path_buf(),
            committed: false,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn commit(mut self) -> io::Result<()> {
        tokio::fs::rename(&self.path, &self.target).await?;
        self.committed = true;
        Ok(())
    }

    pub(crate) fn commit_blocking(mut self) -> io::Result<()> {
        std::fs::rename(&self.path, &self.target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
