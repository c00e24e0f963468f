use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::core::error::{ProvisionError, ProvisionResult};

/// Temp file next to its destination, renamed into place on [`commit`].
/// Dropped without committing, the temp file is removed.
///
/// [`commit`]: StagedFile::commit
#[derive(Debug)]
pub struct StagedFile {
    dest: PathBuf,
    temp: PathBuf,
    committed: bool,
}

impl StagedFile {
    pub fn new(dest: &Path) -> ProvisionResult<Self> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProvisionError::io(parent, e))?;
        }
        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ProvisionError::Other(format!("{dest:?} has no file name")))?;
        let temp = dest.with_file_name(format!("{}.{}.tmp", file_name, Uuid::new_v4().simple()));
        Ok(Self {
            dest: dest.to_path_buf(),
            temp,
            committed: false,
        })
    }

    /// Where to write.
    pub fn path(&self) -> &Path {
        &self.temp
    }

    pub fn destination(&self) -> &Path {
        &self.dest
    }

    /// Atomically replace the destination with the staged content.
    pub fn commit(mut self) -> ProvisionResult<PathBuf> {
        std::fs::rename(&self.temp, &self.dest).map_err(|e| ProvisionError::io(&self.dest, e))?;
        self.committed = true;
        debug!("Committed {:?}", self.dest);
        Ok(std::mem::take(&mut self.dest))
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed && self.temp.exists() {
            let _ = std::fs::remove_file(&self.temp);
        }
    }
}

/// Write `bytes` to `dest` through a staged temp file.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> ProvisionResult<()> {
    let staged = StagedFile::new(dest)?;
    std::fs::write(staged.path(), bytes).map_err(|e| ProvisionError::io(staged.path(), e))?;
    staged.commit()?;
    Ok(())
}
