use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use crate::core::error::{ProvisionError, ProvisionResult};

/// What was last seen at a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub sha256: String,
}

impl Fingerprint {
    /// `None` when nothing exists at `path`.
    pub fn of(path: &Path) -> ProvisionResult<Option<Self>> {
        let Some(meta) = metadata(path)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            size: meta.len(),
            modified: meta.modified().ok(),
            sha256: sha256_file(path)?,
        }))
    }
}

/// Path → last observed fingerprint. One per orchestrator instance.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    seen: HashMap<PathBuf, Fingerprint>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `path` differs from what was last observed. A path never
    /// observed, or now missing, counts as changed. A file whose mtime moved
    /// but whose content hash did not is unchanged.
    pub fn has_changed(&mut self, path: &Path) -> ProvisionResult<bool> {
        let Some(meta) = metadata(path)? else {
            return Ok(true);
        };
        let Some(last) = self.seen.get_mut(path) else {
            return Ok(true);
        };
        if last.size != meta.len() {
            return Ok(true);
        }
        let modified = meta.modified().ok();
        if modified == last.modified {
            return Ok(false);
        }
        if sha256_file(path)? == last.sha256 {
            last.modified = modified;
            return Ok(false);
        }
        Ok(true)
    }

    /// Record the current state of `path`.
    pub fn observe(&mut self, path: &Path) -> ProvisionResult<()> {
        match Fingerprint::of(path)? {
            Some(fp) => {
                self.seen.insert(path.to_path_buf(), fp);
            }
            None => {
                self.seen.remove(path);
            }
        }
        Ok(())
    }

    pub fn get(&self, path: &Path) -> Option<&Fingerprint> {
        self.seen.get(path)
    }
}

fn metadata(path: &Path) -> ProvisionResult<Option<std::fs::Metadata>> {
    match std::fs::metadata(path) {
        Ok(m) if m.is_file() => Ok(Some(m)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ProvisionError::io(path, e)),
    }
}

pub fn sha256_file(path: &Path) -> ProvisionResult<String> {
    let mut file = File::open(path).map_err(|e| ProvisionError::io(path, e))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| ProvisionError::io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}
