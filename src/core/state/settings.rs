use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{ProvisionError, ProvisionResult};
use crate::core::merge::MergeStrategy;
use crate::core::version::VERSION_MANIFEST_URL;
use crate::core::worker::ExternalTool;

const CACHE_DIR_NAME: &str = "jarloom";
pub const SETTINGS_FILE: &str = "jarloom.json";

/// Optional patch/remap stages and the merge algorithm they feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchProfile {
    /// Suffix of every profile-scoped artifact.
    pub name: String,
    /// TSRG table from public names to the patch symbol space.
    pub mappings: PathBuf,
    #[serde(default)]
    pub client_patches: Option<PathBuf>,
    #[serde(default)]
    pub server_patches: Option<PathBuf>,
    /// Archives overlaid onto the patched intermediates.
    #[serde(default)]
    pub inject: Vec<PathBuf>,
    #[serde(default)]
    pub strict_remap: bool,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionSettings {
    pub cache_dir: PathBuf,
    pub artifact_kind: String,
    pub manifest_url: String,
    /// Version descriptor URL used instead of the catalog.
    pub custom_manifest: Option<String>,
    pub offline: bool,
    pub refresh: bool,
    pub download_concurrency: usize,
    pub download_retries: u32,
    pub worker_threads: usize,
    pub synthetic_params_offset: bool,
    pub transform_log_config: Option<PathBuf>,
    pub external_tools: BTreeMap<String, ExternalTool>,
    pub patch_profile: Option<PatchProfile>,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            artifact_kind: "minecraft".to_string(),
            manifest_url: VERSION_MANIFEST_URL.to_string(),
            custom_manifest: None,
            offline: false,
            refresh: false,
            download_concurrency: 4,
            download_retries: 3,
            worker_threads: 2,
            synthetic_params_offset: true,
            transform_log_config: None,
            external_tools: BTreeMap::new(),
            patch_profile: None,
        }
    }
}

impl ProvisionSettings {
    pub fn load(path: &Path) -> ProvisionResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ProvisionError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Settings at `path`, or the defaults when there is no file yet.
    pub fn load_or_default(path: &Path) -> ProvisionResult<Self> {
        if !path.exists() {
            debug!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> ProvisionResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProvisionError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| ProvisionError::io(path, e))
    }

    pub fn profile_name(&self) -> Option<&str> {
        self.patch_profile.as_ref().map(|p| p.name.as_str())
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CACHE_DIR_NAME)
}
