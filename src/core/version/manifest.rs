// ─── Version Catalog ───
// The `version_manifest.json` list of known versions and where their
// descriptors live.

use std::path::Path;

use serde::Deserialize;

use crate::core::error::{ProvisionError, ProvisionResult};

pub const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// Top-level version catalog.
#[derive(Debug, Deserialize)]
pub struct VersionManifest {
    #[serde(default)]
    pub latest: Option<LatestVersions>,
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestVersions {
    pub release: String,
    pub snapshot: String,
}

/// A single entry in the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type", default)]
    pub version_type: Option<String>,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionManifest {
    pub fn load(path: &Path) -> ProvisionResult<Self> {
        let raw = std::fs::read(path).map_err(|e| ProvisionError::io(path, e))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Case-insensitive lookup; the first match wins.
    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id.eq_ignore_ascii_case(id))
    }
}
