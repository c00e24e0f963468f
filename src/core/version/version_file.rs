// ─── Version Info ───
// Parses a per-version JSON into the download descriptor and evaluates OS
// rules for libraries.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::core::error::{ProvisionError, ProvisionResult};

/// A parsed per-version JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub id: String,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default)]
    pub downloads: BTreeMap<String, DownloadArtifact>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadArtifact {
    pub sha1: Option<String>,
    pub size: Option<u64>,
    pub url: String,
}

/// Where to get one named part of a version, and what it should hash to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRef {
    pub url: String,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

/// Resolved download descriptor for a version. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDescriptor {
    pub id: String,
    pub parts: BTreeMap<String, PartRef>,
}

impl VersionDescriptor {
    pub fn part(&self, name: &str) -> Option<&PartRef> {
        self.parts.get(name)
    }
}

impl VersionInfo {
    pub fn load(path: &Path) -> ProvisionResult<Self> {
        let raw = std::fs::read(path).map_err(|e| ProvisionError::io(path, e))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn descriptor(&self) -> VersionDescriptor {
        VersionDescriptor {
            id: self.id.clone(),
            parts: self
                .downloads
                .iter()
                .map(|(name, d)| {
                    (
                        name.clone(),
                        PartRef {
                            url: d.url.clone(),
                            sha1: d.sha1.clone(),
                            size: d.size,
                        },
                    )
                })
                .collect(),
        }
    }
}

// ─── Library Entry with Rules ───

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    /// Maven repository base, for entries without explicit downloads.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub rules: Option<Vec<LibraryRule>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryDownloads {
    pub artifact: Option<LibDownloadArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibDownloadArtifact {
    pub path: String,
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryRule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
}

impl LibraryEntry {
    pub fn is_allowed_for_current_os(&self) -> bool {
        self.is_allowed_for(current_os_name())
    }

    /// No rules means allowed. Otherwise start disallowed and let every
    /// rule whose OS matches set the state; the last match wins.
    pub fn is_allowed_for(&self, os: &str) -> bool {
        let Some(rules) = &self.rules else {
            return true;
        };

        let mut allowed = false;
        for rule in rules {
            let os_matches = match rule.os.as_ref().and_then(|o| o.name.as_deref()) {
                None => true,
                Some(name) => name == os,
            };
            if os_matches {
                allowed = rule.action == RuleAction::Allow;
            }
        }
        allowed
    }
}

/// The OS name used by version rules for the current platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}
