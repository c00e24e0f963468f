use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One of the two distributable variants that get merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Client,
    Server,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Client, Side::Server];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Client => "client",
            Side::Server => "server",
        }
    }

    /// Constant name of the side in `EnvType`.
    pub fn env_type(&self) -> &'static str {
        match self {
            Side::Client => "CLIENT",
            Side::Server => "SERVER",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a cached jar holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactRole {
    ClientRaw,
    ServerRaw,
    ClientRemapped,
    ServerRemapped,
    /// Patched but still in the intermediate symbol space.
    ClientRemappedPatched,
    ServerRemappedPatched,
    ClientPatched,
    ServerPatched,
    Merged,
}

impl ArtifactRole {
    pub fn raw(side: Side) -> Self {
        match side {
            Side::Client => ArtifactRole::ClientRaw,
            Side::Server => ArtifactRole::ServerRaw,
        }
    }

    pub fn remapped(side: Side) -> Self {
        match side {
            Side::Client => ArtifactRole::ClientRemapped,
            Side::Server => ArtifactRole::ServerRemapped,
        }
    }

    pub fn remapped_patched(side: Side) -> Self {
        match side {
            Side::Client => ArtifactRole::ClientRemappedPatched,
            Side::Server => ArtifactRole::ServerRemappedPatched,
        }
    }

    pub fn patched(side: Side) -> Self {
        match side {
            Side::Client => ArtifactRole::ClientPatched,
            Side::Server => ArtifactRole::ServerPatched,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            ArtifactRole::ClientRaw => "client",
            ArtifactRole::ServerRaw => "server",
            ArtifactRole::ClientRemapped => "client-remapped",
            ArtifactRole::ServerRemapped => "server-remapped",
            ArtifactRole::ClientRemappedPatched => "client-remapped-patched",
            ArtifactRole::ServerRemappedPatched => "server-remapped-patched",
            ArtifactRole::ClientPatched => "client-patched",
            ArtifactRole::ServerPatched => "server-patched",
            ArtifactRole::Merged => "merged",
        }
    }

    /// Patched variants and the merged jar depend on the patch profile; raw
    /// and remapped variants are shared by every profile.
    pub fn is_profile_scoped(&self) -> bool {
        matches!(
            self,
            ArtifactRole::ClientRemappedPatched
                | ArtifactRole::ServerRemappedPatched
                | ArtifactRole::ClientPatched
                | ArtifactRole::ServerPatched
                | ArtifactRole::Merged
        )
    }
}

/// A file in the cache with the version and role it was produced for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub path: PathBuf,
    pub version: String,
    pub role: ArtifactRole,
}

impl CachedArtifact {
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// Flat cache directory layout.
///
/// ```text
/// <root>/version_manifest.json
/// <root>/minecraft-1.20-info.json
/// <root>/minecraft-1.20-client.jar
/// <root>/minecraft-1.20-forge-client-patched.jar
/// <root>/minecraft-1.20-forge-merged.jar
/// <root>/libraries/<maven path>
/// ```
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
    kind: String,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>, kind: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            kind: kind.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join("version_manifest.json")
    }

    pub fn version_info_path(&self, version: &str) -> PathBuf {
        self.root.join(format!("{}-{}-info.json", self.kind, version))
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.root.join("libraries")
    }

    pub fn artifact_path(&self, version: &str, profile: Option<&str>, role: ArtifactRole) -> PathBuf {
        let name = match profile.filter(|_| role.is_profile_scoped()) {
            Some(p) => format!("{}-{}-{}-{}.jar", self.kind, version, p, role.suffix()),
            None => format!("{}-{}-{}.jar", self.kind, version, role.suffix()),
        };
        self.root.join(name)
    }

    pub fn artifact(&self, version: &str, profile: Option<&str>, role: ArtifactRole) -> CachedArtifact {
        CachedArtifact {
            path: self.artifact_path(version, profile, role),
            version: version.to_string(),
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_suffix_only_on_profile_scoped_roles() {
        let layout = CacheLayout::new("/cache", "minecraft");
        assert_eq!(
            layout.artifact_path("1.20", Some("forge"), ArtifactRole::ClientRaw),
            PathBuf::from("/cache/minecraft-1.20-client.jar")
        );
        assert_eq!(
            layout.artifact_path("1.20", Some("forge"), ArtifactRole::ServerRemapped),
            PathBuf::from("/cache/minecraft-1.20-server-remapped.jar")
        );
        assert_eq!(
            layout.artifact_path("1.20", Some("forge"), ArtifactRole::ClientPatched),
            PathBuf::from("/cache/minecraft-1.20-forge-client-patched.jar")
        );
        assert_eq!(
            layout.artifact_path("1.20", Some("forge"), ArtifactRole::Merged),
            PathBuf::from("/cache/minecraft-1.20-forge-merged.jar")
        );
        assert_eq!(
            layout.artifact_path("1.20", None, ArtifactRole::Merged),
            PathBuf::from("/cache/minecraft-1.20-merged.jar")
        );
    }

    #[test]
    fn fixed_metadata_paths() {
        let layout = CacheLayout::new("/cache", "minecraft");
        assert_eq!(
            layout.catalog_path(),
            PathBuf::from("/cache/version_manifest.json")
        );
        assert_eq!(
            layout.version_info_path("1.20"),
            PathBuf::from("/cache/minecraft-1.20-info.json")
        );
    }
}
