// ─── Libraries ───
// Fetches the libraries a version declares so they can serve as the
// inheritance classpath during remapping.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::downloader::{DownloadEntry, Downloader};
use crate::core::error::{ProvisionError, ProvisionResult};

use super::version_file::{LibraryEntry, VersionInfo};

pub const DEFAULT_LIBRARY_REPO: &str = "https://libraries.minecraft.net/";

/// `group:artifact:version[:classifier][@extension]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavenCoordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub classifier: Option<String>,
    pub extension: String,
}

impl MavenCoordinate {
    pub fn parse(coord: &str) -> ProvisionResult<Self> {
        let (body, extension) = match coord.rsplit_once('@') {
            Some((body, ext)) => (body, ext),
            None => (coord, "jar"),
        };
        let parts: Vec<&str> = body.split(':').collect();
        if !(3..=4).contains(&parts.len()) || parts.iter().any(|p| p.is_empty()) {
            return Err(ProvisionError::InvalidMavenCoordinate(coord.to_string()));
        }
        Ok(Self {
            group: parts[0].to_string(),
            artifact: parts[1].to_string(),
            version: parts[2].to_string(),
            classifier: parts.get(3).map(|c| c.to_string()),
            extension: extension.to_string(),
        })
    }

    /// Repository-relative path, always `/`-separated.
    pub fn relative_path(&self) -> String {
        let file = match &self.classifier {
            Some(c) => format!("{}-{}-{}.{}", self.artifact, self.version, c, self.extension),
            None => format!("{}-{}.{}", self.artifact, self.version, self.extension),
        };
        format!(
            "{}/{}/{}/{}",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            file
        )
    }

    pub fn url(&self, repo: &str) -> String {
        format!("{}/{}", repo.trim_end_matches('/'), self.relative_path())
    }
}

pub struct LibraryProvider {
    downloader: Arc<Downloader>,
    libraries_dir: PathBuf,
}

impl LibraryProvider {
    pub fn new(downloader: Arc<Downloader>, libraries_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloader,
            libraries_dir: libraries_dir.into(),
        }
    }

    pub fn libraries_dir(&self) -> &Path {
        &self.libraries_dir
    }

    /// Download entries for every library allowed on this OS, in declaration
    /// order.
    pub fn entries(&self, info: &VersionInfo) -> ProvisionResult<Vec<DownloadEntry>> {
        info.libraries
            .iter()
            .filter(|lib| {
                let allowed = lib.is_allowed_for_current_os();
                if !allowed {
                    debug!("Skipping {} (OS rules)", lib.name);
                }
                allowed
            })
            .map(|lib| self.entry(lib))
            .collect()
    }

    fn entry(&self, lib: &LibraryEntry) -> ProvisionResult<DownloadEntry> {
        if let Some(artifact) = lib.downloads.as_ref().and_then(|d| d.artifact.as_ref()) {
            return Ok(DownloadEntry {
                url: artifact.url.clone(),
                dest: self.libraries_dir.join(&artifact.path),
                sha1: artifact.sha1.clone(),
                size: artifact.size,
            });
        }
        let coord = MavenCoordinate::parse(&lib.name)?;
        let repo = lib.url.as_deref().unwrap_or(DEFAULT_LIBRARY_REPO);
        Ok(DownloadEntry {
            url: coord.url(repo),
            dest: self.libraries_dir.join(coord.relative_path()),
            sha1: None,
            size: None,
        })
    }

    /// Ensure the version's libraries are on disk and return their paths.
    /// Offline, only libraries already present are returned.
    pub async fn provide(&self, info: &VersionInfo) -> ProvisionResult<Vec<PathBuf>> {
        let entries = self.entries(info)?;
        let paths: Vec<PathBuf> = entries.iter().map(|e| e.dest.clone()).collect();

        if self.downloader.is_offline() {
            let present: Vec<PathBuf> = paths
                .into_iter()
                .filter(|p| {
                    let ok = p.is_file();
                    if !ok {
                        warn!("Offline, library missing from cache: {:?}", p);
                    }
                    ok
                })
                .collect();
            return Ok(present);
        }

        let report = self.downloader.download_batch(entries).await;
        if let Some((entry, err)) = report.failed.into_iter().next() {
            warn!("Library download failed: {}", entry.url);
            return Err(err);
        }
        info!(
            "Libraries ready for {}: {} fetched, {} cached",
            info.id, report.changed, report.unchanged
        );
        Ok(paths)
    }
}
