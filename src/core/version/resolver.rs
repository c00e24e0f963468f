// ─── Version Resolver ───
// Version id → download descriptor, trusting the local cache when offline
// or when the cached descriptor has not changed since it was last seen.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::cache::{CacheLayout, FingerprintCache};
use crate::core::downloader::Downloader;
use crate::core::error::{ProvisionError, ProvisionResult};

use super::manifest::VersionManifest;
use super::version_file::{VersionDescriptor, VersionInfo};

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions<'a> {
    /// Descriptor URL that replaces the catalog lookup entirely.
    pub custom_manifest: Option<&'a str>,
    pub offline: bool,
    pub refresh: bool,
}

#[derive(Debug, Clone)]
pub struct ResolvedVersion {
    pub descriptor: VersionDescriptor,
    pub info: VersionInfo,
    /// Whether the network was consulted.
    pub refreshed: bool,
}

pub struct ManifestResolver {
    downloader: Arc<Downloader>,
    layout: CacheLayout,
    catalog_url: String,
    fingerprints: Mutex<FingerprintCache>,
}

impl ManifestResolver {
    pub fn new(downloader: Arc<Downloader>, layout: CacheLayout, catalog_url: impl Into<String>) -> Self {
        Self {
            downloader,
            layout,
            catalog_url: catalog_url.into(),
            fingerprints: Mutex::new(FingerprintCache::new()),
        }
    }

    pub async fn resolve(
        &self,
        version_id: &str,
        options: ResolveOptions<'_>,
    ) -> ProvisionResult<ResolvedVersion> {
        let info_path = self.layout.version_info_path(version_id);

        if options.offline {
            if !info_path.is_file() {
                return Err(ProvisionError::MissingArtifact {
                    what: format!("version descriptor for {version_id}"),
                    path: info_path,
                });
            }
            debug!("Offline, using cached descriptor {:?}", info_path);
            return Self::cached(&info_path, false);
        }

        let mut fingerprints = self.fingerprints.lock().await;

        if !options.refresh && info_path.is_file() && !fingerprints.has_changed(&info_path)? {
            debug!("Cached descriptor for {} unchanged", version_id);
            return Self::cached(&info_path, false);
        }

        let (url, sha1) = match options.custom_manifest {
            Some(url) => {
                info!("Using custom manifest {} for {}", url, version_id);
                (url.to_string(), None)
            }
            None => {
                let catalog_path = self.layout.catalog_path();
                self.downloader
                    .download_if_changed(&self.catalog_url, &catalog_path, None)
                    .await?;
                let catalog = VersionManifest::load(&catalog_path)?;
                let entry = catalog
                    .find_version(version_id)
                    .ok_or_else(|| ProvisionError::UnknownVersion(version_id.to_string()))?;
                (entry.url.clone(), entry.sha1.clone())
            }
        };

        self.downloader
            .download_if_changed(&url, &info_path, sha1.as_deref())
            .await?;
        fingerprints.observe(&info_path)?;

        info!("Resolved version {}", version_id);
        Self::cached(&info_path, true)
    }

    fn cached(path: &std::path::Path, refreshed: bool) -> ProvisionResult<ResolvedVersion> {
        let info = VersionInfo::load(path)?;
        Ok(ResolvedVersion {
            descriptor: info.descriptor(),
            info,
            refreshed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::FakeSource;

    const CATALOG: &str = "https://example.test/version_manifest.json";

    fn setup() -> (tempfile::TempDir, Arc<FakeSource>, ManifestResolver) {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new());
        source.serve(
            CATALOG,
            serde_json::to_vec(&serde_json::json!({
                "versions": [{ "id": "1.20", "url": "https://example.test/1.20.json" }]
            }))
            .unwrap(),
        );
        source.serve(
            "https://example.test/1.20.json",
            serde_json::to_vec(&serde_json::json!({
                "id": "1.20",
                "downloads": { "client": { "url": "https://example.test/client.jar" } }
            }))
            .unwrap(),
        );
        let downloader = Arc::new(Downloader::new(source.clone()));
        let layout = CacheLayout::new(dir.path(), "minecraft");
        let resolver = ManifestResolver::new(downloader, layout, CATALOG);
        (dir, source, resolver)
    }

    #[tokio::test]
    async fn second_resolve_makes_no_network_calls() {
        let (dir, source, resolver) = setup();
        let first = resolver.resolve("1.20", ResolveOptions::default()).await.unwrap();
        assert!(first.refreshed);
        assert!(dir.path().join("minecraft-1.20-info.json").is_file());
        let calls = source.calls();

        let second = resolver.resolve("1.20", ResolveOptions::default()).await.unwrap();
        assert!(!second.refreshed);
        assert_eq!(source.calls(), calls);
        assert_eq!(second.descriptor, first.descriptor);
    }

    #[tokio::test]
    async fn refresh_consults_the_network_again() {
        let (_dir, source, resolver) = setup();
        resolver.resolve("1.20", ResolveOptions::default()).await.unwrap();
        let calls = source.calls();
        let options = ResolveOptions {
            refresh: true,
            ..Default::default()
        };
        assert!(resolver.resolve("1.20", options).await.unwrap().refreshed);
        assert!(source.calls() > calls);
    }

    #[tokio::test]
    async fn unknown_version_is_fatal() {
        let (_dir, _source, resolver) = setup();
        let err = resolver
            .resolve("9.99", ResolveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::UnknownVersion(ref v) if v == "9.99"));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn offline_without_cache_is_missing_artifact() {
        let (_dir, source, resolver) = setup();
        let options = ResolveOptions {
            offline: true,
            ..Default::default()
        };
        let err = resolver.resolve("1.20", options).await.unwrap_err();
        assert!(matches!(err, ProvisionError::MissingArtifact { .. }));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn offline_with_cache_ignores_missing_catalog() {
        let (dir, source, resolver) = setup();
        resolver.resolve("1.20", ResolveOptions::default()).await.unwrap();
        std::fs::remove_file(dir.path().join("version_manifest.json")).unwrap();
        let calls = source.calls();

        let options = ResolveOptions {
            offline: true,
            ..Default::default()
        };
        let resolved = resolver.resolve("1.20", options).await.unwrap();
        assert_eq!(resolved.descriptor.id, "1.20");
        assert_eq!(source.calls(), calls);
    }

    #[tokio::test]
    async fn custom_manifest_bypasses_the_catalog() {
        let (_dir, source, resolver) = setup();
        source.serve(
            "https://example.test/custom.json",
            serde_json::to_vec(&serde_json::json!({ "id": "custom", "downloads": {} })).unwrap(),
        );
        let options = ResolveOptions {
            custom_manifest: Some("https://example.test/custom.json"),
            ..Default::default()
        };
        let resolved = resolver.resolve("custom", options).await.unwrap();
        assert_eq!(resolved.descriptor.id, "custom");
        assert!(!source.requested().iter().any(|u| u == CATALOG));
    }
}
