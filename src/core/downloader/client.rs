use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

use crate::core::cache::{write_atomic, StagedFile};
use crate::core::error::{ProvisionError, ProvisionResult};

use super::source::{FetchRequest, FetchResponse, RemoteSource};

/// A single file to download with optional SHA-1 for validation.
#[derive(Debug, Clone)]
pub struct DownloadEntry {
    pub url: String,
    pub dest: PathBuf,
    pub sha1: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// New content was written to the destination.
    Changed,
    /// The local copy was kept.
    Unchanged,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub changed: usize,
    pub unchanged: usize,
    pub failed: Vec<(DownloadEntry, ProvisionError)>,
}

/// Download-if-changed fetcher with SHA-1 validation, conditional requests,
/// bounded retries and atomic writes.
pub struct Downloader {
    source: Arc<dyn RemoteSource>,
    /// Maximum number of parallel downloads.
    concurrency: usize,
    retries: u32,
    retry_delay: Duration,
    offline: bool,
    /// Keep an existing local copy when the remote stays unreachable.
    stale_fallback: bool,
}

impl Downloader {
    pub fn new(source: Arc<dyn RemoteSource>) -> Self {
        Self {
            source,
            concurrency: 8,
            retries: 3,
            retry_delay: Duration::from_millis(500),
            offline: false,
            stale_fallback: true,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn with_stale_fallback(mut self, allow: bool) -> Self {
        self.stale_fallback = allow;
        self
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    // ── Single file ─────────────────────────────────────

    /// Fetch `url` to `dest` only when the remote content differs from the
    /// local copy, or there is no local copy.
    pub async fn download_if_changed(
        &self,
        url: &str,
        dest: &Path,
        sha1_expected: Option<&str>,
    ) -> ProvisionResult<FetchOutcome> {
        let local = dest.is_file();

        if self.offline {
            if local {
                debug!("Offline, using cached {:?}", dest);
                return Ok(FetchOutcome::Unchanged);
            }
            return Err(ProvisionError::MissingArtifact {
                what: url.to_string(),
                path: dest.to_path_buf(),
            });
        }

        if local {
            if let Some(expected) = sha1_expected {
                if Self::validate_sha1(dest, expected).await? {
                    debug!("Up to date by SHA-1: {:?}", dest);
                    return Ok(FetchOutcome::Unchanged);
                }
            }
        }

        let mut request = FetchRequest::new(url);
        if local && sha1_expected.is_none() {
            request.etag = read_etag(dest).await;
            request.if_modified_since = local_mtime(dest);
        }

        // Reaching the network with an expected SHA-1 means the local copy
        // failed it, so it is no fallback.
        let fallback = local && sha1_expected.is_none();
        let response = match self.fetch_with_retry(&request).await {
            Ok(r) => r,
            Err(e) if e.is_transient() && self.stale_fallback && fallback => {
                warn!("{} unreachable ({}), keeping stale copy {:?}", url, e, dest);
                return Ok(FetchOutcome::Unchanged);
            }
            Err(e) => return Err(e),
        };

        match response {
            FetchResponse::NotModified => {
                debug!("Not modified: {:?}", dest);
                Ok(FetchOutcome::Unchanged)
            }
            FetchResponse::Body {
                bytes,
                etag,
                last_modified,
            } => {
                // Validate SHA-1 before anything touches the destination
                if let Some(expected) = sha1_expected {
                    let actual = sha1_hex(&bytes);
                    if actual != expected {
                        return Err(ProvisionError::Sha1Mismatch {
                            path: dest.to_path_buf(),
                            expected: expected.to_string(),
                            actual,
                        });
                    }
                }

                write_staged(dest, &bytes, last_modified).await?;
                let sidecar = etag_path(dest);
                match etag {
                    Some(tag) => write_atomic(&sidecar, tag.as_bytes())?,
                    None => {
                        let _ = tokio::fs::remove_file(&sidecar).await;
                    }
                }

                debug!("Downloaded: {} -> {:?}", url, dest);
                Ok(FetchOutcome::Changed)
            }
        }
    }

    async fn fetch_with_retry(&self, request: &FetchRequest) -> ProvisionResult<FetchResponse> {
        let mut attempt = 0u32;
        loop {
            match self.source.fetch(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "Fetching {} failed ({}), retry {}/{}",
                        request.url, e, attempt, self.retries
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ── Batch concurrent downloads ──────────────────────

    /// Download many files concurrently using `buffer_unordered`.
    pub async fn download_batch(&self, entries: Vec<DownloadEntry>) -> BatchReport {
        info!(
            "Starting batch download: {} files, concurrency={}",
            entries.len(),
            self.concurrency
        );

        let results: Vec<_> = stream::iter(entries)
            .map(|entry| async move {
                let result = self
                    .download_if_changed(&entry.url, &entry.dest, entry.sha1.as_deref())
                    .await;
                (entry, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (entry, result) in results {
            match result {
                Ok(FetchOutcome::Changed) => report.changed += 1,
                Ok(FetchOutcome::Unchanged) => report.unchanged += 1,
                Err(e) => report.failed.push((entry, e)),
            }
        }
        report
    }

    /// Validate an existing file's SHA-1.
    pub async fn validate_sha1(path: &Path, expected: &str) -> ProvisionResult<bool> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ProvisionError::io(path, e))?;
        Ok(sha1_hex(&bytes) == expected)
    }
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn etag_path(dest: &Path) -> PathBuf {
    let mut s = dest.as_os_str().to_owned();
    s.push(".etag");
    PathBuf::from(s)
}

async fn read_etag(dest: &Path) -> Option<String> {
    tokio::fs::read_to_string(etag_path(dest))
        .await
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn local_mtime(dest: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(dest)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

async fn write_staged(
    dest: &Path,
    bytes: &[u8],
    last_modified: Option<DateTime<Utc>>,
) -> ProvisionResult<()> {
    let staged = StagedFile::new(dest)?;
    // Write inside a block so the handle is closed before the rename
    {
        tokio::fs::write(staged.path(), bytes)
            .await
            .map_err(|e| ProvisionError::io(staged.path(), e))?;
    }
    if let Some(t) = last_modified {
        let stamped = std::fs::File::options()
            .write(true)
            .open(staged.path())
            .and_then(|f| f.set_modified(t.into()));
        if let Err(e) = stamped {
            debug!("Could not stamp mtime on {:?}: {}", dest, e);
        }
    }
    staged.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::FakeSource;

    const URL: &str = "https://example.test/client.jar";

    fn downloader(source: &Arc<FakeSource>) -> Downloader {
        Downloader::new(source.clone()).with_retries(2, Duration::ZERO)
    }

    #[tokio::test]
    async fn conditional_request_reports_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("client.jar");
        let source = Arc::new(FakeSource::new());
        source.serve(URL, b"jar-bytes".to_vec());
        let d = downloader(&source);

        assert_eq!(d.download_if_changed(URL, &dest, None).await.unwrap(), FetchOutcome::Changed);
        assert_eq!(d.download_if_changed(URL, &dest, None).await.unwrap(), FetchOutcome::Unchanged);
        assert_eq!(source.calls(), 2);
        assert_eq!(std::fs::read(&dest).unwrap(), b"jar-bytes");
    }

    #[tokio::test]
    async fn matching_sha1_skips_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("client.jar");
        let source = Arc::new(FakeSource::new());
        source.serve(URL, b"jar-bytes".to_vec());
        let sha = sha1_hex(b"jar-bytes");
        let d = downloader(&source);

        d.download_if_changed(URL, &dest, Some(&sha)).await.unwrap();
        let again = d.download_if_changed(URL, &dest, Some(&sha)).await.unwrap();
        assert_eq!(again, FetchOutcome::Unchanged);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn sha1_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("client.jar");
        let source = Arc::new(FakeSource::new());
        source.serve(URL, b"tampered".to_vec());

        let err = downloader(&source)
            .download_if_changed(URL, &dest, Some(&sha1_hex(b"original")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Sha1Mismatch { .. }));
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn offline_never_touches_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("client.jar");
        let source = Arc::new(FakeSource::new());
        let d = downloader(&source).with_offline(true);

        let err = d.download_if_changed(URL, &dest, None).await.unwrap_err();
        assert!(matches!(err, ProvisionError::MissingArtifact { .. }));

        std::fs::write(&dest, b"cached").unwrap();
        assert_eq!(d.download_if_changed(URL, &dest, None).await.unwrap(), FetchOutcome::Unchanged);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("client.jar");
        let source = Arc::new(FakeSource::new());
        source.serve(URL, b"ok".to_vec());
        source.fail_next(URL, 2);

        let outcome = downloader(&source).download_if_changed(URL, &dest, None).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Changed);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn stale_copy_survives_an_outage() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("client.jar");
        std::fs::write(&dest, b"old").unwrap();
        let source = Arc::new(FakeSource::new());
        source.serve(URL, b"new".to_vec());
        source.fail_next(URL, 10);

        let d = downloader(&source);
        assert_eq!(d.download_if_changed(URL, &dest, None).await.unwrap(), FetchOutcome::Unchanged);
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");

        let strict = downloader(&source).with_stale_fallback(false);
        let err = strict.download_if_changed(URL, &dest, None).await.unwrap_err();
        assert!(matches!(err, ProvisionError::NetworkFailure { .. }));
    }

    #[tokio::test]
    async fn copy_failing_its_sha1_is_not_a_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("client.jar");
        std::fs::write(&dest, b"truncated garbage").unwrap();
        let source = Arc::new(FakeSource::new());
        source.serve(URL, b"good".to_vec());
        source.fail_next(URL, 10);

        let err = downloader(&source)
            .download_if_changed(URL, &dest, Some(&sha1_hex(b"good")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::NetworkFailure { .. }));
        assert_eq!(std::fs::read(&dest).unwrap(), b"truncated garbage");
    }

    #[tokio::test]
    async fn missing_remote_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new());
        let err = downloader(&source)
            .download_if_changed(URL, &dir.path().join("x.jar"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::DownloadFailed { status: 404, .. }));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn batch_reports_each_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new());
        source.serve("https://example.test/a", b"a".to_vec());
        source.serve("https://example.test/b", b"b".to_vec());
        let entry = |name: &str| DownloadEntry {
            url: format!("https://example.test/{name}"),
            dest: dir.path().join(name),
            sha1: None,
            size: None,
        };

        let report = downloader(&source)
            .with_concurrency(2)
            .download_batch(vec![entry("a"), entry("b"), entry("missing")])
            .await;
        assert_eq!(report.changed, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.url, "https://example.test/missing");
    }
}
