// ─── Provisioner ───
// ResolveManifest → Fetch → [RemapForward → Patch → CopyMissing → Inject →
// RemapReverse] → Merge → Done
//
// Every stage is guarded by "output exists and no refresh requested".
// A corrupt merge input purges every artifact of the run; any other failure
// only discards the output of the failing stage. Patch, CopyMissing and
// Inject build the intermediate jar together and commit it once.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::core::cache::layout::Side;
use crate::core::cache::{ArtifactRole, CacheLayout, StagedFile};
use crate::core::downloader::{Downloader, HttpSource, RemoteSource};
use crate::core::error::{ProvisionError, ProvisionResult};
use crate::core::mappings::MappingTable;
use crate::core::merge::MergeStrategy;
use crate::core::patch::PatchSet;
use crate::core::remap::RemapDirection;
use crate::core::state::{PatchProfile, ProvisionSettings};
use crate::core::version::{LibraryProvider, ManifestResolver, ResolveOptions, VersionInfo};
use crate::core::worker::{MergePlan, TransformKind, TransformOutcome, TransformRequest, WorkerPool};

use super::run::{PipelineRun, Stage, StageOutcome};

const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Inputs of the patch stages that are only loaded when a stage actually runs.
#[derive(Default)]
struct PatchInputs {
    mappings: Option<Arc<MappingTable>>,
    classpath: Option<Vec<PathBuf>>,
}

pub struct Provisioner {
    settings: ProvisionSettings,
    layout: CacheLayout,
    downloader: Arc<Downloader>,
    resolver: ManifestResolver,
    libraries: LibraryProvider,
    workers: WorkerPool,
}

impl Provisioner {
    pub fn new(settings: ProvisionSettings) -> ProvisionResult<Self> {
        Ok(Self::with_source(settings, Arc::new(HttpSource::new()?)))
    }

    pub fn with_source(settings: ProvisionSettings, source: Arc<dyn RemoteSource>) -> Self {
        let layout = CacheLayout::new(&settings.cache_dir, &settings.artifact_kind);
        let downloader = Arc::new(
            Downloader::new(source)
                .with_concurrency(settings.download_concurrency)
                .with_retries(settings.download_retries, RETRY_DELAY)
                .with_offline(settings.offline),
        );
        let resolver = ManifestResolver::new(
            downloader.clone(),
            layout.clone(),
            settings.manifest_url.clone(),
        );
        let libraries = LibraryProvider::new(downloader.clone(), layout.libraries_dir());
        let workers = WorkerPool::new(settings.worker_threads);
        Self {
            settings,
            layout,
            downloader,
            resolver,
            libraries,
            workers,
        }
    }

    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Produce the merged artifact for `version`, running only the stages
    /// whose output is missing (or all of them under refresh).
    pub async fn provide(&self, version: &str) -> ProvisionResult<PipelineRun> {
        info!(
            ":providing {} (profile: {})",
            version,
            self.settings.profile_name().unwrap_or("none")
        );
        let run = PipelineRun::new(
            &self.layout,
            version,
            self.settings.profile_name().map(str::to_owned),
            self.settings.offline,
            self.settings.refresh,
        );

        let (run, info) = self.resolve(run).await?;
        let run = self.fetch(run).await?;
        let run = match &self.settings.patch_profile {
            Some(profile) => self.patch(run, profile, &info).await?,
            None => run,
        };
        let run = self.merge(run).await?;

        info!(
            "Provided {} ({} stages ran)",
            version,
            run.executed().len()
        );
        Ok(run.finish())
    }

    /// Run a configured external tool through the worker pool.
    pub async fn run_tool(
        &self,
        name: &str,
        input: &Path,
        output: &Path,
        extra_inputs: Vec<PathBuf>,
        classpath: Vec<PathBuf>,
    ) -> ProvisionResult<TransformOutcome> {
        let tool = self
            .settings
            .external_tools
            .get(name)
            .cloned()
            .ok_or_else(|| ProvisionError::Transform(format!("no external tool named {name}")))?;
        let request = TransformRequest::new(TransformKind::External { tool, extra_inputs }, input, output)
            .with_classpath(classpath)
            .with_log_config(self.settings.transform_log_config.clone());
        self.workers.run(request).await
    }

    // ── Stages ──────────────────────────────────────────

    async fn resolve(&self, run: PipelineRun) -> ProvisionResult<(PipelineRun, VersionInfo)> {
        let started = Instant::now();
        let resolved = self
            .resolver
            .resolve(
                &run.version,
                ResolveOptions {
                    custom_manifest: self.settings.custom_manifest.as_deref(),
                    offline: run.offline,
                    refresh: run.refresh,
                },
            )
            .await?;
        let outcome = if resolved.refreshed {
            StageOutcome::Ran(started.elapsed())
        } else {
            StageOutcome::Skipped
        };
        let run = run
            .with_descriptor(resolved.descriptor)
            .record(Stage::ResolveManifest, None, outcome);
        Ok((run, resolved.info))
    }

    async fn fetch(&self, run: PipelineRun) -> ProvisionResult<PipelineRun> {
        let (client, server) = tokio::try_join!(
            self.fetch_side(&run, Side::Client),
            self.fetch_side(&run, Side::Server)
        )?;
        Ok(run
            .record(Stage::Fetch, Some(Side::Client), client)
            .record(Stage::Fetch, Some(Side::Server), server))
    }

    async fn fetch_side(&self, run: &PipelineRun, side: Side) -> ProvisionResult<StageOutcome> {
        let dest = self.path(run, ArtifactRole::raw(side));
        if self.is_fresh(run, &dest) {
            debug!("Skipping fetch of {} jar, {:?} exists", side, dest);
            return Ok(StageOutcome::Skipped);
        }
        let part = run
            .descriptor
            .as_ref()
            .and_then(|d| d.part(side.as_str()))
            .ok_or_else(|| ProvisionError::MissingArtifact {
                what: format!("{} download for {}", side, run.version),
                path: dest.clone(),
            })?;

        info!(":fetching {} jar for {}", side, run.version);
        let started = Instant::now();
        self.downloader
            .download_if_changed(&part.url, &dest, part.sha1.as_deref())
            .await?;
        Ok(StageOutcome::Ran(started.elapsed()))
    }

    async fn patch(
        &self,
        mut run: PipelineRun,
        profile: &PatchProfile,
        info: &VersionInfo,
    ) -> ProvisionResult<PipelineRun> {
        let mut inputs = PatchInputs::default();
        for side in Side::BOTH {
            run = self.patch_side(run, profile, info, side, &mut inputs).await?;
        }
        Ok(run)
    }

    async fn patch_side(
        &self,
        mut run: PipelineRun,
        profile: &PatchProfile,
        info: &VersionInfo,
        side: Side,
        inputs: &mut PatchInputs,
    ) -> ProvisionResult<PipelineRun> {
        let raw = self.path(&run, ArtifactRole::raw(side));
        let remapped = self.path(&run, ArtifactRole::remapped(side));
        let intermediate = self.path(&run, ArtifactRole::remapped_patched(side));
        let patched = self.path(&run, ArtifactRole::patched(side));

        // Remap into the patch symbol space
        run = if self.is_fresh(&run, &remapped) {
            skip(run, Stage::RemapForward, side, &remapped)
        } else {
            let request = self
                .remap_request(profile, info, inputs, RemapDirection::Forward, &raw, &remapped)
                .await?;
            self.execute(run, Stage::RemapForward, Some(side), request).await?
        };

        // Patch, recover untouched classes, inject
        run = if self.is_fresh(&run, &intermediate) {
            skip(run, Stage::Patch, side, &intermediate)
        } else {
            match self.build_intermediate(run, profile, side, &remapped, &intermediate).await {
                Ok(run) => run,
                Err(e) => {
                    discard(&intermediate);
                    return Err(e);
                }
            }
        };

        // Back to public names
        if self.is_fresh(&run, &patched) {
            Ok(skip(run, Stage::RemapReverse, side, &patched))
        } else {
            let request = self
                .remap_request(profile, info, inputs, RemapDirection::Reverse, &intermediate, &patched)
                .await?;
            self.execute(run, Stage::RemapReverse, Some(side), request).await
        }
    }

    /// Patch, CopyMissing and Inject write one staged jar that only replaces
    /// `intermediate` once all of them succeeded.
    async fn build_intermediate(
        &self,
        mut run: PipelineRun,
        profile: &PatchProfile,
        side: Side,
        remapped: &Path,
        intermediate: &Path,
    ) -> ProvisionResult<PipelineRun> {
        let bundle = match side {
            Side::Client => profile.client_patches.as_deref(),
            Side::Server => profile.server_patches.as_deref(),
        };
        let patches = match bundle {
            Some(path) => PatchSet::load(path)?,
            None => PatchSet::default(),
        };
        let staged = StagedFile::new(intermediate)?;
        let work = staged.path();

        let request = self.request(
            TransformKind::ApplyPatches {
                patches: Arc::new(patches),
            },
            remapped,
            work,
        );
        run = self.execute(run, Stage::Patch, Some(side), request).await?;

        let request = self.request(TransformKind::CopyMissing, remapped, work);
        run = self.execute(run, Stage::CopyMissing, Some(side), request).await?;

        if !profile.inject.is_empty() {
            let request = self.request(
                TransformKind::Overlay {
                    archives: profile.inject.clone(),
                },
                work,
                work,
            );
            run = self.execute(run, Stage::Inject, Some(side), request).await?;
        }

        staged.commit()?;
        Ok(run)
    }

    async fn merge(&self, run: PipelineRun) -> ProvisionResult<PipelineRun> {
        let merged = self.path(&run, ArtifactRole::Merged);
        if self.is_fresh(&run, &merged) {
            debug!("Skipping merge, {:?} exists", merged);
            return Ok(run.record(Stage::Merge, None, StageOutcome::Skipped));
        }

        let client_raw = self.path(&run, ArtifactRole::ClientRaw);
        let server_raw = self.path(&run, ArtifactRole::ServerRaw);
        let structural = |client: PathBuf, server: PathBuf| {
            (
                client,
                MergePlan::Structural {
                    server,
                    synthetic_offset: self.settings.synthetic_params_offset,
                },
            )
        };
        let (input, plan) = match &self.settings.patch_profile {
            None => structural(client_raw, server_raw),
            Some(profile) => {
                let client = self.path(&run, ArtifactRole::ClientPatched);
                match profile.merge_strategy {
                    MergeStrategy::Structural => {
                        structural(client, self.path(&run, ArtifactRole::ServerPatched))
                    }
                    MergeStrategy::ResourceOverlay => (
                        client,
                        MergePlan::ResourceOverlay {
                            client_raw,
                            server_raw,
                        },
                    ),
                }
            }
        };

        let request = self.request(TransformKind::Merge(plan), &input, &merged);
        match self.workers.run(request).await {
            Ok(outcome) => Ok(run.record(Stage::Merge, None, StageOutcome::Ran(outcome.duration))),
            Err(e @ ProvisionError::ArchiveCorrupt { .. }) => {
                error!(
                    "Merge input for {} is corrupt ({}), purging cached artifacts",
                    run.version, e
                );
                purge(&run);
                Err(e)
            }
            Err(e) => {
                discard(&merged);
                Err(e)
            }
        }
    }

    // ── Helpers ─────────────────────────────────────────

    fn path(&self, run: &PipelineRun, role: ArtifactRole) -> PathBuf {
        self.layout
            .artifact_path(&run.version, run.profile.as_deref(), role)
    }

    fn is_fresh(&self, run: &PipelineRun, output: &Path) -> bool {
        !run.refresh && output.is_file()
    }

    fn request(&self, kind: TransformKind, input: &Path, output: &Path) -> TransformRequest {
        TransformRequest::new(kind, input, output)
            .with_log_config(self.settings.transform_log_config.clone())
    }

    async fn remap_request(
        &self,
        profile: &PatchProfile,
        info: &VersionInfo,
        inputs: &mut PatchInputs,
        direction: RemapDirection,
        input: &Path,
        output: &Path,
    ) -> ProvisionResult<TransformRequest> {
        let mappings = match &inputs.mappings {
            Some(table) => table.clone(),
            None => {
                let table = Arc::new(MappingTable::load(&profile.mappings)?);
                debug!("Loaded {} class mappings from {:?}", table.len(), profile.mappings);
                inputs.mappings = Some(table.clone());
                table
            }
        };
        let classpath = match &inputs.classpath {
            Some(classpath) => classpath.clone(),
            None => {
                let classpath = self.libraries.provide(info).await?;
                inputs.classpath = Some(classpath.clone());
                classpath
            }
        };
        Ok(self
            .request(
                TransformKind::Remap {
                    mappings,
                    direction,
                    strict: profile.strict_remap,
                },
                input,
                output,
            )
            .with_classpath(classpath))
    }

    /// Run one transform; on failure its output is discarded.
    async fn execute(
        &self,
        run: PipelineRun,
        stage: Stage,
        side: Option<Side>,
        request: TransformRequest,
    ) -> ProvisionResult<PipelineRun> {
        info!(":{} {:?} -> {:?}", stage, request.input, request.output);
        let output = request.output.clone();
        match self.workers.run(request).await {
            Ok(outcome) => Ok(run.record(stage, side, StageOutcome::Ran(outcome.duration))),
            Err(e) => {
                warn!("Stage {} failed for {}: {}", stage, run.version, e);
                discard(&output);
                Err(e)
            }
        }
    }
}

fn skip(run: PipelineRun, stage: Stage, side: Side, output: &Path) -> PipelineRun {
    debug!("Skipping {} for {} jar, {:?} exists", stage, side, output);
    run.record(stage, Some(side), StageOutcome::Skipped)
}

fn discard(path: &Path) {
    if path.is_file() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Could not remove {:?}: {}", path, e);
        }
    }
}

/// Remove every artifact of the run so the next one starts from the fetch.
fn purge(run: &PipelineRun) {
    for artifact in run.artifacts() {
        if artifact.exists() {
            error!("Deleting {:?} ({})", artifact.path, artifact.role.suffix());
            discard(&artifact.path);
        }
    }
}
