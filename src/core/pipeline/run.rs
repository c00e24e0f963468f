use std::fmt;
use std::time::Duration;

use crate::core::cache::layout::Side;
use crate::core::cache::{ArtifactRole, CacheLayout, CachedArtifact};
use crate::core::version::VersionDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ResolveManifest,
    Fetch,
    RemapForward,
    Patch,
    CopyMissing,
    Inject,
    RemapReverse,
    Merge,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ResolveManifest => "resolve-manifest",
            Stage::Fetch => "fetch",
            Stage::RemapForward => "remap-forward",
            Stage::Patch => "patch",
            Stage::CopyMissing => "copy-missing",
            Stage::Inject => "inject",
            Stage::RemapReverse => "remap-reverse",
            Stage::Merge => "merge",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Ran(Duration),
    /// Output already present and no refresh requested.
    Skipped,
}

impl StageOutcome {
    pub fn ran(&self) -> bool {
        matches!(self, StageOutcome::Ran(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRecord {
    pub stage: Stage,
    pub side: Option<Side>,
    pub outcome: StageOutcome,
}

/// State of one `provide` call. Each stage takes the run and hands back the
/// next state.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub version: String,
    pub profile: Option<String>,
    pub offline: bool,
    pub refresh: bool,
    pub descriptor: Option<VersionDescriptor>,
    pub stage: Stage,
    pub history: Vec<StageRecord>,
    artifacts: Vec<CachedArtifact>,
}

impl PipelineRun {
    pub fn new(
        layout: &CacheLayout,
        version: impl Into<String>,
        profile: Option<String>,
        offline: bool,
        refresh: bool,
    ) -> Self {
        let version = version.into();
        let artifacts = planned_roles(profile.is_some())
            .into_iter()
            .map(|role| layout.artifact(&version, profile.as_deref(), role))
            .collect();
        Self {
            version,
            profile,
            offline,
            refresh,
            descriptor: None,
            stage: Stage::ResolveManifest,
            history: Vec::new(),
            artifacts,
        }
    }

    pub fn with_descriptor(mut self, descriptor: VersionDescriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    pub fn record(mut self, stage: Stage, side: Option<Side>, outcome: StageOutcome) -> Self {
        self.stage = stage;
        self.history.push(StageRecord {
            stage,
            side,
            outcome,
        });
        self
    }

    pub fn finish(mut self) -> Self {
        self.stage = Stage::Done;
        self
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Every artifact this run produces, in production order.
    pub fn artifacts(&self) -> &[CachedArtifact] {
        &self.artifacts
    }

    pub fn artifact(&self, role: ArtifactRole) -> Option<&CachedArtifact> {
        self.artifacts.iter().find(|a| a.role == role)
    }

    /// Stages that did work, in order.
    pub fn executed(&self) -> Vec<(Stage, Option<Side>)> {
        self.history
            .iter()
            .filter(|r| r.outcome.ran())
            .map(|r| (r.stage, r.side))
            .collect()
    }
}

fn planned_roles(patching: bool) -> Vec<ArtifactRole> {
    let mut roles = vec![ArtifactRole::ClientRaw, ArtifactRole::ServerRaw];
    if patching {
        for side in Side::BOTH {
            roles.extend([
                ArtifactRole::remapped(side),
                ArtifactRole::remapped_patched(side),
                ArtifactRole::patched(side),
            ]);
        }
    }
    roles.push(ArtifactRole::Merged);
    roles
}
