use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::mappings::MappingTable;
use crate::core::patch::PatchSet;
use crate::core::remap::RemapDirection;

/// A program run as a transform. The request paths are appended to `args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTool {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Which of the two merge algorithms a merge request runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergePlan {
    /// `input` is the client jar.
    Structural { server: PathBuf, synthetic_offset: bool },
    /// `input` is the patched client jar.
    ResourceOverlay { client_raw: PathBuf, server_raw: PathBuf },
}

#[derive(Debug, Clone)]
pub enum TransformKind {
    Remap {
        mappings: Arc<MappingTable>,
        direction: RemapDirection,
        strict: bool,
    },
    ApplyPatches {
        patches: Arc<PatchSet>,
    },
    /// Fill `output` with the classes of `input` it lacks.
    CopyMissing,
    /// `input` overlaid with every entry of `archives`.
    Overlay {
        archives: Vec<PathBuf>,
    },
    Merge(MergePlan),
    External {
        tool: ExternalTool,
        extra_inputs: Vec<PathBuf>,
    },
}

impl TransformKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransformKind::Remap { .. } => "remap",
            TransformKind::ApplyPatches { .. } => "apply-patches",
            TransformKind::CopyMissing => "copy-missing",
            TransformKind::Overlay { .. } => "overlay",
            TransformKind::Merge(_) => "merge",
            TransformKind::External { .. } => "external",
        }
    }
}

/// Everything a transform needs, passed by value across the worker boundary.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub kind: TransformKind,
    pub input: PathBuf,
    pub output: PathBuf,
    pub classpath: Vec<PathBuf>,
    /// Log configuration handed to the transform as a file path.
    pub log_config: Option<PathBuf>,
}

impl TransformRequest {
    pub fn new(kind: TransformKind, input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            input: input.into(),
            output: output.into(),
            classpath: Vec::new(),
            log_config: None,
        }
    }

    pub fn with_classpath(mut self, classpath: Vec<PathBuf>) -> Self {
        self.classpath = classpath;
        self
    }

    pub fn with_log_config(mut self, log_config: Option<PathBuf>) -> Self {
        self.log_config = log_config;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutcome {
    pub output: PathBuf,
    pub duration: Duration,
}
