use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the provisioning pipeline.
/// Every module returns `Result<T, ProvisionError>`.
#[derive(Debug, Error)]
pub enum ProvisionError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Network failure fetching {url}: {reason}")]
    NetworkFailure { url: String, reason: String },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Provisioning ────────────────────────────────────
    #[error("Missing artifact {what} at {path:?}")]
    MissingArtifact { what: String, path: PathBuf },

    #[error("Unknown version: {0}")]
    UnknownVersion(String),

    #[error("Invalid Maven coordinate: {0}")]
    InvalidMavenCoordinate(String),

    // ── Archive ─────────────────────────────────────────
    #[error("Archive {path:?} is corrupt: {source}")]
    ArchiveCorrupt {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Transforms ──────────────────────────────────────
    #[error("Patch conflict on {target}: expected pre-image {expected}, found {actual}")]
    PatchConflict {
        target: String,
        expected: String,
        actual: String,
    },

    #[error("Malformed patch for {target}: {reason}")]
    MalformedPatch { target: String, reason: String },

    #[error("Unmapped symbol: {0}")]
    UnmappedSymbol(String),

    #[error("Invalid class file {entry}: {reason}")]
    ClassFormat { entry: String, reason: String },

    #[error("Mapping parse error at line {line}: {reason}")]
    MappingParse { line: usize, reason: String },

    #[error("Unexpected end of data at offset {offset} (needed {needed} bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("Transform failed: {0}")]
    Transform(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl ProvisionError {
    /// Errors that must abort the run immediately without retry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProvisionError::UnknownVersion(_) | ProvisionError::UnmappedSymbol(_)
        )
    }

    /// Errors worth retrying before falling back or surfacing.
    pub fn is_transient(&self) -> bool {
        match self {
            ProvisionError::NetworkFailure { .. } => true,
            ProvisionError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisionError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn class_format(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        ProvisionError::ClassFormat {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for ProvisionError {
    fn from(source: std::io::Error) -> Self {
        ProvisionError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}
