//! Error types for AGP Core
//!
//! Errors here are contract violations: malformed inputs, broken lineage,
//! unreadable workspaces. Business outcomes (ambiguity, policy blocks,
//! failed verification) are never errors; they are artifacts carrying a
//! blocking decision.
//!
//! Every error exposes a stable `code()`.

use agp_artifact::{ArtifactError, GlobError, PathError};
use agp_workspace::{VcsError, WorkspaceError};
use std::path::PathBuf;

const INVALID_INPUT_ARTIFACT: &str = "INVALID_INPUT_ARTIFACT";
const INVALID_REQUEST: &str = "INVALID_REQUEST";
const ARTIFACT_SEAL_FAILED: &str = "ARTIFACT_SEAL_FAILED";

/// Workspace snapshot errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Root or walk failure
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// Repository metadata unavailable
    #[error("repository metadata unavailable: {0}")]
    Vcs(#[from] VcsError),

    /// Invalid ignore pattern
    #[error("invalid ignored path pattern: {0}")]
    Glob(#[from] GlobError),

    /// Artifact construction failed
    #[error("failed to seal snapshot: {0}")]
    Seal(#[source] ArtifactError),
}

impl SnapshotError {
    /// Stable error identifier
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Workspace(e) => e.code(),
            Self::Vcs(e) => e.code(),
            Self::Glob(_) => INVALID_REQUEST,
            Self::Seal(_) => ARTIFACT_SEAL_FAILED,
        }
    }
}

/// Intent mapping errors
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    /// Intent or options rejected
    #[error("invalid mapping request: {0}")]
    InvalidRequest(String),

    /// Snapshot artifact failed verification
    #[error("invalid workspace snapshot: {0}")]
    InvalidInput(#[source] ArtifactError),

    /// Root or walk failure
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// Recorded ignore pattern does not compile
    #[error("invalid ignored path pattern: {0}")]
    Glob(#[from] GlobError),

    /// Artifact construction failed
    #[error("failed to seal intent mapping: {0}")]
    Seal(#[source] ArtifactError),
}

impl MappingError {
    /// Stable error identifier
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::Glob(_) => INVALID_REQUEST,
            Self::InvalidInput(_) => INVALID_INPUT_ARTIFACT,
            Self::Workspace(e) => e.code(),
            Self::Seal(_) => ARTIFACT_SEAL_FAILED,
        }
    }
}

/// Safe diff plan errors
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Bounds or patterns rejected
    #[error("invalid plan request: {0}")]
    InvalidRequest(String),

    /// Mapping artifact failed verification
    #[error("invalid intent mapping: {0}")]
    InvalidInput(#[source] ArtifactError),

    /// Forbidden pattern does not compile
    #[error("invalid forbidden path pattern: {0}")]
    Glob(#[from] GlobError),

    /// Artifact construction failed
    #[error("failed to seal safe diff plan: {0}")]
    Seal(#[source] ArtifactError),
}

impl PlanError {
    /// Stable error identifier
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::Glob(_) => INVALID_REQUEST,
            Self::InvalidInput(_) => INVALID_INPUT_ARTIFACT,
            Self::Seal(_) => ARTIFACT_SEAL_FAILED,
        }
    }
}

/// Patch run errors
#[derive(Debug, thiserror::Error)]
pub enum PatchRunError {
    /// Checks or patterns rejected
    #[error("invalid patch run request: {0}")]
    InvalidRequest(String),

    /// Plan artifact failed verification
    #[error("invalid safe diff plan: {0}")]
    InvalidInput(#[source] ArtifactError),

    /// Edit path escapes the workspace
    #[error("edit path rejected: {0}")]
    PathEscape(#[from] PathError),

    /// Policy-sensitive pattern does not compile
    #[error("invalid policy-sensitive pattern: {0}")]
    Glob(#[from] GlobError),

    /// Materializer failure
    #[error("materializer '{materializer}' failed: {message}")]
    Materialize {
        materializer: String,
        message: String,
    },

    /// Artifact construction failed
    #[error("failed to seal patch run: {0}")]
    Seal(#[source] ArtifactError),
}

impl PatchRunError {
    /// Stable error identifier
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::Glob(_) => INVALID_REQUEST,
            Self::InvalidInput(_) => INVALID_INPUT_ARTIFACT,
            Self::PathEscape(_) => "PATH_ESCAPE",
            Self::Materialize { .. } => "PATCH_MATERIALIZATION_FAILED",
            Self::Seal(_) => ARTIFACT_SEAL_FAILED,
        }
    }
}

/// Review bundle errors
#[derive(Debug, thiserror::Error)]
pub enum ReviewBundleError {
    /// Strategy or notes rejected
    #[error("invalid review bundle request: {0}")]
    InvalidRequest(String),

    /// A lineage artifact failed verification
    #[error("invalid {artifact_type} artifact: {source}")]
    InvalidInput {
        artifact_type: &'static str,
        #[source]
        source: ArtifactError,
    },

    /// Patch content does not hash to its recorded digest
    #[error("patch digest mismatch: recorded {recorded}, recomputed {recomputed}")]
    PatchDigestMismatch { recorded: String, recomputed: String },

    /// Ancestors are not a consistent chain
    #[error("lineage mismatch: {0}")]
    LineageMismatch(String),

    /// Policy-sensitive pattern does not compile
    #[error("invalid pattern: {0}")]
    Glob(#[from] GlobError),

    /// Artifact construction failed
    #[error("failed to seal review bundle: {0}")]
    Seal(#[source] ArtifactError),
}

impl ReviewBundleError {
    /// Stable error identifier
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::Glob(_) => INVALID_REQUEST,
            Self::InvalidInput { .. } => INVALID_INPUT_ARTIFACT,
            Self::PatchDigestMismatch { .. } => "PATCH_DIGEST_MISMATCH",
            Self::LineageMismatch(_) => "LINEAGE_MISMATCH",
            Self::Seal(_) => ARTIFACT_SEAL_FAILED,
        }
    }
}

/// Apply/rollback errors
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// Policy or request rejected
    #[error("invalid apply request: {0}")]
    InvalidRequest(String),

    /// Bundle or prior record failed verification
    #[error("invalid {artifact_type} artifact: {source}")]
    InvalidInput {
        artifact_type: &'static str,
        #[source]
        source: ArtifactError,
    },

    /// Edit path escapes the workspace
    #[error("edit path rejected: {0}")]
    PathEscape(#[from] PathError),

    /// Root, capture or restore failure
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// Write failed mid-apply; pre-state restore was attempted
    #[error("apply write failed at {path} (restored: {restored}): {source}")]
    Io {
        path: PathBuf,
        restored: bool,
        #[source]
        source: WorkspaceError,
    },

    /// Policy pattern does not compile
    #[error("invalid policy pattern: {0}")]
    Glob(#[from] GlobError),

    /// Artifact construction failed
    #[error("failed to seal apply record: {0}")]
    Seal(#[source] ArtifactError),
}

impl ApplyError {
    /// Stable error identifier
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::Glob(_) => INVALID_REQUEST,
            Self::InvalidInput { .. } => INVALID_INPUT_ARTIFACT,
            Self::PathEscape(_) => "PATH_ESCAPE",
            Self::Workspace(e) => e.code(),
            Self::Io { .. } => "APPLY_IO_FAILED",
            Self::Seal(_) => ARTIFACT_SEAL_FAILED,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Value out of range
    #[error("invalid config value: {0}")]
    Invalid(String),

    /// Pattern does not compile
    #[error("invalid config pattern: {0}")]
    Glob(#[from] GlobError),
}

impl ConfigError {
    /// Stable error identifier
    #[must_use]
    pub fn code(&self) -> &'static str {
        "CONFIG_INVALID"
    }
}

/// Umbrella error for callers threading several stages
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    PatchRun(#[from] PatchRunError),

    #[error(transparent)]
    ReviewBundle(#[from] ReviewBundleError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Standalone artifact failed verification
    #[error("artifact verification failed: {0}")]
    Artifact(#[from] ArtifactError),
}

impl PipelineError {
    /// Stable error identifier
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Snapshot(e) => e.code(),
            Self::Mapping(e) => e.code(),
            Self::Plan(e) => e.code(),
            Self::PatchRun(e) => e.code(),
            Self::ReviewBundle(e) => e.code(),
            Self::Apply(e) => e.code(),
            Self::Config(e) => e.code(),
            Self::Artifact(_) => INVALID_INPUT_ARTIFACT,
        }
    }
}
