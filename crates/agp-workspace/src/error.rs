//! Error types for the workspace boundary
//!
//! Provides error handling for:
//! - Root resolution and tree walking
//! - Version-control metadata lookups
//! - Document parsing
//! - State capture and restore

use agp_artifact::{GlobError, PathError, SnapshotIntegrityError};
use std::path::PathBuf;

/// Errors touching the workspace filesystem
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Root is missing, unreadable or not a directory
    #[error("invalid workspace root {path}: {reason}")]
    RootInvalid { path: PathBuf, reason: String },

    /// IO error on a workspace path
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory walk failure
    #[error("walk error: {0}")]
    Walk(String),

    /// Path resolves through a symbolic link or outside the root
    #[error("path escapes the workspace: {0}")]
    PathEscape(String),

    /// Path failed normalization
    #[error(transparent)]
    Path(#[from] PathError),

    /// Ignore or policy glob failed to compile
    #[error(transparent)]
    Glob(#[from] GlobError),

    /// Snapshot integrity failure during restore
    #[error(transparent)]
    Integrity(#[from] SnapshotIntegrityError),
}

impl WorkspaceError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable error identifier
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RootInvalid { .. } => "WORKSPACE_ROOT_INVALID",
            Self::Io { .. } | Self::Walk(_) => "WORKSPACE_IO",
            Self::PathEscape(_) | Self::Path(_) => "PATH_ESCAPE",
            Self::Glob(_) => "INVALID_GLOB",
            Self::Integrity(_) => "SNAPSHOT_CORRUPTED",
        }
    }
}

/// Errors reading version-control metadata
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// Tool could not be started
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Tool exited unsuccessfully
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Tool printed non-UTF-8 output
    #[error("`{command}` produced non-UTF-8 output")]
    NonUtf8Output { command: String },

    /// Tool printed nothing where a value was required
    #[error("`{command}` produced empty output")]
    EmptyOutput { command: String },
}

impl VcsError {
    /// Stable error identifier
    #[must_use]
    pub fn code(&self) -> &'static str {
        "GIT_METADATA_UNAVAILABLE"
    }
}

/// One parser diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based line
    pub line: usize,
    /// Description
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Errors during document parsing
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// No parser registered for file extension
    #[error("no parser registered for extension: '{0}'")]
    NoParserForExtension(String),

    /// Document is not well formed
    #[error("syntax error in {path}: {} diagnostic(s)", diagnostics.len())]
    Syntax {
        path: String,
        diagnostics: Vec<Diagnostic>,
    },
}

impl ParseError {
    /// Create syntax error for path
    pub fn syntax_error(path: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        Self::Syntax {
            path: path.into(),
            diagnostics,
        }
    }
}
