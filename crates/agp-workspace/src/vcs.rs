//! Version-control metadata probes
//!
//! The pipeline only reads repository metadata; it never writes through the
//! version-control tool. [`GitCli`] shells out to `git`; tests substitute a
//! static [`VcsProbe`].

use crate::error::VcsError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Read-only repository metadata source
pub trait VcsProbe: Send + Sync {
    /// Commit id of `HEAD`
    ///
    /// # Errors
    /// Returns error if the metadata cannot be read
    fn head_commit(&self, root: &Path) -> Result<String, VcsError>;

    /// Current branch name (`HEAD` when detached)
    ///
    /// # Errors
    /// Returns error if the metadata cannot be read
    fn branch(&self, root: &Path) -> Result<String, VcsError>;

    /// Raw porcelain status output
    ///
    /// # Errors
    /// Returns error if the metadata cannot be read
    fn porcelain_status(&self, root: &Path) -> Result<String, VcsError>;
}

/// Repository summary folded into a workspace snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VcsSummary {
    pub head_commit: String,
    pub branch: String,
    /// Normalized porcelain status
    pub dirty_status: String,
    pub is_dirty: bool,
}

impl VcsSummary {
    /// Query all three values from a probe
    ///
    /// # Errors
    /// Returns the first probe failure
    pub fn collect(probe: &dyn VcsProbe, root: &Path) -> Result<Self, VcsError> {
        let head_commit = probe.head_commit(root)?.trim().to_string();
        let branch = probe.branch(root)?.trim().to_string();
        let dirty_status = normalize_porcelain(&probe.porcelain_status(root)?);
        let is_dirty = !dirty_status.is_empty();
        debug!(%head_commit, %branch, is_dirty, "collected repository metadata");
        Ok(Self {
            head_commit,
            branch,
            dirty_status,
            is_dirty,
        })
    }
}

/// Canonical porcelain text
///
/// Trailing whitespace trimmed per line, blank lines dropped, lines sorted,
/// joined with `\n`.
#[must_use]
pub fn normalize_porcelain(raw: &str) -> String {
    let mut lines: Vec<&str> = raw
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    lines.sort_unstable();
    lines.join("\n")
}

/// `git` command-line probe
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Probe using `git` from `PATH`
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    /// Probe using an explicit executable
    #[inline]
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn run(&self, root: &Path, args: &[&str]) -> Result<String, VcsError> {
        let command = format!("{} -C {} {}", self.program, root.display(), args.join(" "));
        let output = Command::new(&self.program)
            .arg("-C")
            .arg(root)
            .args(args)
            .output()
            .map_err(|source| VcsError::Spawn {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout).map_err(|_| VcsError::NonUtf8Output { command })
    }

    fn run_value(&self, root: &Path, args: &[&str]) -> Result<String, VcsError> {
        let value = self.run(root, args)?.trim().to_string();
        if value.is_empty() {
            return Err(VcsError::EmptyOutput {
                command: format!("{} {}", self.program, args.join(" ")),
            });
        }
        Ok(value)
    }
}

impl VcsProbe for GitCli {
    fn head_commit(&self, root: &Path) -> Result<String, VcsError> {
        self.run_value(root, &["rev-parse", "HEAD"])
    }

    fn branch(&self, root: &Path) -> Result<String, VcsError> {
        self.run_value(root, &["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn porcelain_status(&self, root: &Path) -> Result<String, VcsError> {
        self.run(root, &["status", "--porcelain"])
    }
}
