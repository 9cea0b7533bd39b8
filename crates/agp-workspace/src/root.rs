//! Workspace root resolution and tree walking

use crate::error::WorkspaceError;
use agp_artifact::{Glob, GlobCache, WorkspacePath};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Canonical, existing workspace directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRoot {
    path: PathBuf,
}

impl WorkspaceRoot {
    /// Resolve a root directory
    ///
    /// Symlinked roots resolve to their real path.
    ///
    /// # Errors
    /// Returns [`WorkspaceError::RootInvalid`] if the path does not exist or is
    /// not a directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let raw = path.as_ref();
        let canonical = raw.canonicalize().map_err(|e| WorkspaceError::RootInvalid {
            path: raw.to_path_buf(),
            reason: e.to_string(),
        })?;
        if !canonical.is_dir() {
            return Err(WorkspaceError::RootInvalid {
                path: canonical,
                reason: "not a directory".to_string(),
            });
        }
        Ok(Self { path: canonical })
    }

    /// Canonical filesystem path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Canonical path rendered for artifacts
    #[must_use]
    pub fn display(&self) -> String {
        self.path.display().to_string()
    }

    /// Filesystem location of a workspace path
    #[inline]
    #[must_use]
    pub fn resolve(&self, path: &WorkspacePath) -> PathBuf {
        path.to_fs_path(&self.path)
    }
}

/// Compiled ignore filter over workspace paths
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    patterns: Vec<String>,
    compiled: Vec<Arc<Glob>>,
}

impl IgnoreFilter {
    /// Compile a filter; patterns are sorted and de-duplicated
    ///
    /// # Errors
    /// Returns error if any pattern fails to compile
    pub fn new<I, S>(patterns: I, cache: &GlobCache) -> Result<Self, WorkspaceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        patterns.sort();
        patterns.dedup();
        let compiled = patterns
            .iter()
            .map(|p| cache.get(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns, compiled })
    }

    /// Canonical pattern list
    #[inline]
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// True if any pattern matches
    #[must_use]
    pub fn is_ignored(&self, path: &str) -> bool {
        self.compiled.iter().any(|g| g.is_match(path))
    }
}

/// Regular file found by [`walk_files`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub path: WorkspacePath,
    pub size: u64,
}

/// Result of a workspace walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkOutcome {
    /// Regular files in depth-first, name-sorted order
    pub files: Vec<WalkedFile>,
    /// Symbolic links encountered and skipped
    pub skipped_symlinks: u64,
    /// Files or directories pruned by the ignore filter
    pub ignored_entries: u64,
}

/// Walk the workspace depth-first
///
/// Symbolic links are never followed; ignored directories are pruned without
/// descending.
///
/// # Errors
/// Returns error on unreadable directories or metadata
pub fn walk_files(
    root: &WorkspaceRoot,
    filter: &IgnoreFilter,
) -> Result<WalkOutcome, WorkspaceError> {
    let mut outcome = WalkOutcome::default();
    let mut entries = WalkDir::new(root.path())
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = entries.next() {
        let entry = entry.map_err(|e| WorkspaceError::Walk(e.to_string()))?;
        if entry.depth() == 0 {
            continue;
        }
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            debug!(path = %entry.path().display(), "skipping symbolic link");
            outcome.skipped_symlinks += 1;
            continue;
        }
        let relative = match WorkspacePath::from_fs_path(root.path(), entry.path()) {
            Ok(relative) => relative,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping unrepresentable path");
                if file_type.is_dir() {
                    entries.skip_current_dir();
                }
                continue;
            }
        };
        if filter.is_ignored(relative.as_str()) {
            outcome.ignored_entries += 1;
            if file_type.is_dir() {
                entries.skip_current_dir();
            }
            continue;
        }
        if file_type.is_file() {
            let size = entry
                .metadata()
                .map_err(|e| WorkspaceError::Walk(e.to_string()))?
                .len();
            outcome.files.push(WalkedFile {
                path: relative,
                size,
            });
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn filter(patterns: &[&str]) -> IgnoreFilter {
        IgnoreFilter::new(patterns.iter().copied(), &GlobCache::new()).unwrap()
    }

    #[test]
    fn open_rejects_missing_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(WorkspaceRoot::open(&missing).unwrap_err().code(), "WORKSPACE_ROOT_INVALID");

        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert_eq!(WorkspaceRoot::open(&file).unwrap_err().code(), "WORKSPACE_ROOT_INVALID");
    }

    #[test]
    fn walk_is_sorted_and_prunes_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/.git")).unwrap();
        fs::write(dir.path().join("b/.git/HEAD"), "ref").unwrap();
        fs::write(dir.path().join("b/z.md"), "z").unwrap();
        fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();

        let root = WorkspaceRoot::open(dir.path()).unwrap();
        let outcome = walk_files(&root, &filter(&["**/.git/**"])).unwrap();
        let paths: Vec<&str> = outcome.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.rs", "b/z.md"]);
        assert_eq!(outcome.ignored_entries, 1);
        assert_eq!(outcome.files[0].size, 12);
    }

    #[cfg(unix)]
    #[test]
    fn walk_skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt"))
            .unwrap();

        let root = WorkspaceRoot::open(dir.path()).unwrap();
        let outcome = walk_files(&root, &filter(&[])).unwrap();
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.skipped_symlinks, 1);
    }

    #[test]
    fn filter_patterns_are_canonical() {
        let f = filter(&["b/**", "a/**", "b/**"]);
        assert_eq!(f.patterns(), &["a/**".to_string(), "b/**".to_string()]);
        assert!(f.is_ignored("a/x"));
        assert!(!f.is_ignored("c/x"));
    }
}
