//! Byte-exact capture and restore of workspace paths
//!
//! Every access goes through [`guard_path`], which refuses any path whose
//! target or in-root ancestor is a symbolic link.

use crate::error::WorkspaceError;
use crate::root::WorkspaceRoot;
use agp_artifact::{FileSnapshotEntry, StateSnapshot, WorkspacePath};
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// Resolve `path` under `root`, refusing symbolic links on the way
///
/// # Errors
/// Returns [`WorkspaceError::PathEscape`] if the target or an ancestor is a
/// symbolic link
pub fn guard_path(root: &WorkspaceRoot, path: &WorkspacePath) -> Result<PathBuf, WorkspaceError> {
    let mut current = root.path().to_path_buf();
    for segment in path.segments() {
        current.push(segment);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(WorkspaceError::PathEscape(format!(
                    "{path} resolves through symbolic link {}",
                    current.display()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => break,
            Err(e) => return Err(WorkspaceError::io_error(&current, e)),
        }
    }
    Ok(root.resolve(path))
}

/// Current bytes of a path; `None` when no regular file exists
///
/// # Errors
/// Returns error on symbolic links, directories or unreadable files
pub fn read_file(
    root: &WorkspaceRoot,
    path: &WorkspacePath,
) -> Result<Option<Vec<u8>>, WorkspaceError> {
    let full = guard_path(root, path)?;
    match fs::metadata(&full) {
        Ok(meta) if meta.is_file() => fs::read(&full)
            .map(Some)
            .map_err(|e| WorkspaceError::io_error(&full, e)),
        Ok(_) => Err(WorkspaceError::io_error(
            &full,
            std::io::Error::other("not a regular file"),
        )),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WorkspaceError::io_error(&full, e)),
    }
}

/// Write bytes, creating parent directories
///
/// # Errors
/// Returns error on symbolic links or IO failure
pub fn write_file(
    root: &WorkspaceRoot,
    path: &WorkspacePath,
    bytes: &[u8],
) -> Result<(), WorkspaceError> {
    let full = guard_path(root, path)?;
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).map_err(|e| WorkspaceError::io_error(parent, e))?;
    }
    // Parents may have been created just now; re-check nothing on the way is a link.
    guard_path(root, path)?;
    fs::write(&full, bytes).map_err(|e| WorkspaceError::io_error(&full, e))
}

/// Remove a file; absent files are not an error
///
/// # Errors
/// Returns error on symbolic links or IO failure
pub fn remove_file(root: &WorkspaceRoot, path: &WorkspacePath) -> Result<(), WorkspaceError> {
    let full = guard_path(root, path)?;
    match fs::remove_file(&full) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(WorkspaceError::io_error(&full, e)),
    }
}

/// Capture the exact state of a set of paths
///
/// # Errors
/// Returns error on path escapes or unreadable files
pub fn capture_state<'a, I>(root: &WorkspaceRoot, paths: I) -> Result<StateSnapshot, WorkspaceError>
where
    I: IntoIterator<Item = &'a WorkspacePath>,
{
    let unique: BTreeSet<&WorkspacePath> = paths.into_iter().collect();
    let mut entries = Vec::with_capacity(unique.len());
    for path in unique {
        let entry = match read_file(root, path)? {
            Some(bytes) => FileSnapshotEntry::present(path.clone(), &bytes),
            None => FileSnapshotEntry::absent(path.clone()),
        };
        entries.push(entry);
    }
    let snapshot = StateSnapshot::from_entries(entries)?;
    debug!(digest = %snapshot.digest, files = snapshot.files.len(), "captured state");
    Ok(snapshot)
}

/// Remove now-empty directories between a removed file and the root
fn prune_empty_parents(root: &WorkspaceRoot, path: &WorkspacePath) {
    let mut dir = root.resolve(path);
    while dir.pop() && dir.starts_with(root.path()) && dir != root.path() {
        match fs::remove_dir(&dir) {
            Ok(()) => debug!(dir = %dir.display(), "pruned empty directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            // Not empty, or not ours to remove.
            Err(_) => break,
        }
    }
}

/// Restore a snapshot byte-for-byte
///
/// The whole snapshot is verified before the first write, so a corrupted
/// entry never causes a partial restore. Removing an absent entry also
/// removes parent directories left empty, up to the root.
///
/// # Errors
/// Returns [`WorkspaceError::Integrity`] before any write if verification
/// fails, or an IO error from the writes
pub fn restore_state(root: &WorkspaceRoot, snapshot: &StateSnapshot) -> Result<(), WorkspaceError> {
    snapshot.verify()?;
    let mut decoded = Vec::with_capacity(snapshot.files.len());
    for entry in &snapshot.files {
        decoded.push((&entry.path, entry.verify()?));
    }
    for (path, bytes) in decoded {
        match bytes {
            Some(bytes) => write_file(root, path, &bytes)?,
            None => {
                remove_file(root, path)?;
                prune_empty_parents(root, path);
            }
        }
    }
    debug!(digest = %snapshot.digest, "restored state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn p(raw: &str) -> WorkspacePath {
        WorkspacePath::parse(raw).unwrap()
    }

    fn workspace() -> (tempfile::TempDir, WorkspaceRoot) {
        let dir = tempfile::tempdir().unwrap();
        let root = WorkspaceRoot::open(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn capture_records_presence_and_absence() {
        let (_dir, root) = workspace();
        write_file(&root, &p("docs/a.md"), b"hello").unwrap();
        let snapshot = capture_state(&root, [&p("docs/a.md"), &p("gone.txt")]).unwrap();
        assert_eq!(snapshot.files.len(), 2);
        assert!(snapshot.entry(&p("docs/a.md")).unwrap().exists);
        assert!(!snapshot.entry(&p("gone.txt")).unwrap().exists);
        snapshot.verify().unwrap();
    }

    #[test]
    fn restore_round_trip() {
        let (_dir, root) = workspace();
        write_file(&root, &p("a.txt"), b"original").unwrap();
        let before = capture_state(&root, [&p("a.txt"), &p("b.txt")]).unwrap();

        write_file(&root, &p("a.txt"), b"changed").unwrap();
        write_file(&root, &p("b.txt"), b"new").unwrap();
        restore_state(&root, &before).unwrap();

        assert_eq!(read_file(&root, &p("a.txt")).unwrap(), Some(b"original".to_vec()));
        assert_eq!(read_file(&root, &p("b.txt")).unwrap(), None);
        let after = capture_state(&root, [&p("a.txt"), &p("b.txt")]).unwrap();
        assert_eq!(after.digest, before.digest);
    }

    #[test]
    fn restore_prunes_directories_it_emptied() {
        let (dir, root) = workspace();
        write_file(&root, &p("docs/keep.md"), b"keep").unwrap();
        let before = capture_state(&root, [&p("docs/new/deep/x.md")]).unwrap();

        write_file(&root, &p("docs/new/deep/x.md"), b"created").unwrap();
        restore_state(&root, &before).unwrap();

        assert!(!dir.path().join("docs/new").exists());
        assert!(dir.path().join("docs/keep.md").is_file());
        assert!(dir.path().is_dir());
    }

    #[test]
    fn corrupted_snapshot_writes_nothing() {
        let (_dir, root) = workspace();
        write_file(&root, &p("a.txt"), b"one").unwrap();
        write_file(&root, &p("b.txt"), b"two").unwrap();
        let mut snapshot = capture_state(&root, [&p("a.txt"), &p("b.txt")]).unwrap();

        write_file(&root, &p("a.txt"), b"ONE").unwrap();
        snapshot.files[1].byte_length = 99;
        snapshot.digest = StateSnapshot::compute_digest(&snapshot.files).unwrap();

        let err = restore_state(&root, &snapshot).unwrap_err();
        assert_eq!(err.code(), "SNAPSHOT_CORRUPTED");
        assert_eq!(read_file(&root, &p("a.txt")).unwrap(), Some(b"ONE".to_vec()));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_targets_and_ancestors_are_refused() {
        let (dir, root) = workspace();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();
        std::fs::write(outside.path().join("x.txt"), "secret").unwrap();

        let err = capture_state(&root, [&p("linked/x.txt")]).unwrap_err();
        assert_eq!(err.code(), "PATH_ESCAPE");
        assert!(write_file(&root, &p("linked/y.txt"), b"x").is_err());
        assert!(!outside.path().join("y.txt").exists());
    }

    #[test]
    fn remove_absent_is_noop() {
        let (_dir, root) = workspace();
        remove_file(&root, &p("never.txt")).unwrap();
    }
}
