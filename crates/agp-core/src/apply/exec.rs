//! Filesystem side effects of apply and rollback

use super::ChangedPath;
use crate::edit::{Edit, EditOperation};
use crate::error::ApplyError;
use agp_artifact::{StateSnapshot, WorkspacePath};
use agp_workspace::{
    read_file, remove_file, restore_state, write_file, WorkspaceError, WorkspaceRoot,
};
use tracing::{error, info, warn};

/// Counts of what execution touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ExecStats {
    pub(crate) writes: u64,
    pub(crate) removals: u64,
}

/// Deterministic block written for an applied edit
pub(crate) fn applied_block(bundle_id: &str, edit: &Edit, path: &WorkspacePath) -> String {
    format!(
        "# agp-applied bundle={bundle_id} operation={} path={path}\n# justification: {}\n",
        edit.operation,
        edit.single_line_justification()
    )
}

fn apply_one(
    root: &WorkspaceRoot,
    bundle_id: &str,
    edit: &Edit,
    changed: &ChangedPath,
    stats: &mut ExecStats,
) -> Result<(), WorkspaceError> {
    let path = &changed.path;
    match changed.operation {
        EditOperation::Create => {
            write_file(root, path, applied_block(bundle_id, edit, path).as_bytes())?;
            stats.writes += 1;
        }
        EditOperation::Modify => {
            let mut bytes = read_file(root, path)?.unwrap_or_default();
            bytes.extend_from_slice(applied_block(bundle_id, edit, path).as_bytes());
            write_file(root, path, &bytes)?;
            stats.writes += 1;
        }
        EditOperation::Delete => {
            remove_file(root, path)?;
            stats.removals += 1;
        }
    }
    Ok(())
}

/// Apply every edit; on failure restore `pre_state` and report
pub(crate) fn execute_apply(
    root: &WorkspaceRoot,
    bundle_id: &str,
    edits: &[(ChangedPath, &Edit)],
    pre_state: &StateSnapshot,
) -> Result<ExecStats, ApplyError> {
    let mut stats = ExecStats::default();
    for (changed, edit) in edits {
        if let Err(source) = apply_one(root, bundle_id, edit, changed, &mut stats) {
            error!(
                path = %changed.path,
                error = %source,
                "apply write failed, restoring pre-state"
            );
            let restored = match restore_state(root, pre_state) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "pre-state restore failed");
                    false
                }
            };
            return Err(ApplyError::Io {
                path: root.resolve(&changed.path),
                restored,
                source,
            });
        }
    }
    info!(writes = stats.writes, removals = stats.removals, "apply executed");
    Ok(stats)
}

/// Restore the prior apply's pre-state byte-for-byte
///
/// The snapshot is verified in full before the first write.
pub(crate) fn execute_rollback(
    root: &WorkspaceRoot,
    prior_pre_state: &StateSnapshot,
) -> Result<ExecStats, ApplyError> {
    restore_state(root, prior_pre_state)?;
    let removals = prior_pre_state.files.iter().filter(|f| !f.exists).count() as u64;
    let stats = ExecStats {
        writes: prior_pre_state.files.len() as u64 - removals,
        removals,
    };
    info!(writes = stats.writes, removals = stats.removals, "rollback executed");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agp_workspace::capture_state;
    use pretty_assertions::assert_eq;

    fn p(raw: &str) -> WorkspacePath {
        WorkspacePath::parse(raw).unwrap()
    }

    #[test]
    fn block_format() {
        let edit = Edit::new("docs/a.md", EditOperation::Modify, "mention\nRFCs");
        assert_eq!(
            applied_block("prb_0123456789ab", &edit, &p("docs/a.md")),
            "# agp-applied bundle=prb_0123456789ab operation=modify path=docs/a.md\n# justification: mention RFCs\n"
        );
    }

    #[test]
    fn apply_then_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let root = WorkspaceRoot::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.md"), "keep\n").unwrap();
        std::fs::write(dir.path().join("gone.md"), "bye\n").unwrap();

        let modify = Edit::new("a.md", EditOperation::Modify, "m");
        let create = Edit::new("new/b.md", EditOperation::Create, "c");
        let delete = Edit::new("gone.md", EditOperation::Delete, "d");
        let edits = vec![
            (ChangedPath { path: p("a.md"), operation: EditOperation::Modify }, &modify),
            (ChangedPath { path: p("new/b.md"), operation: EditOperation::Create }, &create),
            (ChangedPath { path: p("gone.md"), operation: EditOperation::Delete }, &delete),
        ];
        let paths: Vec<WorkspacePath> = edits.iter().map(|(c, _)| c.path.clone()).collect();
        let pre = capture_state(&root, &paths).unwrap();

        let stats = execute_apply(&root, "prb_x", &edits, &pre).unwrap();
        assert_eq!(stats, ExecStats { writes: 2, removals: 1 });
        let a = std::fs::read_to_string(dir.path().join("a.md")).unwrap();
        assert!(a.starts_with("keep\n# agp-applied bundle=prb_x operation=modify"));
        assert!(!dir.path().join("gone.md").exists());

        execute_rollback(&root, &pre).unwrap();
        assert_eq!(capture_state(&root, &paths).unwrap().digest, pre.digest);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.md")).unwrap(), "keep\n");
    }
}
