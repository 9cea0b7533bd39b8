//! Workspace Snapshot stage
//!
//! Structural fingerprint of a workspace: repository metadata plus a file
//! inventory (paths, sizes, language tags). File contents are not hashed.

use crate::config::SnapshotConfig;
use crate::error::SnapshotError;
use crate::hooks::Hooks;
use crate::reason::SnapshotReason;
use agp_artifact::{
    Artifact, ArtifactError, ArtifactKind, DecisionRecord, EnvelopeHeader, GlobCache, Sha256Digest,
    WorkspacePath,
};
use agp_workspace::{walk_files, IgnoreFilter, Language, VcsProbe, VcsSummary, WorkspaceRoot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Walker identifier recorded in the trace
pub const WALKER: &str = "walkdir/depth_first_sorted";

/// Snapshot request
#[derive(Debug, Clone)]
pub struct SnapshotRequest {
    pub workspace_root: PathBuf,
    /// Lineage run id; generated through hooks when absent
    pub run_id: Option<String>,
    pub config: SnapshotConfig,
}

impl SnapshotRequest {
    /// Request with default ignore patterns
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            run_id: None,
            config: SnapshotConfig::default(),
        }
    }

    /// With explicit run id
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// With snapshot configuration
    #[must_use]
    pub fn with_config(mut self, config: SnapshotConfig) -> Self {
        self.config = config;
        self
    }
}

/// One inventoried file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InventoryFile {
    pub path: WorkspacePath,
    pub size_bytes: u64,
    pub language: Option<Language>,
}

/// File inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Inventory {
    pub file_count: u64,
    /// Files with a recognized language
    pub supported_file_count: u64,
    pub total_bytes: u64,
    /// Language tag to file count
    pub languages: BTreeMap<String, u64>,
    pub files: Vec<InventoryFile>,
}

/// Snapshot payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceSnapshotPayload {
    pub decision: DecisionRecord<SnapshotReason>,
    pub workspace_root: String,
    pub git: VcsSummary,
    pub ignored_paths: Vec<String>,
    pub inventory: Inventory,
    pub snapshot_hash: Sha256Digest,
}

/// Snapshot trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceSnapshotTrace {
    pub walker: String,
    pub skipped_symlinks: u64,
    pub ignored_entries: u64,
}

#[derive(Serialize)]
struct SnapshotHashMaterial<'a> {
    git: &'a VcsSummary,
    inventory: &'a Inventory,
    ignored_paths: &'a [String],
}

fn snapshot_hash(
    git: &VcsSummary,
    inventory: &Inventory,
    ignored_paths: &[String],
) -> Result<Sha256Digest, ArtifactError> {
    Ok(Sha256Digest::compute_json(&SnapshotHashMaterial {
        git,
        inventory,
        ignored_paths,
    })?)
}

/// Workspace snapshot artifact kind
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceSnapshotKind;

impl agp_artifact::__private::Sealed for WorkspaceSnapshotKind {}

impl ArtifactKind for WorkspaceSnapshotKind {
    type Trace = WorkspaceSnapshotTrace;
    type Payload = WorkspaceSnapshotPayload;

    const TYPE_ID: &'static str = "workspace_snapshot";
    const ID_PREFIX: &'static str = "wsnap";

    fn validate_payload(payload: &Self::Payload) -> Result<(), ArtifactError> {
        let inventory = &payload.inventory;
        if inventory.file_count != inventory.files.len() as u64 {
            return Err(ArtifactError::InvariantViolation(
                "inventory file_count does not match files".to_string(),
            ));
        }
        let recomputed = snapshot_hash(&payload.git, inventory, &payload.ignored_paths)?;
        recomputed.expect_matches(&payload.snapshot_hash)?;
        Ok(())
    }
}

/// Workspace snapshot artifact
pub type WorkspaceSnapshot = Artifact<WorkspaceSnapshotKind>;

/// Capture a workspace snapshot
///
/// # Errors
/// Returns error if the root is invalid, a pattern does not compile, or the
/// repository metadata cannot be read (`GIT_METADATA_UNAVAILABLE`)
pub fn capture_workspace_snapshot(
    request: &SnapshotRequest,
    vcs: &dyn VcsProbe,
    hooks: &Hooks,
) -> Result<WorkspaceSnapshot, SnapshotError> {
    let root = WorkspaceRoot::open(&request.workspace_root)?;
    let ignored_paths = request.config.effective_ignored_paths();
    let filter = IgnoreFilter::new(ignored_paths.iter().cloned(), &GlobCache::new())?;

    let git = VcsSummary::collect(vcs, root.path())?;
    let walk = walk_files(&root, &filter)?;

    let mut languages = BTreeMap::new();
    let mut supported_file_count = 0;
    let mut total_bytes = 0;
    let files: Vec<InventoryFile> = walk
        .files
        .into_iter()
        .map(|file| {
            let language = Language::from_path(&file.path);
            if let Some(lang) = language {
                supported_file_count += 1;
                *languages.entry(lang.tag().to_string()).or_insert(0) += 1;
            }
            total_bytes += file.size;
            InventoryFile {
                path: file.path,
                size_bytes: file.size,
                language,
            }
        })
        .collect();

    let inventory = Inventory {
        file_count: files.len() as u64,
        supported_file_count,
        total_bytes,
        languages,
        files,
    };
    let snapshot_hash =
        snapshot_hash(&git, &inventory, &ignored_paths).map_err(SnapshotError::Seal)?;

    let payload = WorkspaceSnapshotPayload {
        decision: DecisionRecord::ok(format!(
            "captured {} files ({} supported)",
            inventory.file_count, inventory.supported_file_count
        )),
        workspace_root: root.display(),
        git,
        ignored_paths,
        inventory,
        snapshot_hash,
    };
    let trace = WorkspaceSnapshotTrace {
        walker: WALKER.to_string(),
        skipped_symlinks: walk.skipped_symlinks,
        ignored_entries: walk.ignored_entries,
    };

    let run_id = match request.run_id.as_deref().map(str::trim) {
        Some(run_id) if !run_id.is_empty() => run_id.to_string(),
        _ => hooks.generate_run_id(),
    };
    let artifact: WorkspaceSnapshot = Artifact::seal(
        EnvelopeHeader::new(run_id, hooks.now_utc()),
        Vec::new(),
        trace,
        payload,
    )
    .map_err(SnapshotError::Seal)?;

    info!(
        artifact_id = artifact.id(),
        files = artifact.payload().inventory.file_count,
        decision = %artifact.payload().decision.decision,
        reason_code = %artifact.payload().decision.reason_code,
        "workspace snapshot captured"
    );
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agp_workspace::VcsError;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    struct StubVcs {
        fail: bool,
    }

    impl VcsProbe for StubVcs {
        fn head_commit(&self, _root: &Path) -> Result<String, VcsError> {
            if self.fail {
                return Err(VcsError::EmptyOutput {
                    command: "git rev-parse HEAD".into(),
                });
            }
            Ok("0123456789abcdef".into())
        }

        fn branch(&self, _root: &Path) -> Result<String, VcsError> {
            Ok("main".into())
        }

        fn porcelain_status(&self, _root: &Path) -> Result<String, VcsError> {
            Ok("?? b.md\n M a.ls\n".into())
        }
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.js"), "x").unwrap();
        std::fs::write(dir.path().join("a.ls"), "goal g {\n}\n").unwrap();
        std::fs::write(dir.path().join("b.md"), "# b\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "plain").unwrap();
        dir
    }

    fn hooks() -> Hooks {
        Hooks::fixed("2026-01-01T00:00:00.000Z", "run_snap")
    }

    #[test]
    fn inventory_tags_and_ignores() {
        let dir = fixture();
        let request = SnapshotRequest::new(dir.path());
        let snapshot =
            capture_workspace_snapshot(&request, &StubVcs { fail: false }, &hooks()).unwrap();
        let payload = snapshot.payload();
        assert_eq!(payload.inventory.file_count, 3);
        assert_eq!(payload.inventory.supported_file_count, 2);
        assert_eq!(payload.inventory.total_bytes, 11 + 4 + 5);
        assert_eq!(payload.inventory.languages.get("ls"), Some(&1));
        assert_eq!(payload.git.dirty_status, " M a.ls\n?? b.md");
        assert!(payload.git.is_dirty);
        assert_eq!(snapshot.trace().ignored_entries, 1);
        assert_eq!(snapshot.run_id(), "run_snap");
        assert!(snapshot.id().starts_with("wsnap_"));
        assert!(snapshot.inputs().is_empty());
        snapshot.verify().unwrap();
    }

    #[test]
    fn deterministic_with_fixed_hooks() {
        let dir = fixture();
        let request = SnapshotRequest::new(dir.path());
        let a = capture_workspace_snapshot(&request, &StubVcs { fail: false }, &hooks()).unwrap();
        let b = capture_workspace_snapshot(&request, &StubVcs { fail: false }, &hooks()).unwrap();
        assert_eq!(a.to_json_pretty().unwrap(), b.to_json_pretty().unwrap());
    }

    #[test]
    fn vcs_failure_is_fatal() {
        let dir = fixture();
        let request = SnapshotRequest::new(dir.path());
        let err =
            capture_workspace_snapshot(&request, &StubVcs { fail: true }, &hooks()).unwrap_err();
        assert_eq!(err.code(), "GIT_METADATA_UNAVAILABLE");
    }

    #[test]
    fn missing_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let request = SnapshotRequest::new(dir.path().join("missing"));
        let err =
            capture_workspace_snapshot(&request, &StubVcs { fail: false }, &hooks()).unwrap_err();
        assert_eq!(err.code(), "WORKSPACE_ROOT_INVALID");
    }

    #[test]
    fn explicit_run_id_wins_over_hooks() {
        let dir = fixture();
        let request = SnapshotRequest::new(dir.path()).with_run_id("run_explicit");
        let snapshot =
            capture_workspace_snapshot(&request, &StubVcs { fail: false }, &hooks()).unwrap();
        assert_eq!(snapshot.run_id(), "run_explicit");
    }

    #[test]
    fn tampered_inventory_fails_verification() {
        let dir = fixture();
        let request = SnapshotRequest::new(dir.path());
        let snapshot =
            capture_workspace_snapshot(&request, &StubVcs { fail: false }, &hooks()).unwrap();
        let mut value = serde_json::to_value(&snapshot).unwrap();
        value["payload"]["inventory"]["total_bytes"] = serde_json::json!(1);
        assert!(WorkspaceSnapshot::from_value(value).is_err());
    }
}
