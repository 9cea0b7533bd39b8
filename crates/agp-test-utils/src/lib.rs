//! Testing utilities for the AGP workspace
//!
//! Shared fixtures, fixed hooks and pipeline drivers.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

use agp_core::{
    assemble_review_bundle, capture_workspace_snapshot, map_intent, plan_safe_diff, run_patch,
    Edit, Hooks, IntentMapping, MappingRequest, PatchRun, PatchRunRequest, PlaceholderMaterializer,
    PlanRequest, ReviewBundle, ReviewBundleRequest, SafeDiffPlan, SnapshotRequest,
    VerificationResult, WorkspaceSnapshot,
};
use agp_workspace::{default_parsers, VcsError, VcsProbe};
use std::path::Path;
use tempfile::TempDir;

pub const FIXED_TIMESTAMP: &str = "2026-01-01T00:00:00.000Z";
pub const FIXED_RUN_ID: &str = "run_fixture";

/// Intent that maps onto the `read_docs` capability of [`read_docs_workspace`]
pub const READ_DOCS_INTENT: &str = "Update capability read_docs description to mention local RFCs";

pub const AGENT_POLICY: &str = "\
goal ship_docs {
  description \"Ship documentation updates\"
}

capability read_docs {
  description \"Read local documentation\"
}
";

pub fn fixed_hooks() -> Hooks {
    Hooks::fixed(FIXED_TIMESTAMP, FIXED_RUN_ID)
}

/// Version-control source returning constant metadata
#[derive(Debug, Clone)]
pub struct StaticVcs {
    pub head_commit: String,
    pub branch: String,
    pub porcelain: String,
}

impl Default for StaticVcs {
    fn default() -> Self {
        Self {
            head_commit: "4b825dc642cb6eb9a060e54bf8d69288fbee4904".to_string(),
            branch: "main".to_string(),
            porcelain: String::new(),
        }
    }
}

impl VcsProbe for StaticVcs {
    fn head_commit(&self, _root: &Path) -> Result<String, VcsError> {
        Ok(self.head_commit.clone())
    }

    fn branch(&self, _root: &Path) -> Result<String, VcsError> {
        Ok(self.branch.clone())
    }

    fn porcelain_status(&self, _root: &Path) -> Result<String, VcsError> {
        Ok(self.porcelain.clone())
    }
}

/// Temporary workspace directory
#[derive(Debug)]
pub struct FixtureWorkspace {
    dir: TempDir,
}

impl FixtureWorkspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Add a file, creating parent directories
    #[must_use]
    pub fn with_file(self, relative: &str, contents: &str) -> Self {
        self.write(relative, contents);
        self
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let full = self.dir.path().join(relative);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, contents).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(relative)).unwrap()
    }

    pub fn remove(&self, relative: &str) {
        std::fs::remove_file(self.dir.path().join(relative)).unwrap();
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.dir.path().join(relative).exists()
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

impl Default for FixtureWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// One `.ls` policy with a single strong `read_docs` candidate
pub fn read_docs_workspace() -> FixtureWorkspace {
    FixtureWorkspace::new()
        .with_file("policies/agent.ls", AGENT_POLICY)
        .with_file("README.md", "# Demo\n")
}

/// Passing, evidenced results for each check
pub fn passing_results(checks: &[&str]) -> Vec<VerificationResult> {
    checks
        .iter()
        .map(|check| VerificationResult::passed(*check, format!("ci://runs/1/{check}")))
        .collect()
}

/// Passing results for `lint`, `typecheck` and `test`
pub fn default_passing_results() -> Vec<VerificationResult> {
    passing_results(&["lint", "typecheck", "test"])
}

/// Artifacts of one pipeline run up to the review bundle
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub snapshot: WorkspaceSnapshot,
    pub mapping: IntentMapping,
    pub plan: SafeDiffPlan,
    pub patch_run: PatchRun,
    pub bundle: ReviewBundle,
}

/// Run snapshot through review bundle with defaults and fixed hooks
pub fn run_to_bundle(
    workspace: &FixtureWorkspace,
    intent: &str,
    results: Vec<VerificationResult>,
) -> PipelineRun {
    run_to_bundle_with_edits(workspace, intent, None, results)
}

/// Like [`run_to_bundle`], with explicit plan edits when given
pub fn run_to_bundle_with_edits(
    workspace: &FixtureWorkspace,
    intent: &str,
    edits: Option<Vec<Edit>>,
    results: Vec<VerificationResult>,
) -> PipelineRun {
    let hooks = fixed_hooks();
    let request = SnapshotRequest::new(workspace.path());
    let snapshot = capture_workspace_snapshot(&request, &StaticVcs::default(), &hooks).unwrap();
    let mapping =
        map_intent(&MappingRequest::new(&snapshot, intent), &default_parsers(), &hooks).unwrap();
    let mut plan_request = PlanRequest::new(&mapping);
    if let Some(edits) = edits {
        plan_request = plan_request.with_edits(edits);
    }
    let plan = plan_safe_diff(&plan_request, &hooks).unwrap();
    let patch_run = run_patch(
        &PatchRunRequest::new(&plan).with_results(results),
        &PlaceholderMaterializer,
        &hooks,
    )
    .unwrap();
    let bundle = assemble_review_bundle(
        &ReviewBundleRequest::new(&patch_run).with_lineage(&snapshot, &mapping, &plan),
        &hooks,
    )
    .unwrap();
    PipelineRun {
        snapshot,
        mapping,
        plan,
        patch_run,
        bundle,
    }
}
