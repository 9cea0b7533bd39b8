//! AGP Core - Autonomy Governance Pipeline stages
//!
//! Six synchronous stages, each consuming upstream artifacts and sealing a
//! new content-addressed one:
//! - Workspace Snapshot: structural fingerprint of a workspace
//! - Intent Mapping: ranks workspace targets against a free-text intent
//! - Safe Diff Plan: bounded edits checked against forbidden paths
//! - Patch Run: materialized hunks plus verification evidence
//! - Review Bundle: lineage, rollback package and readiness verdict
//! - Apply/Rollback: gated, recorded workspace mutation
//!
//! # Example
//!
//! ```rust,ignore
//! use agp_core::prelude::*;
//!
//! let hooks = Hooks::new();
//! let snapshot = capture_workspace_snapshot(&SnapshotRequest::new("."), &GitCli::new(), &hooks)?;
//! let mapping = map_intent(
//!     &MappingRequest::new(&snapshot, "Update capability read_docs"),
//!     &default_parsers(),
//!     &hooks,
//! )?;
//! let plan = plan_safe_diff(&PlanRequest::new(&mapping), &hooks)?;
//! println!("{}", plan.payload().decision);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod apply;
pub mod config;
pub mod edit;
pub mod error;
pub mod hooks;
pub mod intent;
pub mod patch;
pub mod plan;
pub mod reason;
pub mod review;
pub mod snapshot;

pub use apply::{
    execute_apply_rollback, ApplyRecord, ApplyRecordKind, ApplyRecordPayload, ApplyRequest,
    ApprovalEvidence, BenchmarkEvidence, ChangedPath, Gate, GateOutcome, GateRecord, Preconditions,
};
pub use config::{
    ApplyAction, ApplyPolicy, MappingOptions, PatchRunConfig, PipelineConfig, PlanConfig,
    ReviewConfig, SnapshotConfig,
};
pub use edit::{Edit, EditOperation};
pub use error::{
    ApplyError, ConfigError, MappingError, PatchRunError, PipelineError, PlanError,
    ReviewBundleError, SnapshotError,
};
pub use hooks::{HookError, Hooks};
pub use intent::{map_intent, IntentMapping, MappingRequest, MatchMethod, TargetCandidate};
pub use patch::{
    run_patch, CheckStatus, PatchMaterializer, PatchRun, PatchRunRequest, PlaceholderMaterializer,
    VerificationResult,
};
pub use plan::{plan_safe_diff, PlanRequest, SafeDiffPlan};
pub use reason::{ApplyReason, BundleReason, MappingReason, PatchReason, PlanReason, SnapshotReason};
pub use review::{assemble_review_bundle, ReviewBundle, ReviewBundleRequest, RollbackPackage};
pub use snapshot::{capture_workspace_snapshot, SnapshotRequest, WorkspaceSnapshot};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the pipeline
    pub use crate::{
        assemble_review_bundle, capture_workspace_snapshot, execute_apply_rollback, map_intent,
        plan_safe_diff, run_patch, ApplyAction, ApplyRequest, Edit, EditOperation, Hooks,
        MappingRequest, PipelineConfig, PipelineError, PlaceholderMaterializer, PlanRequest,
        PatchRunRequest, ReviewBundleRequest, SnapshotRequest, VerificationResult,
    };
    pub use agp_artifact::{Decision, DecisionRecord};
    pub use agp_workspace::{default_parsers, GitCli, VcsProbe};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
