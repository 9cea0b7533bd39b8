//! Apply/Rollback engine
//!
//! Terminal stage of the pipeline and the only one with side effects. A
//! request passes through a fixed gate sequence (see [`Gate::ORDER`]); only
//! when every gate passes and `execute` is set does the engine touch the
//! workspace. Every outcome, including dry runs and blocked requests, is
//! recorded as an [`ApplyRecord`] carrying the observed pre- and post-state.

mod exec;
mod gates;

use crate::config::{canonical_set, ApplyAction, ApplyPolicy};
use crate::edit::{Edit, EditOperation};
use crate::error::ApplyError;
use crate::hooks::Hooks;
use crate::reason::ApplyReason;
use crate::review::{ReviewBundle, ReviewBundlePayload};
use agp_artifact::{
    Artifact, ArtifactError, ArtifactKind, ArtifactRef, Decision, DecisionRecord, EnvelopeHeader,
    GlobCache, Sha256Digest, StateSnapshot, WorkspacePath,
};
use agp_workspace::{capture_state, WorkspaceRoot};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Approval evidence supplied by a human reviewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalEvidence {
    #[serde(default)]
    pub approver: Option<String>,
    pub evidence_ref: String,
}

/// Benchmark outcome gating an apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkEvidence {
    /// Gate is skipped unless set
    pub enforce: bool,
    pub quality_floor_met: bool,
    pub valid_gain: bool,
    #[serde(default)]
    pub evidence_ref: Option<String>,
}

/// Caller overrides of target-state preconditions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Preconditions {
    pub expected_pre_state_digest: Option<Sha256Digest>,
}

/// Gate in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Upstream,
    Verification,
    RollbackAvailable,
    PriorApply,
    Benchmark,
    Policy,
    Preconditions,
}

impl Gate {
    /// Fixed evaluation order; the first blocking gate decides
    pub const ORDER: [Gate; 7] = [
        Gate::Upstream,
        Gate::Verification,
        Gate::RollbackAvailable,
        Gate::PriorApply,
        Gate::Benchmark,
        Gate::Policy,
        Gate::Preconditions,
    ];
}

/// Outcome of one gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Pass,
    NotApplicable,
    Escalate,
    Stop,
}

impl From<Decision> for GateOutcome {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Continue => Self::Pass,
            Decision::Escalate => Self::Escalate,
            Decision::Stop => Self::Stop,
        }
    }
}

/// Logged gate evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateRecord {
    pub gate: Gate,
    pub outcome: GateOutcome,
    pub detail: String,
}

/// Path the action touches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangedPath {
    pub path: WorkspacePath,
    pub operation: EditOperation,
}

/// Rollback package the record was bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollbackBinding {
    pub strategy: String,
    pub package_digest: Sha256Digest,
}

/// Capability and approval context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRecord {
    pub declared_capabilities: Vec<String>,
    pub required_capabilities: Vec<String>,
    pub approval_evidence_ref: Option<String>,
}

/// Reference to the apply a rollback undoes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriorApplyRef {
    pub artifact_id: String,
    pub pre_state_digest: Sha256Digest,
    pub post_state_digest: Sha256Digest,
}

/// Apply/rollback record payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplyRecordPayload {
    pub action: ApplyAction,
    pub decision: DecisionRecord<ApplyReason>,
    pub executed: bool,
    pub dry_run: bool,
    pub bundle: ArtifactRef,
    pub workspace_root: String,
    pub rollback: RollbackBinding,
    pub changed_paths: Vec<ChangedPath>,
    pub pre_state: StateSnapshot,
    pub post_state: StateSnapshot,
    /// Rollback only: post-state equals the prior pre-apply state
    pub restored_to_prior_state: Option<bool>,
    pub gates: Vec<GateRecord>,
    pub policy: PolicyRecord,
    pub prior_apply: Option<PriorApplyRef>,
}

/// Apply/rollback record trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplyRecordTrace {
    pub writes: u64,
    pub removals: u64,
}

/// Apply/rollback record artifact kind
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRecordKind;

impl agp_artifact::__private::Sealed for ApplyRecordKind {}

impl ArtifactKind for ApplyRecordKind {
    type Trace = ApplyRecordTrace;
    type Payload = ApplyRecordPayload;

    const TYPE_ID: &'static str = "apply_rollback_record";
    const ID_PREFIX: &'static str = "applyrb";

    fn validate_payload(payload: &Self::Payload) -> Result<(), ArtifactError> {
        for (name, state) in [
            ("pre_state", &payload.pre_state),
            ("post_state", &payload.post_state),
        ] {
            state
                .verify()
                .map_err(|e| ArtifactError::InvariantViolation(format!("{name}: {e}")))?;
        }
        if payload.executed && payload.dry_run {
            return Err(ArtifactError::InvariantViolation(
                "a dry run cannot be executed".to_string(),
            ));
        }
        if payload.restored_to_prior_state.is_some() != (payload.action == ApplyAction::Rollback) {
            return Err(ArtifactError::InvariantViolation(
                "restored_to_prior_state is recorded for rollbacks only".to_string(),
            ));
        }
        Ok(())
    }
}

/// Apply/rollback record artifact
pub type ApplyRecord = Artifact<ApplyRecordKind>;

/// Apply or rollback request
#[derive(Debug, Clone)]
pub struct ApplyRequest<'a> {
    pub action: ApplyAction,
    pub bundle: &'a ReviewBundle,
    pub workspace_root: PathBuf,
    /// False for a dry run
    pub execute: bool,
    pub declared_capabilities: Vec<String>,
    pub approval: Option<ApprovalEvidence>,
    /// Required for rollback
    pub prior_apply: Option<&'a ApplyRecord>,
    pub benchmark: Option<BenchmarkEvidence>,
    pub preconditions: Preconditions,
    pub policy: ApplyPolicy,
}

impl<'a> ApplyRequest<'a> {
    /// Dry-run apply with no declared capabilities
    #[must_use]
    pub fn apply(bundle: &'a ReviewBundle, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            action: ApplyAction::Apply,
            bundle,
            workspace_root: workspace_root.into(),
            execute: false,
            declared_capabilities: Vec::new(),
            approval: None,
            prior_apply: None,
            benchmark: None,
            preconditions: Preconditions::default(),
            policy: ApplyPolicy::default(),
        }
    }

    /// Dry-run rollback of `prior`
    #[must_use]
    pub fn rollback(
        bundle: &'a ReviewBundle,
        workspace_root: impl Into<PathBuf>,
        prior: &'a ApplyRecord,
    ) -> Self {
        Self {
            action: ApplyAction::Rollback,
            prior_apply: Some(prior),
            ..Self::apply(bundle, workspace_root)
        }
    }

    /// Perform side effects when every gate passes
    #[must_use]
    pub fn executing(mut self) -> Self {
        self.execute = true;
        self
    }

    /// With declared capabilities
    #[must_use]
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// With approval evidence
    #[must_use]
    pub fn with_approval(mut self, approval: ApprovalEvidence) -> Self {
        self.approval = Some(approval);
        self
    }

    /// With benchmark evidence
    #[must_use]
    pub fn with_benchmark(mut self, benchmark: BenchmarkEvidence) -> Self {
        self.benchmark = Some(benchmark);
        self
    }

    /// With expected pre-state digest
    #[must_use]
    pub fn with_expected_pre_state(mut self, digest: Sha256Digest) -> Self {
        self.preconditions.expected_pre_state_digest = Some(digest);
        self
    }

    /// With policy
    #[must_use]
    pub fn with_policy(mut self, policy: ApplyPolicy) -> Self {
        self.policy = policy;
        self
    }
}

fn invalid(artifact_type: &'static str) -> impl FnOnce(ArtifactError) -> ApplyError {
    move |source| ApplyError::InvalidInput {
        artifact_type,
        source,
    }
}

/// Paths the action touches, paired with the edit that drives them
fn changed_paths<'b>(
    action: ApplyAction,
    bundle: &'b ReviewBundlePayload,
) -> Result<Vec<(ChangedPath, &'b Edit)>, ApplyError> {
    bundle
        .edits
        .iter()
        .map(|edit| -> Result<_, ApplyError> {
            let operation = match action {
                ApplyAction::Apply => edit.operation,
                ApplyAction::Rollback => edit.operation.inverse(),
            };
            Ok((
                ChangedPath {
                    path: WorkspacePath::parse(&edit.path)?,
                    operation,
                },
                edit,
            ))
        })
        .collect()
}

/// Evaluate the gates and, when allowed, apply or roll back a bundle
///
/// # Errors
/// Returns error for an unverifiable bundle or prior record, an invalid
/// policy, a path escaping the workspace, a corrupted rollback snapshot or
/// an IO failure during execution
pub fn execute_apply_rollback(
    request: &ApplyRequest<'_>,
    hooks: &Hooks,
) -> Result<ApplyRecord, ApplyError> {
    request.policy.validate().map_err(ApplyError::InvalidRequest)?;
    let globs = GlobCache::new();
    globs.validate_all(
        request
            .policy
            .blocked_paths
            .iter()
            .chain(&request.policy.escalation_paths),
    )?;

    let bundle = request.bundle;
    bundle.verify().map_err(invalid("review_bundle"))?;
    if let Some(prior) = request.prior_apply {
        prior.verify().map_err(invalid("apply_rollback_record"))?;
    }
    let root = WorkspaceRoot::open(&request.workspace_root)?;
    let upstream = bundle.payload();

    let edits = changed_paths(request.action, upstream)?;
    let changed: Vec<ChangedPath> = edits.iter().map(|(c, _)| c.clone()).collect();
    let pre_state = capture_state(&root, changed.iter().map(|c| &c.path))?;

    let declared = canonical_set(
        request
            .declared_capabilities
            .iter()
            .map(|c| c.trim().to_string()),
    );
    let required = request.policy.capabilities_for(request.action);
    let ctx = gates::GateContext {
        action: request.action,
        bundle_id: bundle.id(),
        bundle: upstream,
        prior: request.prior_apply,
        benchmark: request.benchmark.as_ref(),
        approval: request.approval.as_ref(),
        declared_capabilities: &declared,
        required_capabilities: &required,
        policy: &request.policy,
        changed: &changed,
        pre_state: &pre_state,
        expected_pre_state_digest: request.preconditions.expected_pre_state_digest.as_ref(),
        globs: &globs,
    };
    let (mut decision, gate_log) = gates::evaluate(&ctx)?;

    let run = decision.is_continue() && request.execute;
    let stats = match (run, request.action, request.prior_apply) {
        (false, _, _) => exec::ExecStats::default(),
        (true, ApplyAction::Apply, _) => {
            exec::execute_apply(&root, bundle.id(), &edits, &pre_state)?
        }
        (true, ApplyAction::Rollback, Some(prior)) => {
            exec::execute_rollback(&root, &prior.payload().pre_state)?
        }
        (true, ApplyAction::Rollback, None) => {
            return Err(ApplyError::InvalidRequest(
                "rollback without prior apply record".to_string(),
            ));
        }
    };

    let post_state = if run {
        capture_state(&root, changed.iter().map(|c| &c.path))?
    } else {
        pre_state.clone()
    };

    let prior_apply = request.prior_apply.map(|prior| PriorApplyRef {
        artifact_id: prior.id().to_string(),
        pre_state_digest: prior.payload().pre_state.digest,
        post_state_digest: prior.payload().post_state.digest,
    });
    let restored_to_prior_state = match request.action {
        ApplyAction::Apply => None,
        ApplyAction::Rollback => {
            let restored = run
                && prior_apply
                    .as_ref()
                    .is_some_and(|p| p.pre_state_digest == post_state.digest);
            if run && !restored {
                warn!(post = %post_state.digest, "rollback did not reproduce the pre-apply state");
                decision = DecisionRecord::stop(
                    ApplyReason::ConflictDetected,
                    "post-rollback state differs from the pre-apply snapshot",
                );
            }
            Some(restored)
        }
    };

    let payload = ApplyRecordPayload {
        action: request.action,
        decision,
        executed: run,
        dry_run: !request.execute,
        bundle: bundle.reference(),
        workspace_root: root.display(),
        rollback: RollbackBinding {
            strategy: upstream.rollback.strategy.clone(),
            package_digest: upstream.rollback.digest,
        },
        changed_paths: changed,
        pre_state,
        post_state,
        restored_to_prior_state,
        gates: gate_log,
        policy: PolicyRecord {
            declared_capabilities: declared,
            required_capabilities: required,
            approval_evidence_ref: request
                .approval
                .as_ref()
                .map(|a| a.evidence_ref.trim().to_string())
                .filter(|r| !r.is_empty()),
        },
        prior_apply,
    };
    let mut inputs = vec![bundle.reference()];
    inputs.extend(request.prior_apply.map(Artifact::reference));
    let artifact: ApplyRecord = Artifact::seal(
        EnvelopeHeader::new(bundle.run_id(), hooks.now_utc()),
        inputs,
        ApplyRecordTrace {
            writes: stats.writes,
            removals: stats.removals,
        },
        payload,
    )
    .map_err(ApplyError::Seal)?;

    info!(
        artifact_id = artifact.id(),
        action = %request.action,
        executed = artifact.payload().executed,
        decision = %artifact.payload().decision.decision,
        reason_code = %artifact.payload().decision.reason_code,
        "apply/rollback recorded"
    );
    Ok(artifact)
}
