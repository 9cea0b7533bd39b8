//! Apply/rollback gate and side-effect tests

use agp_artifact::{
    ArtifactError, ArtifactRef, Decision, EnvelopeHeader, Sha256Digest, StateSnapshot,
    WorkspacePath, ARTIFACT_ID_HEX_LEN,
};
use agp_core::apply::ApplyRecordTrace;
use agp_core::config::ApplyPolicy;
use agp_core::{
    execute_apply_rollback, ApplyAction, ApplyError, ApplyReason, ApplyRecord, ApplyRecordPayload,
    ApplyRequest, ApprovalEvidence, BenchmarkEvidence, Edit, EditOperation, Gate, GateOutcome,
};
use agp_test_utils::{
    default_passing_results, fixed_hooks, read_docs_workspace, run_to_bundle,
    run_to_bundle_with_edits, FixtureWorkspace, PipelineRun, AGENT_POLICY, READ_DOCS_INTENT,
};
use pretty_assertions::assert_eq;
use serde::Serialize;

const POLICY_PATH: &str = "policies/agent.ls";
const NEW_DOC: &str = "docs/guides/local-rfcs.md";

fn ready_run() -> (FixtureWorkspace, PipelineRun) {
    let ws = read_docs_workspace();
    let run = run_to_bundle(&ws, READ_DOCS_INTENT, default_passing_results());
    assert!(run.bundle.payload().readiness.ready);
    (ws, run)
}

/// Ready bundle whose single edit creates [`NEW_DOC`]
fn create_run() -> (FixtureWorkspace, PipelineRun) {
    let ws = read_docs_workspace();
    let edits = vec![Edit::new(NEW_DOC, EditOperation::Create, "document local RFC lookup")];
    let results = default_passing_results();
    let run = run_to_bundle_with_edits(&ws, READ_DOCS_INTENT, Some(edits), results);
    assert!(run.bundle.payload().readiness.ready);
    (ws, run)
}

/// Re-seal a record around an edited payload
fn reseal(record: &ApplyRecord, payload: ApplyRecordPayload) -> ApplyRecord {
    ApplyRecord::seal(
        EnvelopeHeader::new(record.run_id(), record.produced_at_utc()),
        record.inputs().to_vec(),
        *record.trace(),
        payload,
    )
    .unwrap()
}

fn rollback(ws: &FixtureWorkspace, run: &PipelineRun, prior: &ApplyRecord) -> ApplyRecord {
    execute_apply_rollback(
        &ApplyRequest::rollback(&run.bundle, ws.path(), prior)
            .with_capabilities(["fs.write"])
            .executing(),
        &fixed_hooks(),
    )
    .unwrap()
}

fn assert_conflict_at_preconditions(record: &ApplyRecord) {
    let payload = record.payload();
    assert_eq!(payload.decision.decision, Decision::Stop);
    assert_eq!(payload.decision.reason_code, ApplyReason::ConflictDetected);
    assert_eq!(payload.gates.last().map(|g| g.gate), Some(Gate::Preconditions));
    assert!(!payload.executed);
    assert_eq!(record.trace().writes + record.trace().removals, 0);
}

fn executed_apply(ws: &FixtureWorkspace, run: &PipelineRun) -> ApplyRecord {
    let record = execute_apply_rollback(
        &ApplyRequest::apply(&run.bundle, ws.path())
            .with_capabilities(["fs.write"])
            .executing(),
        &fixed_hooks(),
    )
    .unwrap();
    assert!(record.payload().executed);
    record
}

#[test]
fn test_dry_run_leaves_workspace_untouched() {
    let (ws, run) = ready_run();
    let record = execute_apply_rollback(
        &ApplyRequest::apply(&run.bundle, ws.path()).with_capabilities(["fs.write"]),
        &fixed_hooks(),
    )
    .unwrap();

    let payload = record.payload();
    assert_eq!(payload.decision.decision, Decision::Continue);
    assert!(payload.dry_run);
    assert!(!payload.executed);
    assert_eq!(payload.pre_state, payload.post_state);
    assert_eq!(payload.restored_to_prior_state, None);
    assert_eq!(ws.read(POLICY_PATH), AGENT_POLICY);
    assert!(record.id().starts_with("applyrb_"));
    assert!(record.references(run.bundle.id()));
}

#[test]
fn test_undeclared_capability_escalates() {
    let (ws, run) = ready_run();
    let record = execute_apply_rollback(
        &ApplyRequest::apply(&run.bundle, ws.path()).executing(),
        &fixed_hooks(),
    )
    .unwrap();

    let payload = record.payload();
    assert_eq!(payload.decision.decision, Decision::Escalate);
    assert_eq!(payload.decision.reason_code, ApplyReason::UndeclaredCapability);
    assert!(!payload.executed);
    assert_eq!(payload.policy.required_capabilities, vec!["fs.write"]);
    let last = payload.gates.last().unwrap();
    assert_eq!(last.gate, Gate::Policy);
    assert_eq!(last.outcome, GateOutcome::Escalate);
    assert_eq!(ws.read(POLICY_PATH), AGENT_POLICY);
}

#[test]
fn test_apply_then_rollback_restores_bytes() {
    let (ws, run) = ready_run();
    let applied = executed_apply(&ws, &run);

    let payload = applied.payload();
    assert_eq!(payload.decision.decision, Decision::Continue);
    assert_ne!(payload.pre_state.digest, payload.post_state.digest);
    assert_eq!(payload.gates.len(), Gate::ORDER.len());
    let modified = ws.read(POLICY_PATH);
    assert!(modified.starts_with(AGENT_POLICY));
    assert!(modified.contains(&format!("# agp-applied bundle={}", run.bundle.id())));

    let rolled_back = execute_apply_rollback(
        &ApplyRequest::rollback(&run.bundle, ws.path(), &applied)
            .with_capabilities(["fs.write"])
            .executing(),
        &fixed_hooks(),
    )
    .unwrap();

    let payload = rolled_back.payload();
    assert_eq!(payload.action, ApplyAction::Rollback);
    assert_eq!(payload.decision.decision, Decision::Continue);
    assert!(payload.executed);
    assert_eq!(payload.restored_to_prior_state, Some(true));
    assert_eq!(payload.post_state.digest, applied.payload().pre_state.digest);
    assert_eq!(
        payload.prior_apply.as_ref().map(|p| p.artifact_id.as_str()),
        Some(applied.id())
    );
    assert!(rolled_back.references(applied.id()));
    assert_eq!(ws.read(POLICY_PATH), AGENT_POLICY);
}

#[test]
fn test_rollback_without_prior_record_stops() {
    let (ws, run) = ready_run();
    let mut request = ApplyRequest::apply(&run.bundle, ws.path())
        .with_capabilities(["fs.write"])
        .executing();
    request.action = ApplyAction::Rollback;

    let record = execute_apply_rollback(&request, &fixed_hooks()).unwrap();
    let payload = record.payload();
    assert_eq!(payload.decision.decision, Decision::Stop);
    assert_eq!(payload.decision.reason_code, ApplyReason::PriorApplyRecordMissing);
    assert_eq!(payload.restored_to_prior_state, Some(false));
    assert_eq!(ws.read(POLICY_PATH), AGENT_POLICY);
}

#[test]
fn test_rollback_after_drift_is_conflict() {
    let (ws, run) = ready_run();
    let applied = executed_apply(&ws, &run);
    ws.write(POLICY_PATH, "edited by hand\n");

    let record = execute_apply_rollback(
        &ApplyRequest::rollback(&run.bundle, ws.path(), &applied)
            .with_capabilities(["fs.write"])
            .executing(),
        &fixed_hooks(),
    )
    .unwrap();

    let payload = record.payload();
    assert_eq!(payload.decision.decision, Decision::Stop);
    assert_eq!(payload.decision.reason_code, ApplyReason::ConflictDetected);
    assert!(!payload.executed);
    assert_eq!(ws.read(POLICY_PATH), "edited by hand\n");
}

#[test]
fn test_corrupted_rollback_snapshot_is_rejected() {
    #[derive(Serialize)]
    struct IdMaterial<'a> {
        inputs: &'a [ArtifactRef],
        trace: &'a ApplyRecordTrace,
        payload: &'a ApplyRecordPayload,
    }

    let (ws, run) = ready_run();
    let applied = executed_apply(&ws, &run);
    let modified = ws.read(POLICY_PATH);

    // Corrupt the pre-apply bytes but keep a self-consistent artifact id.
    let mut payload = serde_json::to_value(applied.payload()).unwrap();
    payload["pre_state"]["files"][0]["content_base64"] =
        serde_json::Value::String("Y29ycnVwdGVk".to_string());
    let payload: ApplyRecordPayload = serde_json::from_value(payload).unwrap();
    let digest = Sha256Digest::compute_json(&IdMaterial {
        inputs: applied.inputs(),
        trace: applied.trace(),
        payload: &payload,
    })
    .unwrap();
    let mut value = serde_json::to_value(&applied).unwrap();
    value["payload"] = serde_json::to_value(&payload).unwrap();
    value["artifact_id"] = format!("applyrb_{}", digest.short_hex(ARTIFACT_ID_HEX_LEN)).into();
    let corrupted: ApplyRecord = serde_json::from_value(value).unwrap();

    let err = execute_apply_rollback(
        &ApplyRequest::rollback(&run.bundle, ws.path(), &corrupted)
            .with_capabilities(["fs.write"])
            .executing(),
        &fixed_hooks(),
    )
    .unwrap_err();
    assert_eq!(err.code(), "INVALID_INPUT_ARTIFACT");
    assert!(matches!(
        err,
        ApplyError::InvalidInput {
            source: ArtifactError::InvariantViolation(_),
            ..
        }
    ));
    assert_eq!(ws.read(POLICY_PATH), modified);
}

#[test]
fn test_modify_of_missing_file_is_conflict() {
    let (ws, run) = ready_run();
    ws.remove(POLICY_PATH);

    let record = execute_apply_rollback(
        &ApplyRequest::apply(&run.bundle, ws.path())
            .with_capabilities(["fs.write"])
            .executing(),
        &fixed_hooks(),
    )
    .unwrap();

    assert_conflict_at_preconditions(&record);
    assert!(!ws.exists(POLICY_PATH));
}

#[test]
fn test_create_over_existing_file_is_conflict() {
    let (ws, run) = create_run();
    ws.write(NEW_DOC, "written elsewhere\n");

    let record = execute_apply_rollback(
        &ApplyRequest::apply(&run.bundle, ws.path())
            .with_capabilities(["fs.write"])
            .executing(),
        &fixed_hooks(),
    )
    .unwrap();

    assert_conflict_at_preconditions(&record);
    assert_eq!(ws.read(NEW_DOC), "written elsewhere\n");
}

#[test]
fn test_rollback_of_create_removes_new_directories() {
    let (ws, run) = create_run();
    let applied = executed_apply(&ws, &run);
    assert!(ws.read(NEW_DOC).starts_with("# agp-applied"));

    let record = rollback(&ws, &run, &applied);
    assert_eq!(record.payload().decision.decision, Decision::Continue);
    assert_eq!(record.payload().restored_to_prior_state, Some(true));
    assert!(!ws.exists(NEW_DOC));
    assert!(!ws.exists("docs"));
    assert_eq!(ws.read("README.md"), "# Demo\n");
}

#[test]
fn test_rollback_with_different_changed_paths_is_conflict() {
    let (ws, run) = ready_run();
    let applied = executed_apply(&ws, &run);
    let modified = ws.read(POLICY_PATH);

    let mut payload = applied.payload().clone();
    payload.changed_paths[0].path = WorkspacePath::parse("README.md").unwrap();
    let prior = reseal(&applied, payload);

    let record = rollback(&ws, &run, &prior);
    assert_conflict_at_preconditions(&record);
    assert_eq!(ws.read(POLICY_PATH), modified);
}

#[test]
fn test_rollback_with_uncovered_prior_snapshot_is_conflict() {
    let (ws, run) = ready_run();
    let applied = executed_apply(&ws, &run);
    let modified = ws.read(POLICY_PATH);

    let mut payload = applied.payload().clone();
    payload.pre_state = StateSnapshot::from_entries(Vec::new()).unwrap();
    let prior = reseal(&applied, payload);

    let record = rollback(&ws, &run, &prior);
    assert_conflict_at_preconditions(&record);
    assert_eq!(ws.read(POLICY_PATH), modified);
}

#[test]
fn test_blocked_path_stops() {
    let (ws, run) = ready_run();
    let record = execute_apply_rollback(
        &ApplyRequest::apply(&run.bundle, ws.path())
            .with_capabilities(["fs.write"])
            .with_policy(ApplyPolicy::default().with_blocked("policies/**"))
            .executing(),
        &fixed_hooks(),
    )
    .unwrap();

    assert_eq!(record.payload().decision.reason_code, ApplyReason::ForbiddenPath);
    assert!(!record.payload().executed);
    assert_eq!(ws.read(POLICY_PATH), AGENT_POLICY);
}

#[test]
fn test_escalation_path_needs_approval() {
    let (ws, run) = ready_run();
    let policy = ApplyPolicy::default().with_escalation("**/*.ls");

    let pending = execute_apply_rollback(
        &ApplyRequest::apply(&run.bundle, ws.path())
            .with_capabilities(["fs.write"])
            .with_policy(policy.clone()),
        &fixed_hooks(),
    )
    .unwrap();
    assert_eq!(pending.payload().decision.decision, Decision::Escalate);
    assert_eq!(pending.payload().decision.reason_code, ApplyReason::ApprovalRequired);

    let approved = execute_apply_rollback(
        &ApplyRequest::apply(&run.bundle, ws.path())
            .with_capabilities(["fs.write"])
            .with_policy(policy)
            .with_approval(ApprovalEvidence {
                approver: Some("reviewer".to_string()),
                evidence_ref: "review://approvals/7".to_string(),
            }),
        &fixed_hooks(),
    )
    .unwrap();
    assert_eq!(approved.payload().decision.decision, Decision::Continue);
    assert_eq!(
        approved.payload().policy.approval_evidence_ref.as_deref(),
        Some("review://approvals/7")
    );
}

#[test]
fn test_disallowed_action_is_policy_blocked() {
    let (ws, run) = ready_run();
    let record = execute_apply_rollback(
        &ApplyRequest::apply(&run.bundle, ws.path())
            .with_capabilities(["fs.write"])
            .with_policy(ApplyPolicy::default().with_allowed_actions(vec![ApplyAction::Rollback])),
        &fixed_hooks(),
    )
    .unwrap();
    assert_eq!(record.payload().decision.reason_code, ApplyReason::PolicyBlocked);
}

#[test]
fn test_benchmark_gate() {
    let (ws, run) = ready_run();
    let request = |benchmark: BenchmarkEvidence| {
        execute_apply_rollback(
            &ApplyRequest::apply(&run.bundle, ws.path())
                .with_capabilities(["fs.write"])
                .with_benchmark(benchmark),
            &fixed_hooks(),
        )
        .unwrap()
    };

    let floor = request(BenchmarkEvidence {
        enforce: true,
        quality_floor_met: false,
        valid_gain: true,
        evidence_ref: None,
    });
    assert_eq!(floor.payload().decision.reason_code, ApplyReason::BenchmarkQualityFloor);

    let gain = request(BenchmarkEvidence {
        enforce: true,
        quality_floor_met: true,
        valid_gain: false,
        evidence_ref: None,
    });
    assert_eq!(gain.payload().decision.reason_code, ApplyReason::BenchmarkInvalidGain);

    let unenforced = request(BenchmarkEvidence {
        enforce: false,
        quality_floor_met: false,
        valid_gain: false,
        evidence_ref: None,
    });
    assert_eq!(unenforced.payload().decision.decision, Decision::Continue);
}

#[test]
fn test_expected_pre_state_mismatch_is_conflict() {
    let (ws, run) = ready_run();
    let record = execute_apply_rollback(
        &ApplyRequest::apply(&run.bundle, ws.path())
            .with_capabilities(["fs.write"])
            .with_expected_pre_state(Sha256Digest::compute(b"something else"))
            .executing(),
        &fixed_hooks(),
    )
    .unwrap();

    assert_eq!(record.payload().decision.reason_code, ApplyReason::ConflictDetected);
    assert_eq!(record.payload().gates.last().map(|g| g.gate), Some(Gate::Preconditions));
    assert_eq!(ws.read(POLICY_PATH), AGENT_POLICY);
}

#[test]
fn test_unready_bundle_blocks_apply() {
    let ws = read_docs_workspace();
    let run = run_to_bundle(&ws, READ_DOCS_INTENT, Vec::new());
    let record = execute_apply_rollback(
        &ApplyRequest::apply(&run.bundle, ws.path())
            .with_capabilities(["fs.write"])
            .executing(),
        &fixed_hooks(),
    )
    .unwrap();

    let payload = record.payload();
    assert_eq!(payload.decision.decision, Decision::Stop);
    assert_eq!(payload.decision.reason_code, ApplyReason::VerificationIncomplete);
    assert_eq!(payload.gates.len(), 1);
    assert_eq!(payload.gates[0].gate, Gate::Upstream);
    assert_eq!(ws.read(POLICY_PATH), AGENT_POLICY);
}
