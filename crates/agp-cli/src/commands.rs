//! Subcommand handlers
//!
//! Each handler reads its input artifacts (verifying them), runs one stage
//! and writes the sealed artifact. Stage errors are wrapped in
//! [`PipelineError`] so `main` can report their stable code.

use crate::io::{emit, read_artifact, read_json, read_list, read_object};
use agp_artifact::{Artifact, ArtifactError, ArtifactKind, Decision, Sha256Digest};
use agp_core::apply::ApplyRecordKind;
use agp_core::intent::IntentMappingKind;
use agp_core::patch::PatchRunKind;
use agp_core::plan::SafeDiffPlanKind;
use agp_core::review::ReviewBundleKind;
use agp_core::snapshot::WorkspaceSnapshotKind;
use agp_core::{
    assemble_review_bundle, capture_workspace_snapshot, execute_apply_rollback, map_intent,
    plan_safe_diff, run_patch, ApplyRequest, ApprovalEvidence, BenchmarkEvidence, Edit, Hooks,
    MappingRequest, PatchRunRequest, PipelineConfig, PipelineError, PlaceholderMaterializer,
    PlanRequest, ReviewBundleRequest, SnapshotRequest, VerificationResult,
};
use agp_workspace::{default_parsers, VcsProbe};
use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration file looked up in the workspace root
pub const DEFAULT_CONFIG_FILE: &str = "agp.toml";

/// Result of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub artifact_id: String,
    pub artifact_type: &'static str,
    pub decision: Decision,
}

impl Outcome {
    fn of<K: ArtifactKind>(artifact: &Artifact<K>, decision: Decision) -> Self {
        Self {
            artifact_id: artifact.id().to_string(),
            artifact_type: K::TYPE_ID,
            decision,
        }
    }

    /// 0 for continue, 1 for escalate or stop
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.decision.is_blocking())
    }
}

/// Load `--config`, else `agp.toml` under `root`, else defaults
///
/// # Errors
/// Returns error if a config file exists but is unreadable or invalid
pub fn load_config(explicit: Option<&Path>, root: &Path) -> Result<PipelineConfig> {
    if let Some(path) = explicit {
        debug!(path = %path.display(), "loading config");
        return PipelineConfig::load(path)
            .map_err(PipelineError::from)
            .with_context(|| format!("config {}", path.display()));
    }
    let default = root.join(DEFAULT_CONFIG_FILE);
    if default.is_file() {
        debug!(path = %default.display(), "loading workspace config");
        return PipelineConfig::load(&default)
            .map_err(PipelineError::from)
            .with_context(|| format!("config {}", default.display()));
    }
    Ok(PipelineConfig::default())
}

fn path_arg<'m>(args: &'m ArgMatches, name: &str) -> Result<&'m Path> {
    args.get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .with_context(|| format!("missing --{name}"))
}

fn text_arg(args: &ArgMatches, name: &str) -> Option<String> {
    args.get_one::<String>(name).cloned()
}

fn capabilities(args: &ArgMatches) -> Vec<String> {
    args.get_many::<String>("capability")
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

/// Dispatch a parsed command line
///
/// `vcs` answers the snapshot's version-control queries.
///
/// # Errors
/// Returns error for unreadable or unverifiable inputs and stage contract
/// violations; blocked decisions are reported through [`Outcome`]
pub fn run(matches: &ArgMatches, hooks: &Hooks, vcs: &dyn VcsProbe) -> Result<Outcome> {
    let (name, args) = matches.subcommand().context("missing subcommand")?;
    let out = args.get_one::<PathBuf>("out").map(PathBuf::as_path);
    let root = args
        .try_get_one::<PathBuf>("root")
        .ok()
        .flatten()
        .map_or_else(|| PathBuf::from("."), Clone::clone);
    let config = load_config(args.get_one::<PathBuf>("config").map(PathBuf::as_path), &root)?;

    let outcome = match name {
        "snapshot" => snapshot(args, &root, &config, hooks, vcs, out)?,
        "map" => map(args, &config, hooks, out)?,
        "plan" => plan(args, &config, hooks, out)?,
        "patch" => patch(args, &config, hooks, out)?,
        "bundle" => bundle(args, &config, hooks, out)?,
        "apply" => apply(args, &root, &config, hooks, out)?,
        "rollback" => rollback(args, &root, &config, hooks, out)?,
        "verify" => verify(path_arg(args, "artifact")?)?,
        other => bail!("unknown subcommand '{other}'"),
    };
    info!(
        command = name,
        artifact_id = %outcome.artifact_id,
        decision = %outcome.decision,
        "command finished"
    );
    Ok(outcome)
}

fn snapshot(
    args: &ArgMatches,
    root: &Path,
    config: &PipelineConfig,
    hooks: &Hooks,
    vcs: &dyn VcsProbe,
    out: Option<&Path>,
) -> Result<Outcome> {
    let mut request = SnapshotRequest::new(root).with_config(config.snapshot.clone());
    if let Some(run_id) = text_arg(args, "run-id") {
        request = request.with_run_id(run_id);
    }
    let snapshot =
        capture_workspace_snapshot(&request, vcs, hooks).map_err(PipelineError::from)?;
    emit(&snapshot, out)?;
    Ok(Outcome::of(&snapshot, snapshot.payload().decision.decision))
}

fn map(
    args: &ArgMatches,
    config: &PipelineConfig,
    hooks: &Hooks,
    out: Option<&Path>,
) -> Result<Outcome> {
    let snapshot = read_artifact::<WorkspaceSnapshotKind>(path_arg(args, "snapshot")?)?;
    let intent = text_arg(args, "intent").context("missing --intent")?;
    let request = MappingRequest::new(&snapshot, intent).with_options(config.mapping.clone());
    let mapping = map_intent(&request, &default_parsers(), hooks).map_err(PipelineError::from)?;
    emit(&mapping, out)?;
    Ok(Outcome::of(&mapping, mapping.payload().decision.decision))
}

fn plan(
    args: &ArgMatches,
    config: &PipelineConfig,
    hooks: &Hooks,
    out: Option<&Path>,
) -> Result<Outcome> {
    let mapping = read_artifact::<IntentMappingKind>(path_arg(args, "mapping")?)?;
    let mut request = PlanRequest::new(&mapping).with_config(config.plan.clone());
    if let Some(path) = args.get_one::<PathBuf>("edits") {
        request = request.with_edits(read_list::<Edit>(path)?);
    }
    let plan = plan_safe_diff(&request, hooks).map_err(PipelineError::from)?;
    emit(&plan, out)?;
    Ok(Outcome::of(&plan, plan.payload().decision.decision))
}

fn patch(
    args: &ArgMatches,
    config: &PipelineConfig,
    hooks: &Hooks,
    out: Option<&Path>,
) -> Result<Outcome> {
    let plan = read_artifact::<SafeDiffPlanKind>(path_arg(args, "plan")?)?;
    let results = match args.get_one::<PathBuf>("results") {
        Some(path) => read_list::<VerificationResult>(path)?,
        None => Vec::new(),
    };
    let request = PatchRunRequest::new(&plan)
        .with_results(results)
        .with_config(config.patch.clone());
    let patch_run =
        run_patch(&request, &PlaceholderMaterializer, hooks).map_err(PipelineError::from)?;
    emit(&patch_run, out)?;
    Ok(Outcome::of(&patch_run, patch_run.payload().decision.decision))
}

fn bundle(
    args: &ArgMatches,
    config: &PipelineConfig,
    hooks: &Hooks,
    out: Option<&Path>,
) -> Result<Outcome> {
    // Read without verifying; the stage checks the patch digest first.
    let patch_path = path_arg(args, "patch-run")?;
    let patch_run: Artifact<PatchRunKind> = read_object(patch_path)?;
    let plan = args
        .get_one::<PathBuf>("plan")
        .map(|p| read_artifact::<SafeDiffPlanKind>(p))
        .transpose()?;
    let mapping = args
        .get_one::<PathBuf>("mapping")
        .map(|p| read_artifact::<IntentMappingKind>(p))
        .transpose()?;
    let snapshot = args
        .get_one::<PathBuf>("snapshot")
        .map(|p| read_artifact::<WorkspaceSnapshotKind>(p))
        .transpose()?;

    let request = ReviewBundleRequest {
        plan: plan.as_ref(),
        mapping: mapping.as_ref(),
        snapshot: snapshot.as_ref(),
        summary: text_arg(args, "summary"),
        rationale: text_arg(args, "rationale"),
        risk_notes: args
            .get_many::<String>("risk-note")
            .map(|notes| notes.cloned().collect()),
        ..ReviewBundleRequest::new(&patch_run).with_config(config.review.clone())
    };
    let bundle = assemble_review_bundle(&request, hooks).map_err(PipelineError::from)?;
    emit(&bundle, out)?;
    Ok(Outcome::of(&bundle, bundle.payload().decision.decision))
}

fn apply(
    args: &ArgMatches,
    root: &Path,
    config: &PipelineConfig,
    hooks: &Hooks,
    out: Option<&Path>,
) -> Result<Outcome> {
    let bundle = read_artifact::<ReviewBundleKind>(path_arg(args, "bundle")?)?;
    let mut request = ApplyRequest::apply(&bundle, root)
        .with_capabilities(capabilities(args))
        .with_policy(config.apply.clone());
    if args.get_flag("execute") {
        request = request.executing();
    }
    if let Some(evidence_ref) = text_arg(args, "approval-ref") {
        request = request.with_approval(ApprovalEvidence {
            approver: text_arg(args, "approver"),
            evidence_ref,
        });
    }
    if let Some(path) = args.get_one::<PathBuf>("benchmark") {
        request = request.with_benchmark(read_object::<BenchmarkEvidence>(path)?);
    }
    if let Some(raw) = text_arg(args, "expected-pre-state") {
        let digest: Sha256Digest = raw
            .parse()
            .with_context(|| format!("invalid --expected-pre-state '{raw}'"))?;
        request = request.with_expected_pre_state(digest);
    }
    let record = execute_apply_rollback(&request, hooks).map_err(PipelineError::from)?;
    emit(&record, out)?;
    Ok(Outcome::of(&record, record.payload().decision.decision))
}

fn rollback(
    args: &ArgMatches,
    root: &Path,
    config: &PipelineConfig,
    hooks: &Hooks,
    out: Option<&Path>,
) -> Result<Outcome> {
    let bundle = read_artifact::<ReviewBundleKind>(path_arg(args, "bundle")?)?;
    // Verified by the stage so a corrupted snapshot surfaces as its error.
    let prior: Artifact<ApplyRecordKind> = read_object(path_arg(args, "prior")?)?;
    let mut request = ApplyRequest::rollback(&bundle, root, &prior)
        .with_capabilities(capabilities(args))
        .with_policy(config.apply.clone());
    if args.get_flag("execute") {
        request = request.executing();
    }
    let record = execute_apply_rollback(&request, hooks).map_err(PipelineError::from)?;
    emit(&record, out)?;
    Ok(Outcome::of(&record, record.payload().decision.decision))
}

fn verify_as<K: ArtifactKind>(value: Value) -> Result<String, ArtifactError> {
    Artifact::<K>::from_value(value).map(|artifact| artifact.id().to_string())
}

/// Verify any artifact by its declared type
///
/// # Errors
/// Returns error if the type is unknown or verification fails
pub fn verify(path: &Path) -> Result<Outcome> {
    let value = read_json(path)?;
    let declared = value
        .get("artifact_type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let decision = value
        .pointer("/payload/decision/decision")
        .cloned()
        .map(serde_json::from_value::<Decision>)
        .transpose()
        .context("unreadable payload decision")?
        .unwrap_or(Decision::Continue);

    let (artifact_type, verifier): (&'static str, fn(Value) -> Result<String, ArtifactError>) =
        match declared.as_str() {
            t if t == WorkspaceSnapshotKind::TYPE_ID => {
                (WorkspaceSnapshotKind::TYPE_ID, verify_as::<WorkspaceSnapshotKind>)
            }
            t if t == IntentMappingKind::TYPE_ID => {
                (IntentMappingKind::TYPE_ID, verify_as::<IntentMappingKind>)
            }
            t if t == SafeDiffPlanKind::TYPE_ID => {
                (SafeDiffPlanKind::TYPE_ID, verify_as::<SafeDiffPlanKind>)
            }
            t if t == PatchRunKind::TYPE_ID => (PatchRunKind::TYPE_ID, verify_patch_run),
            t if t == ReviewBundleKind::TYPE_ID => {
                (ReviewBundleKind::TYPE_ID, verify_as::<ReviewBundleKind>)
            }
            t if t == ApplyRecordKind::TYPE_ID => {
                (ApplyRecordKind::TYPE_ID, verify_as::<ApplyRecordKind>)
            }
            other => bail!("{}: unknown artifact_type '{other}'", path.display()),
        };
    let artifact_id = verifier(value)
        .map_err(PipelineError::from)
        .with_context(|| format!("{} failed verification", path.display()))?;
    info!(artifact_id = %artifact_id, artifact_type, "artifact verified");
    Ok(Outcome {
        artifact_id,
        artifact_type,
        decision,
    })
}

fn verify_patch_run(value: Value) -> Result<String, ArtifactError> {
    let artifact = Artifact::<PatchRunKind>::from_value(value)?;
    let patch = &artifact.payload().patch;
    let recomputed = patch.recompute_digest();
    if recomputed != patch.digest {
        return Err(ArtifactError::InvariantViolation(format!(
            "patch digest {} does not match content ({recomputed})",
            patch.digest
        )));
    }
    Ok(artifact.id().to_string())
}
