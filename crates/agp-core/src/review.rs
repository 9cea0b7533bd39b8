//! Review Bundle stage
//!
//! Packages a patch run with its lineage, a reverse-patch rollback package
//! and a readiness verdict over the sections a reviewer needs.

use crate::config::{canonical_set, ReviewConfig, REVERSE_PATCH_STRATEGY};
use crate::edit::{Edit, EditOperation};
use crate::error::ReviewBundleError;
use crate::hooks::Hooks;
use crate::intent::IntentMapping;
use crate::patch::{PatchRun, VerificationSummary};
use crate::plan::SafeDiffPlan;
use crate::reason::{BundleReason, PatchReason};
use crate::snapshot::WorkspaceSnapshot;
use agp_artifact::{
    Artifact, ArtifactError, ArtifactKind, Decision, DecisionRecord, EnvelopeHeader, GlobCache,
    Sha256Digest,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Risk note attached to every derived bundle
pub const PLACEHOLDER_RISK_NOTE: &str =
    "patch bodies are placeholder metadata, not textual diffs; inspect target files before applying";

/// One inverted edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollbackEdit {
    pub path: String,
    /// Operation that undoes `source_operation`
    pub operation: EditOperation,
    pub source_operation: EditOperation,
}

/// Reverse-patch rollback package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollbackPackage {
    pub strategy: String,
    pub supported: bool,
    pub edits: Vec<RollbackEdit>,
    pub instructions: Vec<String>,
    /// `sha256(JSON{strategy, edits})`
    pub digest: Sha256Digest,
}

#[derive(Serialize)]
struct RollbackDigestMaterial<'a> {
    strategy: &'a str,
    edits: &'a [RollbackEdit],
}

impl RollbackPackage {
    /// Derive the package for `edits`
    ///
    /// # Errors
    /// Returns error if the digest material cannot be serialized
    pub fn derive(strategy: &str, edits: &[Edit]) -> Result<Self, ArtifactError> {
        let supported = strategy == REVERSE_PATCH_STRATEGY && !edits.is_empty();
        let edits: Vec<RollbackEdit> = if supported {
            edits
                .iter()
                .map(|edit| RollbackEdit {
                    path: edit.path.clone(),
                    operation: edit.operation.inverse(),
                    source_operation: edit.operation,
                })
                .collect()
        } else {
            Vec::new()
        };
        let instructions = edits
            .iter()
            .map(|edit| match edit.operation {
                EditOperation::Delete => format!("delete {}", edit.path),
                EditOperation::Create => {
                    format!("recreate {} from the pre-apply state snapshot", edit.path)
                }
                EditOperation::Modify => {
                    format!("restore {} from the pre-apply state snapshot", edit.path)
                }
            })
            .collect();
        let digest = Self::compute_digest(strategy, &edits)?;
        Ok(Self {
            strategy: strategy.to_string(),
            supported,
            edits,
            instructions,
            digest,
        })
    }

    /// Digest over strategy and edits
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn compute_digest(
        strategy: &str,
        edits: &[RollbackEdit],
    ) -> Result<Sha256Digest, ArtifactError> {
        Ok(Sha256Digest::compute_json(&RollbackDigestMaterial { strategy, edits })?)
    }

    /// Recompute and compare the stored digest
    ///
    /// # Errors
    /// Returns error on mismatch
    pub fn verify(&self) -> Result<(), ArtifactError> {
        Self::compute_digest(&self.strategy, &self.edits)?.expect_matches(&self.digest)?;
        Ok(())
    }
}

/// Reviewable section
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessSection {
    Digest,
    Patch,
    Summary,
    Rationale,
    RiskNotes,
    VerificationEvidence,
    VerificationPassed,
    RollbackPackage,
    RollbackInstructions,
    Lineage,
}

impl ReadinessSection {
    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Digest => "digest",
            Self::Patch => "patch",
            Self::Summary => "summary",
            Self::Rationale => "rationale",
            Self::RiskNotes => "risk_notes",
            Self::VerificationEvidence => "verification_evidence",
            Self::VerificationPassed => "verification_passed",
            Self::RollbackPackage => "rollback_package",
            Self::RollbackInstructions => "rollback_instructions",
            Self::Lineage => "lineage",
        }
    }
}

/// Readiness verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Readiness {
    pub ready: bool,
    pub present: Vec<ReadinessSection>,
    pub missing: Vec<ReadinessSection>,
}

impl Readiness {
    fn from_checks(checks: [(ReadinessSection, bool); 10]) -> Self {
        let (present, missing): (Vec<_>, Vec<_>) = checks.into_iter().partition(|(_, ok)| *ok);
        let missing: Vec<ReadinessSection> = missing.into_iter().map(|(s, _)| s).collect();
        Self {
            ready: missing.is_empty(),
            present: present.into_iter().map(|(s, _)| s).collect(),
            missing,
        }
    }
}

/// Artifact ids of the reviewed lineage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineageChain {
    pub snapshot_id: Option<String>,
    pub mapping_id: Option<String>,
    pub plan_id: Option<String>,
    pub patch_run_id: String,
}

impl LineageChain {
    fn is_complete(&self) -> bool {
        self.snapshot_id.is_some() && self.mapping_id.is_some() && self.plan_id.is_some()
    }
}

/// Review bundle payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewBundlePayload {
    pub decision: DecisionRecord<BundleReason>,
    pub intent: String,
    pub patch_decision: Decision,
    pub patch_digest: Sha256Digest,
    pub hunk_count: usize,
    pub edits: Vec<Edit>,
    pub summary: String,
    pub rationale: String,
    pub risk_notes: Vec<String>,
    pub verification: VerificationSummary,
    pub rollback: RollbackPackage,
    pub readiness: Readiness,
    pub lineage: LineageChain,
}

/// Review bundle trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewBundleTrace {
    /// Sections filled in by derivation rather than by the caller
    pub derived: Vec<ReadinessSection>,
}

/// Review bundle artifact kind
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewBundleKind;

impl agp_artifact::__private::Sealed for ReviewBundleKind {}

impl ArtifactKind for ReviewBundleKind {
    type Trace = ReviewBundleTrace;
    type Payload = ReviewBundlePayload;

    const TYPE_ID: &'static str = "review_bundle";
    const ID_PREFIX: &'static str = "prb";

    fn validate_payload(payload: &Self::Payload) -> Result<(), ArtifactError> {
        payload.rollback.verify()?;
        if payload.readiness.ready != payload.readiness.missing.is_empty() {
            return Err(ArtifactError::InvariantViolation(
                "readiness verdict disagrees with missing sections".to_string(),
            ));
        }
        if payload.decision.is_continue() && !payload.readiness.ready {
            return Err(ArtifactError::InvariantViolation(
                "a continue bundle must be ready".to_string(),
            ));
        }
        Ok(())
    }
}

/// Review bundle artifact
pub type ReviewBundle = Artifact<ReviewBundleKind>;

/// Review bundle request
#[derive(Debug, Clone)]
pub struct ReviewBundleRequest<'a> {
    pub patch_run: &'a PatchRun,
    pub plan: Option<&'a SafeDiffPlan>,
    pub mapping: Option<&'a IntentMapping>,
    pub snapshot: Option<&'a WorkspaceSnapshot>,
    pub summary: Option<String>,
    pub rationale: Option<String>,
    pub risk_notes: Option<Vec<String>>,
    pub config: ReviewConfig,
}

impl<'a> ReviewBundleRequest<'a> {
    /// Request for a bare patch run
    #[must_use]
    pub fn new(patch_run: &'a PatchRun) -> Self {
        Self {
            patch_run,
            plan: None,
            mapping: None,
            snapshot: None,
            summary: None,
            rationale: None,
            risk_notes: None,
            config: ReviewConfig::default(),
        }
    }

    /// With the full upstream lineage
    #[must_use]
    pub fn with_lineage(
        mut self,
        snapshot: &'a WorkspaceSnapshot,
        mapping: &'a IntentMapping,
        plan: &'a SafeDiffPlan,
    ) -> Self {
        self.snapshot = Some(snapshot);
        self.mapping = Some(mapping);
        self.plan = Some(plan);
        self
    }

    /// With caller-written review text
    #[must_use]
    pub fn with_notes(
        mut self,
        summary: impl Into<String>,
        rationale: impl Into<String>,
        risk_notes: Vec<String>,
    ) -> Self {
        self.summary = Some(summary.into());
        self.rationale = Some(rationale.into());
        self.risk_notes = Some(risk_notes);
        self
    }

    /// With configuration
    #[must_use]
    pub fn with_config(mut self, config: ReviewConfig) -> Self {
        self.config = config;
        self
    }
}

fn invalid(artifact_type: &'static str) -> impl FnOnce(ArtifactError) -> ReviewBundleError {
    move |source| ReviewBundleError::InvalidInput {
        artifact_type,
        source,
    }
}

fn check_lineage(request: &ReviewBundleRequest<'_>) -> Result<LineageChain, ReviewBundleError> {
    let patch_run = request.patch_run;
    let run_id = patch_run.run_id();
    let same_run = |kind: &str, other: &str| {
        if other == run_id {
            Ok(())
        } else {
            Err(ReviewBundleError::LineageMismatch(format!(
                "{kind} run_id {other} differs from patch run {run_id}"
            )))
        }
    };

    if let Some(plan) = request.plan {
        same_run("plan", plan.run_id())?;
        if !patch_run.references(plan.id()) {
            return Err(ReviewBundleError::LineageMismatch(format!(
                "patch run {} does not reference plan {}",
                patch_run.id(),
                plan.id()
            )));
        }
        if plan.payload().edits != patch_run.payload().edits {
            return Err(ReviewBundleError::LineageMismatch(
                "plan edits differ from patch run edits".to_string(),
            ));
        }
    }
    if let Some(mapping) = request.mapping {
        same_run("mapping", mapping.run_id())?;
        let plan = request.plan.ok_or_else(|| {
            ReviewBundleError::LineageMismatch("mapping supplied without its plan".to_string())
        })?;
        if !plan.references(mapping.id()) {
            return Err(ReviewBundleError::LineageMismatch(format!(
                "plan {} does not reference mapping {}",
                plan.id(),
                mapping.id()
            )));
        }
    }
    if let Some(snapshot) = request.snapshot {
        same_run("snapshot", snapshot.run_id())?;
        let mapping = request.mapping.ok_or_else(|| {
            ReviewBundleError::LineageMismatch("snapshot supplied without its mapping".to_string())
        })?;
        if !mapping.references(snapshot.id()) {
            return Err(ReviewBundleError::LineageMismatch(format!(
                "mapping {} does not reference snapshot {}",
                mapping.id(),
                snapshot.id()
            )));
        }
    }

    Ok(LineageChain {
        snapshot_id: request.snapshot.map(|a| a.id().to_string()),
        mapping_id: request.mapping.map(|a| a.id().to_string()),
        plan_id: request.plan.map(|a| a.id().to_string()),
        patch_run_id: patch_run.id().to_string(),
    })
}

fn non_blank(field: &str, value: &str) -> Result<String, ReviewBundleError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ReviewBundleError::InvalidRequest(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}

fn derive_summary(intent: &str, edits: &[Edit]) -> String {
    let count = |op: EditOperation| edits.iter().filter(|e| e.operation == op).count();
    format!(
        "{intent} ({} create, {} modify, {} delete)",
        count(EditOperation::Create),
        count(EditOperation::Modify),
        count(EditOperation::Delete)
    )
}

fn derive_rationale(edits: &[Edit]) -> String {
    edits
        .iter()
        .map(|e| format!("{}: {}", e.path, e.single_line_justification()))
        .collect::<Vec<_>>()
        .join("; ")
}

fn derive_risk_notes(
    edits: &[Edit],
    sensitive: &[String],
    globs: &GlobCache,
) -> Result<Vec<String>, ReviewBundleError> {
    let mut notes = vec![PLACEHOLDER_RISK_NOTE.to_string()];
    for edit in edits {
        if let Some(pattern) = globs.first_match(sensitive, &edit.path)? {
            notes.push(format!("{} is policy-sensitive ({pattern})", edit.path));
        }
    }
    Ok(notes)
}

fn decide(
    readiness: &Readiness,
    patch: &DecisionRecord<PatchReason>,
    verification: &VerificationSummary,
    rollback: &RollbackPackage,
) -> DecisionRecord<BundleReason> {
    if readiness.ready {
        return DecisionRecord::inherit(patch, BundleReason::from, "bundle ready for review");
    }
    let missing = readiness
        .missing
        .iter()
        .map(ReadinessSection::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    if verification.evaluated && !verification.incomplete_checks.is_empty() {
        return DecisionRecord::stop(
            BundleReason::VerificationIncomplete,
            format!("verification incomplete; missing: {missing}"),
        );
    }
    if verification.evaluated && !verification.failing_checks.is_empty() {
        return DecisionRecord::stop(
            BundleReason::VerificationFailed,
            format!("verification failed; missing: {missing}"),
        );
    }
    if patch.decision.is_blocking() {
        return DecisionRecord::stop(
            BundleReason::from(patch.reason_code),
            format!("patch run blocked ({}); missing: {missing}", patch.reason_detail),
        );
    }
    if !rollback.supported {
        return DecisionRecord::stop(
            BundleReason::RollbackUnavailable,
            format!("no rollback package; missing: {missing}"),
        );
    }
    DecisionRecord::stop(BundleReason::BundleIncomplete, format!("missing: {missing}"))
}

/// Assemble a review bundle for a patch run
///
/// # Errors
/// Returns error if the patch digest does not recompute, any supplied
/// artifact fails verification, the lineage is inconsistent, or supplied
/// review text is blank
pub fn assemble_review_bundle(
    request: &ReviewBundleRequest<'_>,
    hooks: &Hooks,
) -> Result<ReviewBundle, ReviewBundleError> {
    let strategy = non_blank("rollback_strategy", &request.config.rollback_strategy)?;
    let sensitive = canonical_set(request.config.policy_sensitive_paths.iter().cloned());
    let globs = GlobCache::new();
    globs.validate_all(&sensitive)?;

    let patch_run = request.patch_run;
    let patch = &patch_run.payload().patch;
    let recomputed = patch.recompute_digest();
    if recomputed != patch.digest {
        return Err(ReviewBundleError::PatchDigestMismatch {
            recorded: patch.digest.to_string(),
            recomputed: recomputed.to_string(),
        });
    }

    patch_run.verify().map_err(invalid("patch_run"))?;
    if let Some(plan) = request.plan {
        plan.verify().map_err(invalid("safe_diff_plan"))?;
    }
    if let Some(mapping) = request.mapping {
        mapping.verify().map_err(invalid("intent_mapping"))?;
    }
    if let Some(snapshot) = request.snapshot {
        snapshot.verify().map_err(invalid("workspace_snapshot"))?;
    }
    let lineage = check_lineage(request)?;

    let upstream = patch_run.payload();
    let edits = &upstream.edits;
    let mut derived = Vec::new();

    let summary = match &request.summary {
        Some(text) => non_blank("summary", text)?,
        None => {
            derived.push(ReadinessSection::Summary);
            derive_summary(&upstream.intent, edits)
        }
    };
    let rationale = match &request.rationale {
        Some(text) => non_blank("rationale", text)?,
        None => {
            derived.push(ReadinessSection::Rationale);
            derive_rationale(edits)
        }
    };
    let risk_notes = match &request.risk_notes {
        Some(notes) => notes
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect(),
        None => {
            derived.push(ReadinessSection::RiskNotes);
            derive_risk_notes(edits, &sensitive, &globs)?
        }
    };

    let rollback = RollbackPackage::derive(&strategy, edits).map_err(ReviewBundleError::Seal)?;
    let verification = upstream.verification.clone();

    let readiness = Readiness::from_checks([
        (
            ReadinessSection::Digest,
            recomputed == patch.digest && recomputed != Sha256Digest::compute(b""),
        ),
        (ReadinessSection::Patch, patch.hunk_count > 0),
        (ReadinessSection::Summary, !summary.is_empty()),
        (ReadinessSection::Rationale, !rationale.is_empty()),
        (ReadinessSection::RiskNotes, !risk_notes.is_empty()),
        (ReadinessSection::VerificationEvidence, !verification.evidence_refs.is_empty()),
        (
            ReadinessSection::VerificationPassed,
            verification.evaluated && verification.all_passed,
        ),
        (ReadinessSection::RollbackPackage, rollback.supported),
        (ReadinessSection::RollbackInstructions, !rollback.instructions.is_empty()),
        (ReadinessSection::Lineage, lineage.is_complete()),
    ]);
    if !readiness.ready {
        warn!(missing = ?readiness.missing, "review bundle incomplete");
    }
    let decision = decide(&readiness, &upstream.decision, &verification, &rollback);

    let mut inputs = vec![patch_run.reference()];
    inputs.extend(request.plan.map(Artifact::reference));
    inputs.extend(request.mapping.map(Artifact::reference));
    inputs.extend(request.snapshot.map(Artifact::reference));

    let payload = ReviewBundlePayload {
        decision,
        intent: upstream.intent.clone(),
        patch_decision: upstream.decision.decision,
        patch_digest: patch.digest,
        hunk_count: patch.hunk_count,
        edits: edits.clone(),
        summary,
        rationale,
        risk_notes,
        verification,
        rollback,
        readiness,
        lineage,
    };
    let artifact: ReviewBundle = Artifact::seal(
        EnvelopeHeader::new(patch_run.run_id(), hooks.now_utc()),
        inputs,
        ReviewBundleTrace { derived },
        payload,
    )
    .map_err(ReviewBundleError::Seal)?;

    info!(
        artifact_id = artifact.id(),
        ready = artifact.payload().readiness.ready,
        decision = %artifact.payload().decision.decision,
        reason_code = %artifact.payload().decision.reason_code,
        "review bundle assembled"
    );
    Ok(artifact)
}
