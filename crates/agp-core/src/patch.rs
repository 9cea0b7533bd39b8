//! Patch Run stage
//!
//! Materializes one hunk per planned edit through a [`PatchMaterializer`],
//! digests the result and evaluates caller-supplied verification evidence
//! against the required checks.

use crate::config::{canonical_set, PatchRunConfig};
use crate::edit::{Edit, EditOperation};
use crate::error::PatchRunError;
use crate::hooks::Hooks;
use crate::plan::SafeDiffPlan;
use crate::reason::PatchReason;
use agp_artifact::{
    Artifact, ArtifactError, ArtifactKind, Decision, DecisionRecord, EnvelopeHeader, GlobCache,
    Sha256Digest, WorkspacePath,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Produces the diff text for one edit
///
/// The built-in [`PlaceholderMaterializer`] emits structured metadata rather
/// than a textual diff of file contents; real diff engines plug in here.
pub trait PatchMaterializer: Send + Sync {
    /// Identifier recorded in the payload
    fn name(&self) -> &str;

    /// Render one hunk for `edit`, whose path is already validated
    ///
    /// # Errors
    /// Returns [`PatchRunError::Materialize`] when the edit cannot be rendered
    fn materialize(&self, edit: &Edit, path: &WorkspacePath) -> Result<String, PatchRunError>;
}

/// Deterministic metadata-only materializer
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderMaterializer;

impl PatchMaterializer for PlaceholderMaterializer {
    fn name(&self) -> &str {
        "placeholder"
    }

    fn materialize(&self, edit: &Edit, path: &WorkspacePath) -> Result<String, PatchRunError> {
        let old_side = match edit.operation {
            EditOperation::Create => "/dev/null".to_string(),
            _ => format!("a/{path}"),
        };
        let new_side = match edit.operation {
            EditOperation::Delete => "/dev/null".to_string(),
            _ => format!("b/{path}"),
        };
        let lines = [
            format!("diff --git a/{path} b/{path}"),
            format!("--- {old_side}"),
            format!("+++ {new_side}"),
            "@@ -0,0 +1,4 @@".to_string(),
            format!("+# agp: operation={}", edit.operation),
            format!("+# agp: target_id={}", edit.target_id.as_deref().unwrap_or("none")),
            format!("+# agp: symbol_path={}", edit.symbol_path.as_deref().unwrap_or("none")),
            format!("+# agp: justification={}", edit.single_line_justification()),
        ];
        Ok(lines.join("\n"))
    }
}

/// Verification outcome reported by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
    NotRun,
}

/// One verification result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerificationResult {
    pub check: String,
    pub status: CheckStatus,
    #[serde(default)]
    pub evidence_ref: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl VerificationResult {
    /// Passing result with evidence
    #[must_use]
    pub fn passed(check: impl Into<String>, evidence_ref: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            status: CheckStatus::Pass,
            evidence_ref: Some(evidence_ref.into()),
            detail: None,
        }
    }

    /// Result with an arbitrary status and no evidence
    #[must_use]
    pub fn with_status(check: impl Into<String>, status: CheckStatus) -> Self {
        Self {
            check: check.into(),
            status,
            evidence_ref: None,
            detail: None,
        }
    }

    fn evidence(&self) -> Option<&str> {
        self.evidence_ref.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }
}

/// Evaluation of one required check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckEvaluation {
    pub check: String,
    /// `None` when no result was supplied
    pub status: Option<CheckStatus>,
    pub evidence_ref: Option<String>,
    pub complete: bool,
    pub passed: bool,
}

/// Verification block of a patch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerificationSummary {
    /// False when the run never reached verification
    pub evaluated: bool,
    pub required_checks: Vec<String>,
    /// Supplied results after last-wins de-duplication, by check name
    pub results: Vec<VerificationResult>,
    pub checks: Vec<CheckEvaluation>,
    pub incomplete_checks: Vec<String>,
    pub failing_checks: Vec<String>,
    pub all_passed: bool,
    pub evidence_refs: Vec<String>,
}

impl VerificationSummary {
    fn skipped(required_checks: Vec<String>) -> Self {
        Self {
            evaluated: false,
            required_checks,
            results: Vec::new(),
            checks: Vec::new(),
            incomplete_checks: Vec::new(),
            failing_checks: Vec::new(),
            all_passed: false,
            evidence_refs: Vec::new(),
        }
    }

    /// Evaluate supplied results against the required checks
    #[must_use]
    pub fn evaluate(required_checks: Vec<String>, supplied: &[VerificationResult]) -> Self {
        let mut latest: BTreeMap<&str, &VerificationResult> = BTreeMap::new();
        for result in supplied {
            latest.insert(result.check.as_str(), result);
        }

        let checks: Vec<CheckEvaluation> = required_checks
            .iter()
            .map(|check| match latest.get(check.as_str()) {
                None => CheckEvaluation {
                    check: check.clone(),
                    status: None,
                    evidence_ref: None,
                    complete: false,
                    passed: false,
                },
                Some(result) => {
                    let evidence = result.evidence().map(str::to_string);
                    CheckEvaluation {
                        check: check.clone(),
                        status: Some(result.status),
                        complete: evidence.is_some() && result.status != CheckStatus::NotRun,
                        passed: result.status == CheckStatus::Pass,
                        evidence_ref: evidence,
                    }
                }
            })
            .collect();

        let incomplete_checks = checks
            .iter()
            .filter(|c| !c.complete)
            .map(|c| c.check.clone())
            .collect();
        let failing_checks = checks
            .iter()
            .filter(|c| c.status == Some(CheckStatus::Fail))
            .map(|c| c.check.clone())
            .collect();
        let all_passed = checks.iter().all(|c| c.complete && c.passed);
        let evidence_refs = canonical_set(checks.iter().filter_map(|c| c.evidence_ref.clone()));

        Self {
            evaluated: true,
            required_checks,
            results: latest.into_values().cloned().collect(),
            checks,
            incomplete_checks,
            failing_checks,
            all_passed,
            evidence_refs,
        }
    }
}

/// Materialized patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchContent {
    pub content: String,
    /// `sha256(content)`
    pub digest: Sha256Digest,
    pub file_count: usize,
    pub hunk_count: usize,
    pub files: Vec<WorkspacePath>,
}

impl PatchContent {
    fn empty() -> Self {
        Self::from_hunks(Vec::new(), Vec::new())
    }

    fn from_hunks(hunks: Vec<String>, mut files: Vec<WorkspacePath>) -> Self {
        let hunk_count = hunks.len();
        let content = hunks.join("\n");
        files.sort();
        files.dedup();
        Self {
            digest: Sha256Digest::compute(content.as_bytes()),
            content,
            file_count: files.len(),
            hunk_count,
            files,
        }
    }

    /// Recompute the content digest
    #[must_use]
    pub fn recompute_digest(&self) -> Sha256Digest {
        Sha256Digest::compute(self.content.as_bytes())
    }
}

/// Patch run payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchRunPayload {
    pub decision: DecisionRecord<PatchReason>,
    pub intent: String,
    pub materializer: String,
    pub patch: PatchContent,
    /// The plan's edits, unchanged
    pub edits: Vec<Edit>,
    pub verification: VerificationSummary,
    pub policy_sensitive_paths: Vec<String>,
}

/// Patch run trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchRunTrace {
    pub plan_decision: Decision,
    pub supplied_results: usize,
}

/// Patch run artifact kind
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRunKind;

impl agp_artifact::__private::Sealed for PatchRunKind {}

impl ArtifactKind for PatchRunKind {
    type Trace = PatchRunTrace;
    type Payload = PatchRunPayload;

    const TYPE_ID: &'static str = "patch_run";
    const ID_PREFIX: &'static str = "patch";

    fn validate_payload(payload: &Self::Payload) -> Result<(), ArtifactError> {
        if payload.patch.file_count != payload.patch.files.len() {
            return Err(ArtifactError::InvariantViolation(
                "patch file_count does not match files".to_string(),
            ));
        }
        if payload.decision.is_continue() && !payload.verification.all_passed {
            return Err(ArtifactError::InvariantViolation(
                "a continue patch run requires passing verification".to_string(),
            ));
        }
        Ok(())
    }
}

/// Patch run artifact
pub type PatchRun = Artifact<PatchRunKind>;

/// Patch run request
#[derive(Debug, Clone)]
pub struct PatchRunRequest<'a> {
    pub plan: &'a SafeDiffPlan,
    pub verification_results: Vec<VerificationResult>,
    pub config: PatchRunConfig,
}

impl<'a> PatchRunRequest<'a> {
    /// Request with default required checks
    #[must_use]
    pub fn new(plan: &'a SafeDiffPlan) -> Self {
        Self {
            plan,
            verification_results: Vec::new(),
            config: PatchRunConfig::default(),
        }
    }

    /// With verification results
    #[must_use]
    pub fn with_results(mut self, results: Vec<VerificationResult>) -> Self {
        self.verification_results = results;
        self
    }

    /// With configuration
    #[must_use]
    pub fn with_config(mut self, config: PatchRunConfig) -> Self {
        self.config = config;
        self
    }
}

/// Materialize a plan and evaluate its verification evidence
///
/// # Errors
/// Returns error for an unverifiable plan, an edit path escaping the
/// workspace, uncompilable patterns or a materializer failure
pub fn run_patch(
    request: &PatchRunRequest<'_>,
    materializer: &dyn PatchMaterializer,
    hooks: &Hooks,
) -> Result<PatchRun, PatchRunError> {
    request.config.validate().map_err(PatchRunError::InvalidRequest)?;
    let required_checks = canonical_set(request.config.required_checks.iter().cloned());
    let sensitive = canonical_set(request.config.policy_sensitive_paths.iter().cloned());
    let globs = GlobCache::new();
    globs.validate_all(&sensitive)?;

    let plan = request.plan;
    plan.verify().map_err(PatchRunError::InvalidInput)?;
    let upstream = plan.payload();

    let (decision, patch, verification) = if !upstream.decision.is_continue() {
        let decision = DecisionRecord::inherit(
            &upstream.decision,
            PatchReason::from,
            format!("plan blocked: {}", upstream.decision.reason_detail),
        );
        (decision, PatchContent::empty(), VerificationSummary::skipped(required_checks))
    } else if upstream.edits.is_empty() {
        let decision = DecisionRecord::stop(PatchReason::EmptyPlan, "plan contains no edits");
        (decision, PatchContent::empty(), VerificationSummary::skipped(required_checks))
    } else {
        let mut hunks = Vec::with_capacity(upstream.edits.len());
        let mut files = Vec::with_capacity(upstream.edits.len());
        for edit in &upstream.edits {
            let path = WorkspacePath::parse(&edit.path)?;
            hunks.push(materializer.materialize(edit, &path)?);
            files.push(path);
        }
        let patch = PatchContent::from_hunks(hunks, files);
        let verification =
            VerificationSummary::evaluate(required_checks, &request.verification_results);
        debug!(
            incomplete = verification.incomplete_checks.len(),
            failing = verification.failing_checks.len(),
            "verification evaluated"
        );

        let mut sensitive_hit = None;
        for file in &patch.files {
            if let Some(pattern) = globs.first_match(&sensitive, file.as_str())? {
                sensitive_hit = Some((file.clone(), pattern.to_string()));
                break;
            }
        }

        let decision = if !verification.incomplete_checks.is_empty() {
            DecisionRecord::stop(
                PatchReason::VerificationIncomplete,
                format!(
                    "checks without complete evidence: {}",
                    verification.incomplete_checks.join(", ")
                ),
            )
        } else if !verification.failing_checks.is_empty() {
            DecisionRecord::stop(
                PatchReason::VerificationFailed,
                format!("failing checks: {}", verification.failing_checks.join(", ")),
            )
        } else if let Some((file, pattern)) = sensitive_hit {
            DecisionRecord::escalate(
                PatchReason::PolicyBlocked,
                format!("{file} matches policy-sensitive pattern {pattern}"),
            )
        } else {
            DecisionRecord::ok(format!(
                "{} hunks across {} files verified",
                patch.hunk_count, patch.file_count
            ))
        };
        (decision, patch, verification)
    };

    let payload = PatchRunPayload {
        decision,
        intent: upstream.intent.clone(),
        materializer: materializer.name().to_string(),
        patch,
        edits: upstream.edits.clone(),
        verification,
        policy_sensitive_paths: sensitive,
    };
    let trace = PatchRunTrace {
        plan_decision: upstream.decision.decision,
        supplied_results: request.verification_results.len(),
    };
    let artifact: PatchRun = Artifact::seal(
        EnvelopeHeader::new(plan.run_id(), hooks.now_utc()),
        vec![plan.reference()],
        trace,
        payload,
    )
    .map_err(PatchRunError::Seal)?;

    info!(
        artifact_id = artifact.id(),
        hunks = artifact.payload().patch.hunk_count,
        decision = %artifact.payload().decision.decision,
        reason_code = %artifact.payload().decision.reason_code,
        "patch run produced"
    );
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn required() -> Vec<String> {
        vec!["lint".into(), "test".into(), "typecheck".into()]
    }

    #[test]
    fn placeholder_hunk_shape() {
        let path = WorkspacePath::parse("docs/new.md").unwrap();
        let edit = Edit::new("docs/new.md", EditOperation::Create, "add\nnotes")
            .with_target("tgt_0123456789ab", None);
        let hunk = PlaceholderMaterializer.materialize(&edit, &path).unwrap();
        let lines: Vec<&str> = hunk.lines().collect();
        assert_eq!(lines[0], "diff --git a/docs/new.md b/docs/new.md");
        assert_eq!(lines[1], "--- /dev/null");
        assert_eq!(lines[2], "+++ b/docs/new.md");
        assert_eq!(lines[5], "+# agp: target_id=tgt_0123456789ab");
        assert_eq!(lines[6], "+# agp: symbol_path=none");
        assert_eq!(lines[7], "+# agp: justification=add notes");
    }

    #[test]
    fn delete_hunk_targets_dev_null() {
        let path = WorkspacePath::parse("old.md").unwrap();
        let edit = Edit::new("old.md", EditOperation::Delete, "gone");
        let hunk = PlaceholderMaterializer.materialize(&edit, &path).unwrap();
        assert!(hunk.contains("--- a/old.md\n+++ /dev/null"));
    }

    #[test]
    fn all_passing_with_evidence() {
        let results: Vec<_> = required()
            .into_iter()
            .map(|c| VerificationResult::passed(c.clone(), format!("ci://{c}")))
            .collect();
        let summary = VerificationSummary::evaluate(required(), &results);
        assert!(summary.all_passed);
        assert!(summary.incomplete_checks.is_empty());
        assert_eq!(summary.evidence_refs, vec!["ci://lint", "ci://test", "ci://typecheck"]);
    }

    #[test]
    fn missing_evidence_and_not_run_are_incomplete() {
        let results = vec![
            VerificationResult::with_status("lint", CheckStatus::Pass),
            VerificationResult::with_status("test", CheckStatus::NotRun),
            VerificationResult::passed("typecheck", "  "),
        ];
        let summary = VerificationSummary::evaluate(required(), &results);
        assert!(!summary.all_passed);
        assert_eq!(summary.incomplete_checks, vec!["lint", "test", "typecheck"]);
        assert!(summary.failing_checks.is_empty());
    }

    #[test]
    fn failing_check_with_evidence_is_complete_but_failing() {
        let mut fail = VerificationResult::with_status("test", CheckStatus::Fail);
        fail.evidence_ref = Some("ci://test".into());
        let results = vec![
            VerificationResult::passed("lint", "ci://lint"),
            fail,
            VerificationResult::passed("typecheck", "ci://tc"),
        ];
        let summary = VerificationSummary::evaluate(required(), &results);
        assert!(summary.incomplete_checks.is_empty());
        assert_eq!(summary.failing_checks, vec!["test"]);
        assert!(!summary.all_passed);
    }

    #[test]
    fn last_duplicate_result_wins() {
        let results = vec![
            VerificationResult::with_status("lint", CheckStatus::Fail),
            VerificationResult::passed("lint", "ci://lint/2"),
        ];
        let summary = VerificationSummary::evaluate(vec!["lint".into()], &results);
        assert!(summary.all_passed);
        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.results[0].evidence_ref.as_deref(), Some("ci://lint/2"));
    }

    #[test]
    fn empty_patch_digest_is_stable() {
        let patch = PatchContent::empty();
        assert_eq!(patch.hunk_count, 0);
        assert_eq!(patch.digest, Sha256Digest::compute(b""));
        assert_eq!(patch.recompute_digest(), patch.digest);
    }
}
