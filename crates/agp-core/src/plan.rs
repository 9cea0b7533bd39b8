//! Safe Diff Plan stage
//!
//! Turns a mapping into a bounded list of file edits and evaluates them
//! against forbidden paths and change bounds. One hunk is planned per edit.

use crate::config::{canonical_set, PlanConfig};
use crate::edit::{Edit, EditOperation};
use crate::error::PlanError;
use crate::hooks::Hooks;
use crate::intent::{tokenize, IntentMapping, TargetCandidate};
use crate::reason::PlanReason;
use agp_artifact::{
    Artifact, ArtifactError, ArtifactKind, Decision, DecisionRecord, EnvelopeHeader, GlobCache,
    WorkspacePath,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Nouns that turn `add` into a create
pub const CREATE_NOUNS: [&str; 9] = [
    "file", "section", "rule", "goal", "capability", "check", "module", "document", "test",
];

/// Infer the file operation from intent verbs
#[must_use]
pub fn infer_operation(intent: &str) -> EditOperation {
    let tokens = tokenize(intent);
    let has = |word: &str| tokens.contains(word);
    if has("delete") || has("remove") {
        return EditOperation::Delete;
    }
    if has("create") || has("new") {
        return EditOperation::Create;
    }
    let names_noun = CREATE_NOUNS
        .iter()
        .any(|noun| has(noun) || tokens.contains(&format!("{noun}s")));
    if has("add") && names_noun {
        return EditOperation::Create;
    }
    EditOperation::Modify
}

/// Safety rule a planned edit broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationRule {
    DuplicatePath,
    ForbiddenGlob,
    PathEscape,
    FileBound,
    HunkBound,
}

/// One safety violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Violation {
    pub rule: ViolationRule,
    pub path: Option<String>,
    pub detail: String,
}

/// Where the plan's edits came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditSource {
    /// Synthesized from the selected candidate
    Synthesized,
    /// Supplied by the caller
    Explicit,
    /// Upstream blocked; nothing planned
    None,
}

/// Bounds in effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeBounds {
    pub max_file_changes: usize,
    pub max_hunks: usize,
}

/// Plan payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafeDiffPlanPayload {
    pub decision: DecisionRecord<PlanReason>,
    pub intent: String,
    pub edits: Vec<Edit>,
    pub file_count: usize,
    pub hunk_count: usize,
    pub bounds: ChangeBounds,
    pub forbidden_paths: Vec<String>,
    pub violations: Vec<Violation>,
    pub edit_source: EditSource,
}

/// Plan trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafeDiffPlanTrace {
    pub upstream_decision: Decision,
    pub upstream_reason_code: String,
    pub inferred_operation: Option<EditOperation>,
}

/// Safe diff plan artifact kind
#[derive(Debug, Clone, PartialEq)]
pub struct SafeDiffPlanKind;

impl agp_artifact::__private::Sealed for SafeDiffPlanKind {}

impl ArtifactKind for SafeDiffPlanKind {
    type Trace = SafeDiffPlanTrace;
    type Payload = SafeDiffPlanPayload;

    const TYPE_ID: &'static str = "safe_diff_plan";
    const ID_PREFIX: &'static str = "dplan";

    fn validate_payload(payload: &Self::Payload) -> Result<(), ArtifactError> {
        if payload.hunk_count != payload.edits.len() {
            return Err(ArtifactError::InvariantViolation(
                "hunk_count must equal the number of edits".to_string(),
            ));
        }
        if payload.decision.is_continue() && !payload.violations.is_empty() {
            return Err(ArtifactError::InvariantViolation(
                "a continue plan cannot carry violations".to_string(),
            ));
        }
        Ok(())
    }
}

/// Safe diff plan artifact
pub type SafeDiffPlan = Artifact<SafeDiffPlanKind>;

/// Plan request
#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    pub mapping: &'a IntentMapping,
    /// Bypasses edit synthesis when set
    pub explicit_edits: Option<Vec<Edit>>,
    pub config: PlanConfig,
}

impl<'a> PlanRequest<'a> {
    /// Request with default bounds and forbidden paths
    #[must_use]
    pub fn new(mapping: &'a IntentMapping) -> Self {
        Self {
            mapping,
            explicit_edits: None,
            config: PlanConfig::default(),
        }
    }

    /// With caller-supplied edits
    #[must_use]
    pub fn with_edits(mut self, edits: Vec<Edit>) -> Self {
        self.explicit_edits = Some(edits);
        self
    }

    /// With configuration
    #[must_use]
    pub fn with_config(mut self, config: PlanConfig) -> Self {
        self.config = config;
        self
    }
}

fn synthesize(candidate: &TargetCandidate, intent: &str, operation: EditOperation) -> Edit {
    let target = candidate
        .symbol_path
        .as_ref()
        .map_or_else(|| candidate.path.to_string(), ToString::to_string);
    Edit::new(
        candidate.path.as_str(),
        operation,
        format!("{target}: {intent}"),
    )
    .with_target(
        candidate.target_id.as_str(),
        candidate.symbol_path.as_ref().map(ToString::to_string),
    )
}

/// Evaluate edits against the safety rules
///
/// Returns every violation found, in edit order per rule.
fn collect_violations(
    edits: &[Edit],
    config: &PlanConfig,
    forbidden: &[String],
    globs: &GlobCache,
) -> Result<Vec<Violation>, PlanError> {
    let mut violations = Vec::new();
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    let mut distinct = BTreeSet::new();

    for edit in edits {
        let normalized = match WorkspacePath::parse(&edit.path) {
            Ok(path) => path,
            Err(e) => {
                violations.push(Violation {
                    rule: ViolationRule::PathEscape,
                    path: Some(edit.path.clone()),
                    detail: e.to_string(),
                });
                distinct.insert(edit.path.clone());
                continue;
            }
        };
        let key = normalized.to_string();
        *seen.entry(key.clone()).or_insert(0) += 1;
        distinct.insert(key.clone());

        if let Some(pattern) = globs.first_match(forbidden, &key)? {
            violations.push(Violation {
                rule: ViolationRule::ForbiddenGlob,
                path: Some(key),
                detail: format!("matches forbidden pattern {pattern}"),
            });
        }
    }

    for (path, count) in seen.into_iter().filter(|(_, count)| *count > 1) {
        violations.push(Violation {
            rule: ViolationRule::DuplicatePath,
            detail: format!("{count} edits target the same path"),
            path: Some(path),
        });
    }

    if distinct.len() > config.max_file_changes {
        violations.push(Violation {
            rule: ViolationRule::FileBound,
            path: None,
            detail: format!(
                "{} files exceed the bound of {}",
                distinct.len(),
                config.max_file_changes
            ),
        });
    }
    if edits.len() > config.max_hunks {
        violations.push(Violation {
            rule: ViolationRule::HunkBound,
            path: None,
            detail: format!("{} hunks exceed the bound of {}", edits.len(), config.max_hunks),
        });
    }
    Ok(violations)
}

fn decide(violations: &[Violation], edit_count: usize) -> DecisionRecord<PlanReason> {
    let first = |rules: &[ViolationRule]| violations.iter().find(|v| rules.contains(&v.rule));

    if let Some(v) = first(&[ViolationRule::DuplicatePath]) {
        return DecisionRecord::escalate(
            PlanReason::ConflictDetected,
            format!("{}: {}", v.path.as_deref().unwrap_or_default(), v.detail),
        );
    }
    if let Some(v) = first(&[ViolationRule::PathEscape, ViolationRule::ForbiddenGlob]) {
        return DecisionRecord::stop(
            PlanReason::ForbiddenPath,
            format!("{}: {}", v.path.as_deref().unwrap_or_default(), v.detail),
        );
    }
    if let Some(v) = first(&[ViolationRule::FileBound, ViolationRule::HunkBound]) {
        return DecisionRecord::escalate(PlanReason::ChangeBoundExceeded, v.detail.clone());
    }
    DecisionRecord::ok(format!("{edit_count} edits within bounds"))
}

/// Plan a bounded diff from an intent mapping
///
/// # Errors
/// Returns error for invalid bounds, uncompilable patterns or an
/// unverifiable mapping
pub fn plan_safe_diff(request: &PlanRequest<'_>, hooks: &Hooks) -> Result<SafeDiffPlan, PlanError> {
    request.config.validate().map_err(PlanError::InvalidRequest)?;
    let forbidden = canonical_set(request.config.forbidden_paths.iter().cloned());
    let globs = GlobCache::new();
    globs.validate_all(&forbidden)?;

    let mapping = request.mapping;
    mapping.verify().map_err(PlanError::InvalidInput)?;
    let upstream = mapping.payload();

    let mut inferred_operation = None;
    let (edits, edit_source, blocked) = if !upstream.decision.is_continue() {
        let decision = DecisionRecord::inherit(
            &upstream.decision,
            PlanReason::from,
            format!("mapping blocked: {}", upstream.decision.reason_detail),
        );
        (Vec::new(), EditSource::None, Some(decision))
    } else if upstream.selected.len() > 1 {
        let decision = DecisionRecord::escalate(
            PlanReason::MappingAmbiguous,
            format!("{} targets selected", upstream.selected.len()),
        );
        (Vec::new(), EditSource::None, Some(decision))
    } else if let Some(explicit) = &request.explicit_edits {
        (explicit.clone(), EditSource::Explicit, None)
    } else if let Some(candidate) = upstream.selected.first() {
        let operation = infer_operation(&upstream.intent);
        inferred_operation = Some(operation);
        (
            vec![synthesize(candidate, &upstream.intent, operation)],
            EditSource::Synthesized,
            None,
        )
    } else {
        let decision =
            DecisionRecord::stop(PlanReason::UnsupportedInput, "mapping selected no target");
        (Vec::new(), EditSource::None, Some(decision))
    };

    let (decision, violations) = match blocked {
        Some(decision) => (decision, Vec::new()),
        None => {
            let violations = collect_violations(&edits, &request.config, &forbidden, &globs)?;
            (decide(&violations, edits.len()), violations)
        }
    };
    if !violations.is_empty() {
        warn!(count = violations.len(), "plan has safety violations");
    }

    let file_count = edits
        .iter()
        .map(|e| {
            WorkspacePath::parse(&e.path).map_or_else(|_| e.path.clone(), |p| p.to_string())
        })
        .collect::<BTreeSet<_>>()
        .len();

    let payload = SafeDiffPlanPayload {
        decision,
        intent: upstream.intent.clone(),
        hunk_count: edits.len(),
        file_count,
        edits,
        bounds: ChangeBounds {
            max_file_changes: request.config.max_file_changes,
            max_hunks: request.config.max_hunks,
        },
        forbidden_paths: forbidden,
        violations,
        edit_source,
    };
    let trace = SafeDiffPlanTrace {
        upstream_decision: upstream.decision.decision,
        upstream_reason_code: upstream.decision.reason_code.to_string(),
        inferred_operation,
    };
    let artifact: SafeDiffPlan = Artifact::seal(
        EnvelopeHeader::new(mapping.run_id(), hooks.now_utc()),
        vec![mapping.reference()],
        trace,
        payload,
    )
    .map_err(PlanError::Seal)?;

    info!(
        artifact_id = artifact.id(),
        edits = artifact.payload().edits.len(),
        decision = %artifact.payload().decision.decision,
        reason_code = %artifact.payload().decision.reason_code,
        "safe diff plan produced"
    );
    Ok(artifact)
}
