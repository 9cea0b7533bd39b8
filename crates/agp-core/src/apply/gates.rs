//! Ordered gate sequence; the first blocking gate decides

use super::{
    ApplyRecord, ApprovalEvidence, BenchmarkEvidence, ChangedPath, Gate, GateOutcome, GateRecord,
};
use crate::config::{ApplyAction, ApplyPolicy};
use crate::edit::EditOperation;
use crate::reason::ApplyReason;
use crate::review::ReviewBundlePayload;
use agp_artifact::{DecisionRecord, GlobCache, GlobError, Sha256Digest, StateSnapshot};
use std::collections::BTreeSet;

enum Verdict {
    Pass(String),
    NotApplicable,
    Block(DecisionRecord<ApplyReason>),
}

/// Inputs every gate may consult
pub(crate) struct GateContext<'a> {
    pub(crate) action: ApplyAction,
    pub(crate) bundle_id: &'a str,
    pub(crate) bundle: &'a ReviewBundlePayload,
    pub(crate) prior: Option<&'a ApplyRecord>,
    pub(crate) benchmark: Option<&'a BenchmarkEvidence>,
    pub(crate) approval: Option<&'a ApprovalEvidence>,
    pub(crate) declared_capabilities: &'a [String],
    pub(crate) required_capabilities: &'a [String],
    pub(crate) policy: &'a ApplyPolicy,
    pub(crate) changed: &'a [ChangedPath],
    pub(crate) pre_state: &'a StateSnapshot,
    pub(crate) expected_pre_state_digest: Option<&'a Sha256Digest>,
    pub(crate) globs: &'a GlobCache,
}

impl GateContext<'_> {
    fn approved(&self) -> bool {
        self.approval.is_some_and(|a| !a.evidence_ref.trim().is_empty())
    }

    fn upstream(&self) -> Verdict {
        let decision = &self.bundle.decision;
        if decision.is_continue() {
            return Verdict::Pass(format!("bundle {} is ready", self.bundle_id));
        }
        Verdict::Block(DecisionRecord::inherit(
            decision,
            ApplyReason::from,
            format!("review bundle blocked: {}", decision.reason_detail),
        ))
    }

    fn verification(&self) -> Verdict {
        let verification = &self.bundle.verification;
        if !verification.evaluated || !verification.incomplete_checks.is_empty() {
            return Verdict::Block(DecisionRecord::stop(
                ApplyReason::VerificationIncomplete,
                "bundle verification is incomplete",
            ));
        }
        if !verification.all_passed {
            return Verdict::Block(DecisionRecord::stop(
                ApplyReason::VerificationFailed,
                format!("failing checks: {}", verification.failing_checks.join(", ")),
            ));
        }
        Verdict::Pass("all required checks passed".to_string())
    }

    fn rollback_available(&self) -> Verdict {
        if self.action != ApplyAction::Apply {
            return Verdict::NotApplicable;
        }
        if self.bundle.rollback.supported {
            Verdict::Pass(format!("rollback via {}", self.bundle.rollback.strategy))
        } else {
            Verdict::Block(DecisionRecord::stop(
                ApplyReason::RollbackUnavailable,
                "bundle carries no supported rollback package",
            ))
        }
    }

    fn prior_apply(&self) -> Verdict {
        if self.action != ApplyAction::Rollback {
            return Verdict::NotApplicable;
        }
        let Some(prior) = self.prior else {
            return Verdict::Block(DecisionRecord::stop(
                ApplyReason::PriorApplyRecordMissing,
                "rollback requires the prior apply record",
            ));
        };
        let record = prior.payload();
        let conflict = |detail: String| {
            Verdict::Block(DecisionRecord::stop(ApplyReason::ConflictDetected, detail))
        };

        if record.bundle.artifact_id != self.bundle_id {
            return conflict(format!(
                "prior apply references bundle {}, not {}",
                record.bundle.artifact_id, self.bundle_id
            ));
        }
        if record.action != ApplyAction::Apply
            || !record.executed
            || !record.decision.is_continue()
        {
            return conflict(format!("prior record {} is not an executed apply", prior.id()));
        }
        if record.rollback.strategy != self.bundle.rollback.strategy
            || record.rollback.package_digest != self.bundle.rollback.digest
        {
            return conflict("prior apply rollback package differs from the bundle".to_string());
        }
        Verdict::Pass(format!("prior apply {}", prior.id()))
    }

    fn benchmark(&self) -> Verdict {
        let Some(benchmark) = self.benchmark.filter(|b| b.enforce) else {
            return Verdict::NotApplicable;
        };
        if self.action != ApplyAction::Apply {
            return Verdict::NotApplicable;
        }
        if !benchmark.quality_floor_met {
            return Verdict::Block(DecisionRecord::stop(
                ApplyReason::BenchmarkQualityFloor,
                "benchmark quality floor not met",
            ));
        }
        if !benchmark.valid_gain {
            return Verdict::Block(DecisionRecord::stop(
                ApplyReason::BenchmarkInvalidGain,
                "benchmark gain is not valid",
            ));
        }
        Verdict::Pass("benchmark floor and gain satisfied".to_string())
    }

    fn policy(&self) -> Result<Verdict, GlobError> {
        if !self.policy.allowed_actions.contains(&self.action) {
            return Ok(Verdict::Block(DecisionRecord::stop(
                ApplyReason::PolicyBlocked,
                format!("action {} is not allowed", self.action),
            )));
        }
        let declared: BTreeSet<&str> =
            self.declared_capabilities.iter().map(String::as_str).collect();
        let missing: Vec<&str> = self
            .required_capabilities
            .iter()
            .map(String::as_str)
            .filter(|c| !declared.contains(c))
            .collect();
        if !missing.is_empty() {
            return Ok(Verdict::Block(DecisionRecord::escalate(
                ApplyReason::UndeclaredCapability,
                format!("undeclared capabilities: {}", missing.join(", ")),
            )));
        }
        if self.policy.require_approval && !self.approved() {
            return Ok(Verdict::Block(DecisionRecord::escalate(
                ApplyReason::ApprovalRequired,
                "policy requires approval evidence",
            )));
        }
        for changed in self.changed {
            if let Some(pattern) =
                self.globs.first_match(&self.policy.blocked_paths, changed.path.as_str())?
            {
                return Ok(Verdict::Block(DecisionRecord::stop(
                    ApplyReason::ForbiddenPath,
                    format!("{} matches blocked pattern {pattern}", changed.path),
                )));
            }
        }
        if !self.approved() {
            for changed in self.changed {
                if let Some(pattern) =
                    self.globs.first_match(&self.policy.escalation_paths, changed.path.as_str())?
                {
                    return Ok(Verdict::Block(DecisionRecord::escalate(
                        ApplyReason::ApprovalRequired,
                        format!("{} matches escalation pattern {pattern}", changed.path),
                    )));
                }
            }
        }
        Ok(Verdict::Pass("capabilities and path policy satisfied".to_string()))
    }

    fn preconditions(&self) -> Verdict {
        let conflict = |detail: String| {
            Verdict::Block(DecisionRecord::stop(ApplyReason::ConflictDetected, detail))
        };
        match self.action {
            ApplyAction::Apply => {
                for changed in self.changed {
                    let exists = self
                        .pre_state
                        .entry(&changed.path)
                        .is_some_and(|entry| entry.exists);
                    let expected = changed.operation != EditOperation::Create;
                    if exists != expected {
                        return conflict(format!(
                            "{} {} but the edit is {}",
                            changed.path,
                            if exists { "exists" } else { "is absent" },
                            changed.operation
                        ));
                    }
                }
                if let Some(expected) = self.expected_pre_state_digest {
                    if *expected != self.pre_state.digest {
                        return conflict(format!(
                            "pre-state digest {} differs from expected {expected}",
                            self.pre_state.digest
                        ));
                    }
                }
            }
            ApplyAction::Rollback => {
                // The prior-apply gate already blocked a missing record.
                let Some(prior) = self.prior else {
                    return conflict("rollback without prior apply record".to_string());
                };
                let record = prior.payload();
                if self.pre_state.digest != record.post_state.digest {
                    return conflict(format!(
                        "workspace drifted since apply: {} != {}",
                        self.pre_state.digest, record.post_state.digest
                    ));
                }
                let paths: Vec<_> = self.changed.iter().map(|c| &c.path).collect();
                if !record.pre_state.covers(paths.iter().copied())
                    || !record.post_state.covers(paths.iter().copied())
                {
                    return conflict("prior snapshots do not cover every changed path".to_string());
                }
                let current: BTreeSet<_> = paths.into_iter().collect();
                let recorded: BTreeSet<_> = record.changed_paths.iter().map(|c| &c.path).collect();
                if current != recorded {
                    return conflict("changed paths differ from the prior apply".to_string());
                }
            }
        }
        Verdict::Pass("target state matches".to_string())
    }
}

/// Run every gate in order; returns the deciding record and the gate log
pub(crate) fn evaluate(
    ctx: &GateContext<'_>,
) -> Result<(DecisionRecord<ApplyReason>, Vec<GateRecord>), GlobError> {
    let mut log = Vec::new();
    for gate in Gate::ORDER {
        let verdict = match gate {
            Gate::Upstream => ctx.upstream(),
            Gate::Verification => ctx.verification(),
            Gate::RollbackAvailable => ctx.rollback_available(),
            Gate::PriorApply => ctx.prior_apply(),
            Gate::Benchmark => ctx.benchmark(),
            Gate::Policy => ctx.policy()?,
            Gate::Preconditions => ctx.preconditions(),
        };
        match verdict {
            Verdict::Pass(detail) => log.push(GateRecord {
                gate,
                outcome: GateOutcome::Pass,
                detail,
            }),
            Verdict::NotApplicable => log.push(GateRecord {
                gate,
                outcome: GateOutcome::NotApplicable,
                detail: String::new(),
            }),
            Verdict::Block(decision) => {
                log.push(GateRecord {
                    gate,
                    outcome: GateOutcome::from(decision.decision),
                    detail: decision.reason_detail.clone(),
                });
                return Ok((decision, log));
            }
        }
    }
    let decision = DecisionRecord::ok(format!("all gates passed for {}", ctx.action));
    Ok((decision, log))
}
