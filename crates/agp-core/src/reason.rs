//! Stage reason codes
//!
//! Each stage has a closed vocabulary that is a superset of its upstream's,
//! so an inherited decision always translates losslessly via `From`.

use agp_artifact::reason_codes;

reason_codes! {
    /// Workspace snapshot reasons
    pub enum SnapshotReason {
        Ok => "ok",
    }
}

reason_codes! {
    /// Intent mapping reasons
    pub enum MappingReason {
        Ok => "ok",
        UnsupportedInput => "unsupported_input",
        MappingLowConfidence => "mapping_low_confidence",
        MappingAmbiguous => "mapping_ambiguous",
    }
}

reason_codes! {
    /// Safe diff plan reasons
    pub enum PlanReason {
        Ok => "ok",
        UnsupportedInput => "unsupported_input",
        MappingLowConfidence => "mapping_low_confidence",
        MappingAmbiguous => "mapping_ambiguous",
        ConflictDetected => "conflict_detected",
        ForbiddenPath => "forbidden_path",
        ChangeBoundExceeded => "change_bound_exceeded",
    }
}

reason_codes! {
    /// Patch run reasons
    pub enum PatchReason {
        Ok => "ok",
        UnsupportedInput => "unsupported_input",
        MappingLowConfidence => "mapping_low_confidence",
        MappingAmbiguous => "mapping_ambiguous",
        ConflictDetected => "conflict_detected",
        ForbiddenPath => "forbidden_path",
        ChangeBoundExceeded => "change_bound_exceeded",
        EmptyPlan => "empty_plan",
        VerificationIncomplete => "verification_incomplete",
        VerificationFailed => "verification_failed",
        PolicyBlocked => "policy_blocked",
    }
}

reason_codes! {
    /// Review bundle reasons
    pub enum BundleReason {
        Ok => "ok",
        UnsupportedInput => "unsupported_input",
        MappingLowConfidence => "mapping_low_confidence",
        MappingAmbiguous => "mapping_ambiguous",
        ConflictDetected => "conflict_detected",
        ForbiddenPath => "forbidden_path",
        ChangeBoundExceeded => "change_bound_exceeded",
        EmptyPlan => "empty_plan",
        VerificationIncomplete => "verification_incomplete",
        VerificationFailed => "verification_failed",
        PolicyBlocked => "policy_blocked",
        BundleIncomplete => "bundle_incomplete",
        RollbackUnavailable => "rollback_unavailable",
    }
}

reason_codes! {
    /// Apply/rollback reasons
    pub enum ApplyReason {
        Ok => "ok",
        UnsupportedInput => "unsupported_input",
        MappingLowConfidence => "mapping_low_confidence",
        MappingAmbiguous => "mapping_ambiguous",
        ConflictDetected => "conflict_detected",
        ForbiddenPath => "forbidden_path",
        ChangeBoundExceeded => "change_bound_exceeded",
        EmptyPlan => "empty_plan",
        VerificationIncomplete => "verification_incomplete",
        VerificationFailed => "verification_failed",
        PolicyBlocked => "policy_blocked",
        BundleIncomplete => "bundle_incomplete",
        RollbackUnavailable => "rollback_unavailable",
        PriorApplyRecordMissing => "prior_apply_record_missing",
        UndeclaredCapability => "undeclared_capability",
        ApprovalRequired => "approval_required",
        BenchmarkQualityFloor => "benchmark_quality_floor",
        BenchmarkInvalidGain => "benchmark_invalid_gain",
    }
}

impl From<MappingReason> for PlanReason {
    fn from(code: MappingReason) -> Self {
        match code {
            MappingReason::Ok => Self::Ok,
            MappingReason::UnsupportedInput => Self::UnsupportedInput,
            MappingReason::MappingLowConfidence => Self::MappingLowConfidence,
            MappingReason::MappingAmbiguous => Self::MappingAmbiguous,
        }
    }
}

impl From<PlanReason> for PatchReason {
    fn from(code: PlanReason) -> Self {
        match code {
            PlanReason::Ok => Self::Ok,
            PlanReason::UnsupportedInput => Self::UnsupportedInput,
            PlanReason::MappingLowConfidence => Self::MappingLowConfidence,
            PlanReason::MappingAmbiguous => Self::MappingAmbiguous,
            PlanReason::ConflictDetected => Self::ConflictDetected,
            PlanReason::ForbiddenPath => Self::ForbiddenPath,
            PlanReason::ChangeBoundExceeded => Self::ChangeBoundExceeded,
        }
    }
}

impl From<PatchReason> for BundleReason {
    fn from(code: PatchReason) -> Self {
        match code {
            PatchReason::Ok => Self::Ok,
            PatchReason::UnsupportedInput => Self::UnsupportedInput,
            PatchReason::MappingLowConfidence => Self::MappingLowConfidence,
            PatchReason::MappingAmbiguous => Self::MappingAmbiguous,
            PatchReason::ConflictDetected => Self::ConflictDetected,
            PatchReason::ForbiddenPath => Self::ForbiddenPath,
            PatchReason::ChangeBoundExceeded => Self::ChangeBoundExceeded,
            PatchReason::EmptyPlan => Self::EmptyPlan,
            PatchReason::VerificationIncomplete => Self::VerificationIncomplete,
            PatchReason::VerificationFailed => Self::VerificationFailed,
            PatchReason::PolicyBlocked => Self::PolicyBlocked,
        }
    }
}

impl From<BundleReason> for ApplyReason {
    fn from(code: BundleReason) -> Self {
        match code {
            BundleReason::Ok => Self::Ok,
            BundleReason::UnsupportedInput => Self::UnsupportedInput,
            BundleReason::MappingLowConfidence => Self::MappingLowConfidence,
            BundleReason::MappingAmbiguous => Self::MappingAmbiguous,
            BundleReason::ConflictDetected => Self::ConflictDetected,
            BundleReason::ForbiddenPath => Self::ForbiddenPath,
            BundleReason::ChangeBoundExceeded => Self::ChangeBoundExceeded,
            BundleReason::EmptyPlan => Self::EmptyPlan,
            BundleReason::VerificationIncomplete => Self::VerificationIncomplete,
            BundleReason::VerificationFailed => Self::VerificationFailed,
            BundleReason::PolicyBlocked => Self::PolicyBlocked,
            BundleReason::BundleIncomplete => Self::BundleIncomplete,
            BundleReason::RollbackUnavailable => Self::RollbackUnavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agp_artifact::ReasonCode;

    #[test]
    fn translations_preserve_wire_names() {
        let codes = [
            PatchReason::Ok,
            PatchReason::ForbiddenPath,
            PatchReason::EmptyPlan,
            PatchReason::VerificationFailed,
            PatchReason::PolicyBlocked,
        ];
        for code in codes {
            let bundle = BundleReason::from(code);
            let apply = ApplyReason::from(bundle);
            assert_eq!(code.as_str(), bundle.as_str());
            assert_eq!(code.as_str(), apply.as_str());
        }
        assert_eq!(
            PlanReason::from(MappingReason::MappingAmbiguous).as_str(),
            "mapping_ambiguous"
        );
    }

    #[test]
    fn wire_names_are_snake_case() {
        assert_eq!(ApplyReason::PriorApplyRecordMissing.to_string(), "prior_apply_record_missing");
        assert_eq!(
            serde_json::to_value(ApplyReason::UndeclaredCapability).unwrap(),
            serde_json::json!("undeclared_capability")
        );
    }
}
