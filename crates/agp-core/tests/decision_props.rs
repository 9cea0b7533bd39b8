//! Property tests for decision propagation across stages

use agp_artifact::Decision;
use agp_core::intent::tokenize;
use agp_core::{
    assemble_review_bundle, run_patch, CheckStatus, PatchRunRequest, PlaceholderMaterializer,
    ReviewBundleRequest, VerificationResult,
};
use agp_test_utils::{
    default_passing_results, fixed_hooks, read_docs_workspace, run_to_bundle, FixtureWorkspace,
    PipelineRun, READ_DOCS_INTENT,
};
use proptest::prelude::*;
use std::sync::OnceLock;

fn fixture() -> &'static (FixtureWorkspace, PipelineRun) {
    static FIXTURE: OnceLock<(FixtureWorkspace, PipelineRun)> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let ws = read_docs_workspace();
        let run = run_to_bundle(&ws, READ_DOCS_INTENT, default_passing_results());
        (ws, run)
    })
}

fn status() -> impl Strategy<Value = Option<(CheckStatus, bool)>> {
    prop_oneof![
        Just(None),
        (
            prop_oneof![
                Just(CheckStatus::Pass),
                Just(CheckStatus::Fail),
                Just(CheckStatus::NotRun)
            ],
            any::<bool>()
        )
            .prop_map(Some),
    ]
}

fn results(statuses: &[Option<(CheckStatus, bool)>]) -> Vec<VerificationResult> {
    ["lint", "typecheck", "test"]
        .iter()
        .zip(statuses)
        .filter_map(|(check, status)| {
            (*status).map(|(status, evidenced)| VerificationResult {
                evidence_ref: evidenced.then(|| format!("ci://{check}")),
                ..VerificationResult::with_status(*check, status)
            })
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_patch_continues_only_with_complete_passing_evidence(
        statuses in proptest::collection::vec(status(), 3)
    ) {
        let (_, run) = fixture();
        let hooks = fixed_hooks();
        let patch_run = run_patch(
            &PatchRunRequest::new(&run.plan).with_results(results(&statuses)),
            &PlaceholderMaterializer,
            &hooks,
        )
        .unwrap();

        let all_good = statuses
            .iter()
            .all(|s| matches!(s, Some((CheckStatus::Pass, true))));
        let patch_decision = patch_run.payload().decision.decision;
        prop_assert_eq!(patch_decision == Decision::Continue, all_good);

        let bundle = assemble_review_bundle(
            &ReviewBundleRequest::new(&patch_run).with_lineage(&run.snapshot, &run.mapping, &run.plan),
            &hooks,
        )
        .unwrap();
        let bundle_decision = bundle.payload().decision.decision;
        prop_assert_eq!(bundle_decision == Decision::Continue, all_good);
        if patch_decision == Decision::Stop {
            prop_assert_eq!(bundle_decision, Decision::Stop);
        }
    }

    #[test]
    fn test_tokenize_is_lowercase_and_case_insensitive(text in "[A-Za-z_ ]{0,40}") {
        let tokens = tokenize(&text);
        for token in &tokens {
            prop_assert_eq!(token.clone(), token.to_lowercase());
            prop_assert!(token.chars().count() >= 2);
        }
        prop_assert_eq!(tokenize(&text.to_uppercase()), tokens);
    }
}
