//! Intent Mapping stage
//!
//! Ranks workspace targets against a free-text intent. Structured documents
//! contribute one candidate per declared symbol; other text files (and
//! structured files whose symbols all miss) contribute one whole-file
//! candidate with the best-matching line attached.

use crate::config::MappingOptions;
use crate::error::MappingError;
use crate::hooks::Hooks;
use crate::reason::MappingReason;
use crate::snapshot::WorkspaceSnapshot;
use agp_artifact::{
    Artifact, ArtifactError, ArtifactKind, DecisionRecord, EnvelopeHeader, GlobCache, Sha256Digest,
    SymbolPath, WorkspacePath,
};
use agp_workspace::{
    read_file, walk_files, DocumentSymbol, IgnoreFilter, LineRange, ParserRegistry, WorkspaceRoot,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Largest file considered for matching
pub const MAX_ELIGIBLE_BYTES: u64 = 512 * 1024;

/// Base score of a declared-symbol candidate
pub const STRUCTURED_BASE: f64 = 0.38;
/// Base score of a whole-file candidate
pub const TEXT_BASE: f64 = 0.18;

const OVERLAP_WEIGHT: f64 = 0.32;
const COVERAGE_WEIGHT: f64 = 0.18;
const EXACT_WEIGHT: f64 = 0.12;
const KIND_WEIGHT: f64 = 0.06;

// Floating-point slack for threshold comparisons on 4-dp values
const EPSILON: f64 = 1e-9;

const STOP_WORDS: [&str; 22] = [
    "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it", "of", "on",
    "or", "so", "that", "the", "this", "to", "with",
];

/// Token set of a text
///
/// Lowercase; splits on anything that is not alphanumeric or `_`; compound
/// `a_b` tokens also contribute `a` and `b`; tokens shorter than two
/// characters and stop words are dropped.
#[must_use]
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    let mut tokens = BTreeSet::new();
    for raw in lower.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
        let raw = raw.trim_matches('_');
        if raw.is_empty() {
            continue;
        }
        tokens.insert(raw.to_string());
        if raw.contains('_') {
            tokens.extend(raw.split('_').map(str::to_string));
        }
    }
    tokens.retain(|t| t.chars().count() >= 2 && !STOP_WORDS.contains(&t.as_str()));
    tokens
}

/// How a candidate was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    /// Declared symbol in a structured document
    StructuredSymbol,
    /// Whole-file text match
    TextMatch,
}

/// Ranked mapping target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetCandidate {
    pub target_id: String,
    pub path: WorkspacePath,
    pub symbol_path: Option<SymbolPath>,
    pub method: MatchMethod,
    /// Rounded to 4 decimal places
    pub confidence: f64,
    pub range: Option<LineRange>,
    pub matched_tokens: Vec<String>,
}

impl TargetCandidate {
    fn ordering(&self, other: &Self) -> Ordering {
        other
            .confidence
            .total_cmp(&self.confidence)
            .then(self.method.cmp(&other.method))
            .then_with(|| self.path.cmp(&other.path))
            .then_with(|| self.symbol_path.cmp(&other.symbol_path))
    }
}

/// `tgt_<12 hex of sha256(path#symbol_path)>`
#[must_use]
pub fn target_id(path: &WorkspacePath, symbol_path: Option<&SymbolPath>) -> String {
    let key = format!(
        "{path}#{}",
        symbol_path.map(ToString::to_string).unwrap_or_default()
    );
    format!("tgt_{}", Sha256Digest::compute(key.as_bytes()).short_hex(12))
}

/// Mapping request
#[derive(Debug, Clone)]
pub struct MappingRequest<'a> {
    pub snapshot: &'a WorkspaceSnapshot,
    pub intent: String,
    pub options: MappingOptions,
}

impl<'a> MappingRequest<'a> {
    /// Request with default thresholds
    #[must_use]
    pub fn new(snapshot: &'a WorkspaceSnapshot, intent: impl Into<String>) -> Self {
        Self {
            snapshot,
            intent: intent.into(),
            options: MappingOptions::default(),
        }
    }

    /// With thresholds
    #[must_use]
    pub fn with_options(mut self, options: MappingOptions) -> Self {
        self.options = options;
        self
    }
}

/// Mapping payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentMappingPayload {
    pub decision: DecisionRecord<MappingReason>,
    pub intent: String,
    pub intent_tokens: Vec<String>,
    pub workspace_root: String,
    pub options: MappingOptions,
    /// Candidates before truncation
    pub candidate_count: usize,
    pub selected: Vec<TargetCandidate>,
    pub alternatives: Vec<TargetCandidate>,
}

/// Mapping trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntentMappingTrace {
    pub files_scanned: u64,
    pub files_eligible: u64,
    pub structured_files: u64,
    pub parse_failures: Vec<String>,
}

/// Intent mapping artifact kind
#[derive(Debug, Clone, PartialEq)]
pub struct IntentMappingKind;

impl agp_artifact::__private::Sealed for IntentMappingKind {}

impl ArtifactKind for IntentMappingKind {
    type Trace = IntentMappingTrace;
    type Payload = IntentMappingPayload;

    const TYPE_ID: &'static str = "intent_mapping";
    const ID_PREFIX: &'static str = "imap";

    fn validate_payload(payload: &Self::Payload) -> Result<(), ArtifactError> {
        if payload.decision.is_continue() && payload.selected.len() != 1 {
            return Err(ArtifactError::InvariantViolation(
                "a continue mapping selects exactly one candidate".to_string(),
            ));
        }
        Ok(())
    }
}

/// Intent mapping artifact
pub type IntentMapping = Artifact<IntentMappingKind>;

struct Scorer<'a> {
    intent_lower: String,
    intent_tokens: &'a BTreeSet<String>,
}

impl Scorer<'_> {
    /// Returns `None` when the target shares nothing with the intent
    fn score(
        &self,
        base: f64,
        target_tokens: &BTreeSet<String>,
        name: &str,
        kind: Option<&str>,
    ) -> Option<(f64, Vec<String>)> {
        let matched: Vec<String> = self
            .intent_tokens
            .intersection(target_tokens)
            .cloned()
            .collect();
        let name_lower = name.to_lowercase();
        let exact_hit = !name_lower.is_empty() && self.intent_lower.contains(&name_lower);
        if matched.is_empty() && !exact_hit {
            return None;
        }

        let overlap = ratio(matched.len(), self.intent_tokens.len());
        let name_tokens = tokenize(name);
        let coverage = ratio(
            name_tokens.intersection(self.intent_tokens).count(),
            name_tokens.len(),
        );
        let kind_bonus = kind.is_some_and(|k| self.intent_tokens.contains(k));

        let raw = base
            + OVERLAP_WEIGHT * overlap
            + COVERAGE_WEIGHT * coverage
            + if exact_hit { EXACT_WEIGHT } else { 0.0 }
            + if kind_bonus { KIND_WEIGHT } else { 0.0 };
        Some((round4(raw.clamp(0.0, 1.0)), matched))
    }

    fn symbol_candidate(
        &self,
        path: &WorkspacePath,
        symbol: &DocumentSymbol,
    ) -> Option<TargetCandidate> {
        let symbol_path = SymbolPath::new(symbol.kind.as_str(), symbol.name.as_str()).ok()?;
        let (confidence, matched_tokens) = self.score(
            STRUCTURED_BASE,
            &tokenize(&symbol.text),
            &symbol.name,
            Some(symbol.kind.as_str()),
        )?;
        Some(TargetCandidate {
            target_id: target_id(path, Some(&symbol_path)),
            path: path.clone(),
            symbol_path: Some(symbol_path),
            method: MatchMethod::StructuredSymbol,
            confidence,
            range: Some(symbol.range),
            matched_tokens,
        })
    }

    fn text_candidate(&self, path: &WorkspacePath, content: &str) -> Option<TargetCandidate> {
        let (confidence, matched_tokens) =
            self.score(TEXT_BASE, &tokenize(content), path.file_stem(), None)?;
        Some(TargetCandidate {
            target_id: target_id(path, None),
            path: path.clone(),
            symbol_path: None,
            method: MatchMethod::TextMatch,
            confidence,
            range: self.best_line(content),
            matched_tokens,
        })
    }

    /// First line with the highest token overlap
    fn best_line(&self, content: &str) -> Option<LineRange> {
        let mut best: Option<(usize, usize)> = None;
        for (idx, line) in content.lines().enumerate() {
            let hits = tokenize(line).intersection(self.intent_tokens).count();
            if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
                best = Some((idx + 1, hits));
            }
        }
        best.map(|(line, _)| LineRange {
            start_line: line,
            end_line: line,
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn decide(
    mut candidates: Vec<TargetCandidate>,
    options: &MappingOptions,
) -> (DecisionRecord<MappingReason>, Vec<TargetCandidate>, Vec<TargetCandidate>) {
    candidates.sort_by(TargetCandidate::ordering);
    let Some(top) = candidates.first().map(|c| c.confidence) else {
        return (
            DecisionRecord::stop(
                MappingReason::UnsupportedInput,
                "no workspace target shares tokens with the intent",
            ),
            Vec::new(),
            Vec::new(),
        );
    };

    let (decision, selected_len) = if top + EPSILON < options.min_confidence {
        (
            DecisionRecord::escalate(
                MappingReason::MappingLowConfidence,
                format!(
                    "top candidate confidence {top} is below {}",
                    options.min_confidence
                ),
            ),
            1,
        )
    } else {
        let tied = candidates
            .iter()
            .take_while(|c| {
                c.confidence + EPSILON >= options.min_confidence
                    && top - c.confidence <= options.ambiguity_gap + EPSILON
            })
            .count();
        if tied > 1 {
            (
                DecisionRecord::escalate(
                    MappingReason::MappingAmbiguous,
                    format!(
                        "{tied} candidates within {} of top confidence {top}",
                        options.ambiguity_gap
                    ),
                ),
                tied,
            )
        } else {
            (
                DecisionRecord::ok(format!("unique target with confidence {top}")),
                1,
            )
        }
    };

    let mut alternatives = candidates.split_off(selected_len);
    alternatives.truncate(options.max_alternatives);
    (decision, candidates, alternatives)
}

/// Map an intent onto workspace targets
///
/// # Errors
/// Returns error for a blank intent, invalid options, an unverifiable
/// snapshot or an unreadable workspace
pub fn map_intent(
    request: &MappingRequest<'_>,
    parsers: &ParserRegistry,
    hooks: &Hooks,
) -> Result<IntentMapping, MappingError> {
    let intent = request.intent.trim();
    if intent.is_empty() {
        return Err(MappingError::InvalidRequest("intent must not be blank".to_string()));
    }
    request.options.validate().map_err(MappingError::InvalidRequest)?;
    let snapshot = request.snapshot;
    snapshot.verify().map_err(MappingError::InvalidInput)?;

    let snap = snapshot.payload();
    let root = WorkspaceRoot::open(&snap.workspace_root)?;
    let filter = IgnoreFilter::new(snap.ignored_paths.iter().cloned(), &GlobCache::new())?;
    let walk = walk_files(&root, &filter)?;

    let intent_tokens = tokenize(intent);
    let scorer = Scorer {
        intent_lower: intent.to_lowercase(),
        intent_tokens: &intent_tokens,
    };

    let mut trace = IntentMappingTrace {
        files_scanned: 0,
        files_eligible: 0,
        structured_files: 0,
        parse_failures: Vec::new(),
    };
    let mut candidates = Vec::new();

    for file in &walk.files {
        trace.files_scanned += 1;
        if file.size > MAX_ELIGIBLE_BYTES {
            continue;
        }
        let Some(bytes) = read_file(&root, &file.path)? else {
            continue;
        };
        if bytes.contains(&0) {
            continue;
        }
        let Ok(content) = std::str::from_utf8(&bytes) else {
            continue;
        };
        trace.files_eligible += 1;

        let mut structured = Vec::new();
        if parsers.find_for_path(&file.path).is_some() {
            match parsers.parse(&file.path, content) {
                Ok(tree) => {
                    trace.structured_files += 1;
                    structured.extend(
                        tree.symbols
                            .iter()
                            .filter_map(|symbol| scorer.symbol_candidate(&file.path, symbol)),
                    );
                }
                Err(e) => {
                    debug!(
                        path = %file.path,
                        error = %e,
                        "structured parse failed, using text match"
                    );
                    trace.parse_failures.push(file.path.to_string());
                }
            }
        }
        if structured.is_empty() {
            candidates.extend(scorer.text_candidate(&file.path, content));
        } else {
            candidates.append(&mut structured);
        }
    }

    let candidate_count = candidates.len();
    let (decision, selected, alternatives) = decide(candidates, &request.options);

    let payload = IntentMappingPayload {
        decision,
        intent: intent.to_string(),
        intent_tokens: intent_tokens.into_iter().collect(),
        workspace_root: snap.workspace_root.clone(),
        options: request.options,
        candidate_count,
        selected,
        alternatives,
    };
    let artifact: IntentMapping = Artifact::seal(
        EnvelopeHeader::new(snapshot.run_id(), hooks.now_utc()),
        vec![snapshot.reference()],
        trace,
        payload,
    )
    .map_err(MappingError::Seal)?;

    info!(
        artifact_id = artifact.id(),
        candidates = candidate_count,
        decision = %artifact.payload().decision.decision,
        reason_code = %artifact.payload().decision.reason_code,
        "intent mapped"
    );
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn candidate(path: &str, confidence: f64, method: MatchMethod) -> TargetCandidate {
        let path = WorkspacePath::parse(path).unwrap();
        TargetCandidate {
            target_id: target_id(&path, None),
            path,
            symbol_path: None,
            method,
            confidence,
            range: None,
            matched_tokens: Vec::new(),
        }
    }

    #[test]
    fn tokenize_splits_compounds_and_drops_noise() {
        assert_eq!(
            tokenize("Update capability read_docs to mention RFCs!"),
            set(&["capability", "docs", "mention", "read", "read_docs", "rfcs", "update"])
        );
        assert!(tokenize("a I to of").is_empty());
    }

    #[test]
    fn scoring_formula() {
        let intent = tokenize("update capability read_docs");
        let scorer = Scorer {
            intent_lower: "update capability read_docs".to_string(),
            intent_tokens: &intent,
        };
        // intent tokens: capability, docs, read, read_docs, update
        let target = tokenize("capability read_docs { }");
        let (score, matched) = scorer
            .score(STRUCTURED_BASE, &target, "read_docs", Some("capability"))
            .unwrap();
        // 0.38 + 0.32*4/5 + 0.18*3/3 + 0.12 + 0.06
        assert_eq!(score, 0.996);
        assert_eq!(matched, vec!["capability", "docs", "read", "read_docs"]);

        assert!(scorer.score(TEXT_BASE, &tokenize("nothing shared"), "zzz", None).is_none());
    }

    #[test]
    fn exact_hit_alone_keeps_candidate() {
        let intent = tokenize("fix readme");
        let scorer = Scorer {
            intent_lower: "fix readme".to_string(),
            intent_tokens: &intent,
        };
        let (score, matched) = scorer
            .score(TEXT_BASE, &tokenize("unrelated"), "readme", None)
            .unwrap();
        assert!(matched.is_empty());
        assert_eq!(score, round4(TEXT_BASE + COVERAGE_WEIGHT + EXACT_WEIGHT));
    }

    #[test]
    fn best_line_is_first_maximum() {
        let intent = tokenize("local rfcs docs");
        let scorer = Scorer {
            intent_lower: String::new(),
            intent_tokens: &intent,
        };
        let range = scorer.best_line("nothing\nlocal docs\nlocal rfcs\n").unwrap();
        assert_eq!(range.start_line, 2);
        assert!(scorer.best_line("none here").is_none());
    }

    #[test]
    fn ordering_prefers_confidence_then_structured_then_path() {
        let mut items = vec![
            candidate("b.md", 0.8, MatchMethod::TextMatch),
            candidate("a.md", 0.8, MatchMethod::TextMatch),
            candidate("z.ls", 0.8, MatchMethod::StructuredSymbol),
            candidate("c.md", 0.9, MatchMethod::TextMatch),
        ];
        items.sort_by(TargetCandidate::ordering);
        let order: Vec<&str> = items.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(order, vec!["c.md", "z.ls", "a.md", "b.md"]);
    }

    #[test]
    fn decision_policy() {
        let options = MappingOptions::default();

        let (d, selected, _) = decide(Vec::new(), &options);
        assert_eq!(d.reason_code, MappingReason::UnsupportedInput);
        assert!(selected.is_empty());

        let (d, selected, alternatives) = decide(
            vec![
                candidate("a.md", 0.5, MatchMethod::TextMatch),
                candidate("b.md", 0.4, MatchMethod::TextMatch),
            ],
            &options,
        );
        assert_eq!(d.reason_code, MappingReason::MappingLowConfidence);
        assert_eq!(selected.len(), 1);
        assert_eq!(alternatives.len(), 1);

        let (d, selected, _) = decide(
            vec![
                candidate("a.md", 0.9, MatchMethod::TextMatch),
                candidate("b.md", 0.86, MatchMethod::TextMatch),
                candidate("c.md", 0.7, MatchMethod::TextMatch),
            ],
            &options,
        );
        assert_eq!(d.reason_code, MappingReason::MappingAmbiguous);
        assert_eq!(selected.len(), 2);

        let (d, selected, _) = decide(
            vec![
                candidate("a.md", 0.9, MatchMethod::TextMatch),
                candidate("b.md", 0.8, MatchMethod::TextMatch),
            ],
            &options,
        );
        assert!(d.is_continue());
        assert_eq!(selected[0].path.as_str(), "a.md");
    }

    #[test]
    fn alternatives_are_truncated() {
        let options = MappingOptions::default().with_max_alternatives(2);
        let items = (0..6)
            .map(|i| candidate(&format!("f{i}.md"), 0.2, MatchMethod::TextMatch))
            .collect();
        let (_, selected, alternatives) = decide(items, &options);
        assert_eq!(selected.len(), 1);
        assert_eq!(alternatives.len(), 2);
    }

    #[test]
    fn target_id_is_stable() {
        let path = WorkspacePath::parse("policies/docs.ls").unwrap();
        let symbol: SymbolPath = "capability.read_docs".parse().unwrap();
        let id = target_id(&path, Some(&symbol));
        assert_eq!(id, target_id(&path, Some(&symbol)));
        assert_ne!(id, target_id(&path, None));
        assert_eq!(id.len(), "tgt_".len() + 12);
    }
}
