//! Pipeline configuration
//!
//! Every section defaults independently, so a TOML file only needs the keys
//! it overrides:
//!
//! ```toml
//! [mapping]
//! min_confidence = 0.8
//!
//! [apply]
//! require_approval = true
//! escalation_paths = ["infra/**"]
//! ```

use crate::error::ConfigError;
use agp_artifact::GlobCache;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Ignored by every snapshot unless overridden
pub const DEFAULT_IGNORED_PATHS: [&str; 5] = [
    "**/.git/**",
    "**/node_modules/**",
    "**/.venv/**",
    "**/__pycache__/**",
    "**/target/**",
];

/// Paths no plan may touch
pub const DEFAULT_FORBIDDEN_PATHS: [&str; 7] = [
    "**/.git/**",
    "**/node_modules/**",
    "**/.env",
    "**/.env.*",
    "**/*.pem",
    "**/*.key",
    "**/id_rsa*",
];

/// Paths whose changes need human review
pub const DEFAULT_POLICY_SENSITIVE_PATHS: [&str; 4] = [
    ".github/workflows/**",
    ".gitlab-ci.yml",
    "**/*policy*.schema.json",
    "**/policy-profile*.json",
];

/// Checks every patch run must evidence
pub const DEFAULT_REQUIRED_CHECKS: [&str; 3] = ["lint", "typecheck", "test"];

/// Rollback strategy supported by review bundles
pub const REVERSE_PATCH_STRATEGY: &str = "reverse_patch";

/// Capability needed to write the workspace
pub const FS_WRITE_CAPABILITY: &str = "fs.write";

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Sorted, de-duplicated copy of a string set
#[must_use]
pub fn canonical_set<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = items.into_iter().map(Into::into).collect();
    out.sort();
    out.dedup();
    out
}

/// Workspace snapshot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    /// Base ignore patterns
    pub ignored_paths: Vec<String>,
    /// Caller additions merged into the base set
    pub extra_ignored_paths: Vec<String>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            ignored_paths: owned(&DEFAULT_IGNORED_PATHS),
            extra_ignored_paths: Vec::new(),
        }
    }
}

impl SnapshotConfig {
    /// With an additional ignore pattern
    #[must_use]
    pub fn with_ignored(mut self, pattern: impl Into<String>) -> Self {
        self.extra_ignored_paths.push(pattern.into());
        self
    }

    /// Effective, canonical ignore set
    #[must_use]
    pub fn effective_ignored_paths(&self) -> Vec<String> {
        canonical_set(self.ignored_paths.iter().chain(&self.extra_ignored_paths).cloned())
    }
}

/// Intent mapping thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MappingOptions {
    /// Minimum confidence for autonomous selection
    pub min_confidence: f64,
    /// Candidates within this gap of the top are ambiguous
    pub ambiguity_gap: f64,
    /// Maximum alternatives kept in the payload
    pub max_alternatives: usize,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.75,
            ambiguity_gap: 0.05,
            max_alternatives: 5,
        }
    }
}

impl MappingOptions {
    /// With minimum confidence
    #[inline]
    #[must_use]
    pub fn with_min_confidence(mut self, value: f64) -> Self {
        self.min_confidence = value;
        self
    }

    /// With ambiguity gap
    #[inline]
    #[must_use]
    pub fn with_ambiguity_gap(mut self, value: f64) -> Self {
        self.ambiguity_gap = value;
        self
    }

    /// With max alternatives
    #[inline]
    #[must_use]
    pub fn with_max_alternatives(mut self, value: usize) -> Self {
        self.max_alternatives = value;
        self
    }

    /// Range checks
    ///
    /// # Errors
    /// Returns a description of the first invalid value
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("ambiguity_gap", self.ambiguity_gap),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        if self.max_alternatives == 0 {
            return Err("max_alternatives must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Safe diff plan configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlanConfig {
    pub max_file_changes: usize,
    pub max_hunks: usize,
    pub forbidden_paths: Vec<String>,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            max_file_changes: 5,
            max_hunks: 20,
            forbidden_paths: owned(&DEFAULT_FORBIDDEN_PATHS),
        }
    }
}

impl PlanConfig {
    /// With bounds
    #[inline]
    #[must_use]
    pub fn with_bounds(mut self, max_file_changes: usize, max_hunks: usize) -> Self {
        self.max_file_changes = max_file_changes;
        self.max_hunks = max_hunks;
        self
    }

    /// With an additional forbidden pattern
    #[must_use]
    pub fn with_forbidden(mut self, pattern: impl Into<String>) -> Self {
        self.forbidden_paths.push(pattern.into());
        self
    }

    /// Range checks
    ///
    /// # Errors
    /// Returns a description of the first invalid value
    pub fn validate(&self) -> Result<(), String> {
        if self.max_file_changes == 0 || self.max_hunks == 0 {
            return Err("max_file_changes and max_hunks must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Patch run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatchRunConfig {
    pub required_checks: Vec<String>,
    pub policy_sensitive_paths: Vec<String>,
}

impl Default for PatchRunConfig {
    fn default() -> Self {
        Self {
            required_checks: owned(&DEFAULT_REQUIRED_CHECKS),
            policy_sensitive_paths: owned(&DEFAULT_POLICY_SENSITIVE_PATHS),
        }
    }
}

impl PatchRunConfig {
    /// With required checks (replaces the defaults)
    #[must_use]
    pub fn with_required_checks<I, S>(mut self, checks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_checks = checks.into_iter().map(Into::into).collect();
        self
    }

    /// Range checks
    ///
    /// # Errors
    /// Returns a description of the first invalid value
    pub fn validate(&self) -> Result<(), String> {
        if self.required_checks.iter().any(|c| c.trim().is_empty()) {
            return Err("required check names must not be blank".to_string());
        }
        Ok(())
    }
}

/// Review bundle configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReviewConfig {
    pub rollback_strategy: String,
    /// Patterns flagged in derived risk notes
    pub policy_sensitive_paths: Vec<String>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            rollback_strategy: REVERSE_PATCH_STRATEGY.to_string(),
            policy_sensitive_paths: owned(&DEFAULT_POLICY_SENSITIVE_PATHS),
        }
    }
}

/// Side-effecting actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyAction {
    Apply,
    Rollback,
}

impl ApplyAction {
    /// Wire name
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Rollback => "rollback",
        }
    }
}

impl std::fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability and path policy for apply/rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApplyPolicy {
    pub allowed_actions: Vec<ApplyAction>,
    /// Capabilities required per action name
    pub required_capabilities: BTreeMap<String, Vec<String>>,
    pub require_approval: bool,
    /// Changes here stop the action
    pub blocked_paths: Vec<String>,
    /// Changes here need approval evidence
    pub escalation_paths: Vec<String>,
}

impl Default for ApplyPolicy {
    fn default() -> Self {
        let mut required_capabilities = BTreeMap::new();
        required_capabilities.insert("apply".to_string(), vec![FS_WRITE_CAPABILITY.to_string()]);
        required_capabilities.insert("rollback".to_string(), vec![FS_WRITE_CAPABILITY.to_string()]);
        Self {
            allowed_actions: vec![ApplyAction::Apply, ApplyAction::Rollback],
            required_capabilities,
            require_approval: false,
            blocked_paths: Vec::new(),
            escalation_paths: Vec::new(),
        }
    }
}

impl ApplyPolicy {
    /// With approval requirement
    #[inline]
    #[must_use]
    pub fn with_require_approval(mut self, required: bool) -> Self {
        self.require_approval = required;
        self
    }

    /// With a blocked pattern
    #[must_use]
    pub fn with_blocked(mut self, pattern: impl Into<String>) -> Self {
        self.blocked_paths.push(pattern.into());
        self
    }

    /// With an escalation pattern
    #[must_use]
    pub fn with_escalation(mut self, pattern: impl Into<String>) -> Self {
        self.escalation_paths.push(pattern.into());
        self
    }

    /// With allowed actions
    #[must_use]
    pub fn with_allowed_actions(mut self, actions: Vec<ApplyAction>) -> Self {
        self.allowed_actions = actions;
        self
    }

    /// Canonical capabilities required for `action`
    #[must_use]
    pub fn capabilities_for(&self, action: ApplyAction) -> Vec<String> {
        canonical_set(
            self.required_capabilities
                .get(action.as_str())
                .cloned()
                .unwrap_or_default(),
        )
    }

    /// Range checks
    ///
    /// # Errors
    /// Returns a description of the first invalid value
    pub fn validate(&self) -> Result<(), String> {
        if let Some(key) = self
            .required_capabilities
            .keys()
            .find(|k| *k != "apply" && *k != "rollback")
        {
            return Err(format!("unknown action in required_capabilities: {key}"));
        }
        Ok(())
    }
}

/// Whole-pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub snapshot: SnapshotConfig,
    pub mapping: MappingOptions,
    pub plan: PlanConfig,
    pub patch: PatchRunConfig,
    pub review: ReviewConfig,
    pub apply: ApplyPolicy,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With mapping options
    #[inline]
    #[must_use]
    pub fn with_mapping(mut self, mapping: MappingOptions) -> Self {
        self.mapping = mapping;
        self
    }

    /// With plan configuration
    #[inline]
    #[must_use]
    pub fn with_plan(mut self, plan: PlanConfig) -> Self {
        self.plan = plan;
        self
    }

    /// With apply policy
    #[inline]
    #[must_use]
    pub fn with_apply_policy(mut self, apply: ApplyPolicy) -> Self {
        self.apply = apply;
        self
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Returns error on syntax errors, unknown keys or invalid values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is invalid
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check ranges and compile every pattern
    ///
    /// # Errors
    /// Returns the first invalid value or pattern
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.mapping.validate().map_err(ConfigError::Invalid)?;
        self.plan.validate().map_err(ConfigError::Invalid)?;
        self.patch.validate().map_err(ConfigError::Invalid)?;
        self.apply.validate().map_err(ConfigError::Invalid)?;
        if self.review.rollback_strategy.trim().is_empty() {
            return Err(ConfigError::Invalid("rollback_strategy must not be blank".to_string()));
        }
        let globs = GlobCache::new();
        globs.validate_all(
            self.snapshot
                .ignored_paths
                .iter()
                .chain(&self.snapshot.extra_ignored_paths)
                .chain(&self.plan.forbidden_paths)
                .chain(&self.patch.policy_sensitive_paths)
                .chain(&self.review.policy_sensitive_paths)
                .chain(&self.apply.blocked_paths)
                .chain(&self.apply.escalation_paths),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(PipelineConfig::from_toml_str("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [mapping]
            min_confidence = 0.8

            [apply]
            require_approval = true
            escalation_paths = ["infra/**"]

            [apply.required_capabilities]
            apply = ["fs.write", "net.none"]
            "#,
        )
        .unwrap();
        assert_eq!(config.mapping.min_confidence, 0.8);
        assert_eq!(config.mapping.max_alternatives, 5);
        assert!(config.apply.require_approval);
        assert_eq!(
            config.apply.capabilities_for(ApplyAction::Apply),
            vec!["fs.write".to_string(), "net.none".to_string()]
        );
        assert!(config.apply.capabilities_for(ApplyAction::Rollback).is_empty());
        assert_eq!(config.plan, PlanConfig::default());
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(PipelineConfig::from_toml_str("[mapping]\nmin_confidence = 1.5\n").is_err());
        assert!(PipelineConfig::from_toml_str("[mapping]\nmax_alternatives = 0\n").is_err());
        assert!(PipelineConfig::from_toml_str("[plan]\nmax_hunks = 0\n").is_err());
        assert!(PipelineConfig::from_toml_str("[apply]\nblocked_paths = [\"/etc/**\"]\n").is_err());
        assert!(PipelineConfig::from_toml_str("[unknown]\nx = 1\n").is_err());
    }

    #[test]
    fn snapshot_ignores_are_merged_canonically() {
        let config = SnapshotConfig::default()
            .with_ignored("dist/**")
            .with_ignored("**/.git/**");
        let effective = config.effective_ignored_paths();
        assert_eq!(effective.len(), DEFAULT_IGNORED_PATHS.len() + 1);
        assert!(effective.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agp.toml");
        std::fs::write(&path, "[plan]\nmax_file_changes = 2\n").unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap().plan.max_file_changes, 2);
        assert!(matches!(
            PipelineConfig::load(dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
