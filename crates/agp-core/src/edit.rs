//! Planned edits

use serde::{Deserialize, Serialize};

/// File-level operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditOperation {
    Create,
    Modify,
    Delete,
}

impl EditOperation {
    /// Wire name
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }

    /// Operation that undoes this one
    #[inline]
    #[must_use]
    pub const fn inverse(&self) -> Self {
        match self {
            Self::Create => Self::Delete,
            Self::Modify => Self::Modify,
            Self::Delete => Self::Create,
        }
    }
}

impl std::fmt::Display for EditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned file change
///
/// `path` is kept as written so that blocked plans still record the
/// offending value; stages that touch the filesystem parse it first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Edit {
    pub path: String,
    pub operation: EditOperation,
    pub justification: String,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub symbol_path: Option<String>,
}

impl Edit {
    /// Create an edit without target metadata
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        operation: EditOperation,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            operation,
            justification: justification.into(),
            target_id: None,
            symbol_path: None,
        }
    }

    /// With mapping target metadata
    #[must_use]
    pub fn with_target(
        mut self,
        target_id: impl Into<String>,
        symbol_path: Option<String>,
    ) -> Self {
        self.target_id = Some(target_id.into());
        self.symbol_path = symbol_path;
        self
    }

    /// Justification on one line
    #[must_use]
    pub fn single_line_justification(&self) -> String {
        self.justification.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
