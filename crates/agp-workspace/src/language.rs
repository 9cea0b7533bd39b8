//! Language detection by file extension

use agp_artifact::WorkspacePath;
use serde::{Deserialize, Serialize};

/// Languages recognized by the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Goal/capability/check documents
    Ls,
    /// Rust
    Rust,
    /// TypeScript
    TypeScript,
    /// JavaScript
    JavaScript,
    /// Python
    Python,
    /// Go
    Go,
    /// Markdown
    Markdown,
    /// JSON
    Json,
    /// YAML
    Yaml,
    /// TOML
    Toml,
    /// Shell
    Shell,
}

impl Language {
    /// All languages in tag order
    pub const ALL: [Language; 11] = [
        Language::Ls,
        Language::Rust,
        Language::TypeScript,
        Language::JavaScript,
        Language::Python,
        Language::Go,
        Language::Markdown,
        Language::Json,
        Language::Yaml,
        Language::Toml,
        Language::Shell,
    ];

    /// Get file extensions for this language
    #[inline]
    #[must_use]
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Ls => &["ls"],
            Language::Rust => &["rs"],
            Language::TypeScript => &["ts", "tsx"],
            Language::JavaScript => &["js", "jsx", "mjs", "cjs"],
            Language::Python => &["py"],
            Language::Go => &["go"],
            Language::Markdown => &["md"],
            Language::Json => &["json"],
            Language::Yaml => &["yaml", "yml"],
            Language::Toml => &["toml"],
            Language::Shell => &["sh"],
        }
    }

    /// Inventory tag
    #[inline]
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Language::Ls => "ls",
            Language::Rust => "rust",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Go => "go",
            Language::Markdown => "markdown",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Shell => "shell",
        }
    }

    /// Detect from the path's final extension (case-sensitive)
    #[must_use]
    pub fn from_path(path: &WorkspacePath) -> Option<Self> {
        let ext = path.extension()?;
        Self::ALL.into_iter().find(|lang| lang.extensions().contains(&ext))
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
