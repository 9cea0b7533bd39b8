//! Structured document parsers
//!
//! Intent mapping consults the registry for each eligible file. A parser
//! returns a [`SyntaxTree`] of declared symbols with line ranges, or a
//! [`ParseError`] with diagnostics. Files with no registered parser, or whose
//! tree has no symbols, fall back to plain text matching.

use crate::error::ParseError;
use agp_artifact::WorkspacePath;
use serde::{Deserialize, Serialize};

mod ls;

pub use ls::LsDocumentParser;

/// Inclusive 1-based line range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineRange {
    pub start_line: usize,
    pub end_line: usize,
}

/// One declared symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSymbol {
    /// Declaration keyword (`goal`, `capability`, `check`)
    pub kind: String,
    pub name: String,
    pub range: LineRange,
    /// Declaration source, header to closing brace
    pub text: String,
}

/// Parsed document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntaxTree {
    /// Symbols in source order
    pub symbols: Vec<DocumentSymbol>,
}

/// Parser trait for structured documents
///
/// Implement this trait to add support for new document formats.
pub trait DocumentParser: Send + Sync + 'static {
    /// Parse document text
    ///
    /// # Errors
    /// Returns [`ParseError::Syntax`] if the document is malformed
    fn parse(&self, path: &WorkspacePath, content: &str) -> Result<SyntaxTree, ParseError>;

    /// Supported file extensions (without dot)
    fn extensions(&self) -> &[&str];

    /// Check if this parser can handle the given path
    fn can_parse(&self, path: &WorkspacePath) -> bool {
        path.extension()
            .is_some_and(|ext| self.extensions().contains(&ext))
    }

    /// Parser priority (higher = tried first when multiple parsers match)
    fn priority(&self) -> i32 {
        0
    }
}

/// Parser registration for dynamic parser management
pub struct ParserRegistry {
    parsers: Vec<Box<dyn DocumentParser>>,
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("parser_count", &self.parsers.len())
            .field("extensions", &self.all_extensions())
            .finish()
    }
}

impl ParserRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Register a parser
    pub fn register<P: DocumentParser>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
        // Stable sort keeps registration order among equal priorities
        self.parsers
            .sort_by_key(|p| std::cmp::Reverse(p.priority()));
    }

    /// Find parser for path
    #[must_use]
    pub fn find_for_path(&self, path: &WorkspacePath) -> Option<&dyn DocumentParser> {
        self.parsers.iter().find(|p| p.can_parse(path)).map(|p| &**p)
    }

    /// Parse with the first matching parser
    ///
    /// # Errors
    /// Returns [`ParseError::NoParserForExtension`] when nothing matches, or
    /// the parser's own error
    pub fn parse(&self, path: &WorkspacePath, content: &str) -> Result<SyntaxTree, ParseError> {
        let parser = self.find_for_path(path).ok_or_else(|| {
            ParseError::NoParserForExtension(path.extension().unwrap_or_default().to_string())
        })?;
        parser.parse(path, content)
    }

    /// Get all registered extensions
    #[must_use]
    pub fn all_extensions(&self) -> Vec<&str> {
        self.parsers
            .iter()
            .flat_map(|p| p.extensions())
            .copied()
            .collect()
    }
}

/// Create default parser registry with built-in parsers
#[inline]
#[must_use]
pub fn default_parsers() -> ParserRegistry {
    let mut registry = ParserRegistry::new();
    registry.register(LsDocumentParser);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Shout;

    impl DocumentParser for Shout {
        fn parse(&self, _path: &WorkspacePath, _content: &str) -> Result<SyntaxTree, ParseError> {
            Ok(SyntaxTree::default())
        }

        fn extensions(&self) -> &[&str] {
            &["ls"]
        }

        fn priority(&self) -> i32 {
            20
        }
    }

    #[test]
    fn default_registry_handles_ls() {
        let registry = default_parsers();
        assert_eq!(registry.all_extensions(), vec!["ls"]);
        let path = WorkspacePath::parse("a.ls").unwrap();
        assert!(registry.find_for_path(&path).is_some());
        let md = WorkspacePath::parse("a.md").unwrap();
        assert!(matches!(
            registry.parse(&md, ""),
            Err(ParseError::NoParserForExtension(ext)) if ext == "md"
        ));
    }

    #[test]
    fn higher_priority_wins() {
        let mut registry = default_parsers();
        registry.register(Shout);
        let path = WorkspacePath::parse("a.ls").unwrap();
        let tree = registry.parse(&path, "goal g {\n}\n").unwrap();
        assert!(tree.symbols.is_empty());
    }

    #[test]
    fn equal_priority_keeps_registration_order() {
        struct Quiet;

        impl DocumentParser for Quiet {
            fn parse(
                &self,
                _path: &WorkspacePath,
                _content: &str,
            ) -> Result<SyntaxTree, ParseError> {
                Ok(SyntaxTree::default())
            }

            fn extensions(&self) -> &[&str] {
                &["ls"]
            }

            fn priority(&self) -> i32 {
                10
            }
        }

        let mut registry = default_parsers();
        registry.register(Quiet);
        let path = WorkspacePath::parse("a.ls").unwrap();
        let tree = registry.parse(&path, "goal g {\n}\n").unwrap();
        assert_eq!(tree.symbols.len(), 1);
    }
}
