//! Path glob matching
//!
//! A deliberately small grammar over workspace-relative POSIX paths:
//!
//! | Token | Meaning |
//! |-------|---------|
//! | `*`   | zero or more characters within one segment |
//! | `**/` | zero or more leading directories |
//! | `/**` (trailing) | the prefix itself or anything under it |
//! | `**`  | anything, across segments |
//! | other | literal character |
//!
//! Globs compile to an anchored [`regex::Regex`]. [`GlobCache`] memoizes
//! compiled globs for the component that owns it.

use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;

/// Compiled glob pattern
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    matcher: Regex,
}

impl Glob {
    /// Compile a glob
    ///
    /// # Errors
    /// Returns error if the pattern is empty or absolute
    pub fn new(pattern: &str) -> Result<Self, GlobError> {
        let matcher = Regex::new(&translate(pattern)?)
            .map_err(|e| GlobError::Compile(pattern.to_string(), e.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
        })
    }

    /// Source pattern
    #[inline]
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Test a normalized workspace-relative path
    #[inline]
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }
}

/// Translate a glob into an anchored regex source
///
/// # Errors
/// Returns error if the pattern is empty or starts with `/`
pub fn translate(pattern: &str) -> Result<String, GlobError> {
    if pattern.is_empty() {
        return Err(GlobError::Empty);
    }
    if pattern.starts_with('/') {
        return Err(GlobError::Absolute(pattern.to_string()));
    }
    if pattern == "**" {
        return Ok("^.*$".to_string());
    }

    let (body, any_below) = match pattern.strip_suffix("/**") {
        Some(prefix) => (prefix, true),
        None => (pattern, false),
    };

    let chars: Vec<char> = body.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let at_segment_start = i == 0 || chars[i - 1] == '/';
                if at_segment_start && chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            c => {
                let mut buf = [0u8; 4];
                out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
                i += 1;
            }
        }
    }
    if any_below {
        out.push_str("(?:/.*)?");
    }
    out.push('$');
    Ok(out)
}

/// Memoizing glob matcher owned by one evaluating component
///
/// Cloning shares the memo table; separate `GlobCache::new()` calls never do.
#[derive(Debug, Clone, Default)]
pub struct GlobCache {
    compiled: Arc<DashMap<String, Arc<Glob>>>,
}

impl GlobCache {
    /// Create an empty cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or compile a glob
    ///
    /// # Errors
    /// Returns error if the pattern does not compile
    pub fn get(&self, pattern: &str) -> Result<Arc<Glob>, GlobError> {
        if let Some(hit) = self.compiled.get(pattern) {
            return Ok(Arc::clone(hit.value()));
        }
        let glob = Arc::new(Glob::new(pattern)?);
        self.compiled
            .insert(pattern.to_string(), Arc::clone(&glob));
        Ok(glob)
    }

    /// Test a path against one pattern
    ///
    /// # Errors
    /// Returns error if the pattern does not compile
    pub fn is_match(&self, pattern: &str, path: &str) -> Result<bool, GlobError> {
        Ok(self.get(pattern)?.is_match(path))
    }

    /// First pattern (in the given order) matching `path`
    ///
    /// # Errors
    /// Returns error if any pattern consulted does not compile
    pub fn first_match<'p, I>(&self, patterns: I, path: &str) -> Result<Option<&'p str>, GlobError>
    where
        I: IntoIterator<Item = &'p String>,
    {
        for pattern in patterns {
            if self.is_match(pattern, path)? {
                return Ok(Some(pattern.as_str()));
            }
        }
        Ok(None)
    }

    /// Compile every pattern up front
    ///
    /// # Errors
    /// Returns the first compile error
    pub fn validate_all<'p, I>(&self, patterns: I) -> Result<(), GlobError>
    where
        I: IntoIterator<Item = &'p String>,
    {
        for pattern in patterns {
            self.get(pattern)?;
        }
        Ok(())
    }

    /// Number of memoized globs
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    /// True when nothing has been compiled yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Glob compilation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GlobError {
    /// Empty pattern
    #[error("glob pattern is empty")]
    Empty,

    /// Absolute pattern
    #[error("glob pattern must be workspace-relative: {0}")]
    Absolute(String),

    /// Regex backend rejected the translation
    #[error("glob pattern '{0}' failed to compile: {1}")]
    Compile(String, String),
}
