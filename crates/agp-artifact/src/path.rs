//! Workspace-relative file paths and document symbol paths
//!
//! [`WorkspacePath`] is the only path type allowed to cross the workspace
//! boundary: POSIX separators, relative, free of `.`/`..` traversal.
//! [`SymbolPath`] addresses a declared symbol inside a structured document.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Normalized workspace-relative path
///
/// # Examples
/// - `docs\\guide.md` → `docs/guide.md`
/// - `./src//lib.rs` → `src/lib.rs`
/// - `../etc/passwd`, `/etc/passwd`, `C:/x` → rejected
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkspacePath(String);

impl WorkspacePath {
    /// Validate and normalize a raw path
    ///
    /// # Errors
    /// Returns error if the path is empty, absolute, drive-prefixed,
    /// contains a `..` segment or a NUL byte
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.contains('\0') {
            return Err(PathError::NulByte);
        }
        let unified = raw.replace('\\', "/");
        if unified.starts_with('/') {
            return Err(PathError::Absolute(raw.to_string()));
        }
        if has_drive_prefix(&unified) {
            return Err(PathError::DrivePrefix(raw.to_string()));
        }

        let mut segments = Vec::new();
        for segment in unified.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(PathError::Traversal(raw.to_string())),
                other => segments.push(other),
            }
        }
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        Ok(Self(segments.join("/")))
    }

    /// Build from a path already known to live under `root`
    ///
    /// # Errors
    /// Returns error if `full` is not below `root` or is not representable
    pub fn from_fs_path(root: &Path, full: &Path) -> Result<Self, PathError> {
        let relative = full
            .strip_prefix(root)
            .map_err(|_| PathError::OutsideRoot(full.display().to_string()))?;
        let raw = relative
            .to_str()
            .ok_or_else(|| PathError::NonUtf8(relative.display().to_string()))?;
        Self::parse(raw)
    }

    /// Normalized string form
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join onto a filesystem root
    #[must_use]
    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, seg| acc.join(seg))
    }

    /// Path segments from root to leaf
    #[inline]
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// File name (last segment)
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// File stem: file name without its final extension
    #[must_use]
    pub fn file_stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => name,
            Some(idx) => &name[..idx],
        }
    }

    /// Final extension without the dot
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(&name[idx + 1..]),
        }
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl Display for WorkspacePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkspacePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for WorkspacePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for WorkspacePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for WorkspacePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let parsed = Self::parse(&raw).map_err(serde::de::Error::custom)?;
        if parsed.0 != raw {
            return Err(serde::de::Error::custom(format!(
                "path '{raw}' is not in normalized form"
            )));
        }
        Ok(parsed)
    }
}

/// Symbol address inside a structured document: `<kind>.<name>`
///
/// # Examples
/// - `capability.read_docs`
/// - `goal.ship_release`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolPath {
    kind: String,
    name: String,
}

impl SymbolPath {
    /// Create from kind and name
    ///
    /// # Errors
    /// Returns error if either part is empty or has invalid characters
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Result<Self, PathError> {
        let kind = kind.into();
        let name = name.into();
        for segment in [&kind, &name] {
            if segment.is_empty() {
                return Err(PathError::EmptySegment);
            }
            if segment.contains(|c: char| !c.is_alphanumeric() && c != '_' && c != '-') {
                return Err(PathError::InvalidSegment(segment.clone()));
            }
        }
        Ok(Self { kind, name })
    }

    /// Symbol kind (`goal`, `capability`, `check`)
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Symbol name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for SymbolPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl FromStr for SymbolPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s.split_once('.').ok_or(PathError::EmptySegment)?;
        Self::new(kind, name)
    }
}

impl serde::Serialize for SymbolPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for SymbolPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors related to paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Nothing left after normalization
    #[error("path is empty")]
    Empty,

    /// Absolute path
    #[error("absolute path not allowed: {0}")]
    Absolute(String),

    /// Drive-letter path
    #[error("drive-letter path not allowed: {0}")]
    DrivePrefix(String),

    /// `..` traversal
    #[error("path traversal not allowed: {0}")]
    Traversal(String),

    /// Embedded NUL byte
    #[error("path contains a NUL byte")]
    NulByte,

    /// Filesystem path outside the workspace root
    #[error("path is outside the workspace root: {0}")]
    OutsideRoot(String),

    /// Filesystem path is not valid UTF-8
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8(String),

    /// Empty symbol segment
    #[error("symbol path contains an empty segment")]
    EmptySegment,

    /// Invalid symbol segment characters
    #[error("invalid symbol segment: {0}")]
    InvalidSegment(String),
}
