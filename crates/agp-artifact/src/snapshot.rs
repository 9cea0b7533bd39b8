//! File and workspace-state snapshots
//!
//! A [`StateSnapshot`] records the exact bytes of a set of workspace paths.
//! Its `digest` covers only per-entry metadata (path, existence, length,
//! content hash) so it is cheap to compare; byte integrity is checked per
//! entry by [`FileSnapshotEntry::verify`].

use crate::digest::{DigestError, Sha256Digest};
use crate::path::WorkspacePath;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Captured state of one workspace path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSnapshotEntry {
    /// Workspace-relative path
    pub path: WorkspacePath,
    /// Whether a regular file existed
    pub exists: bool,
    /// Byte length (0 when absent)
    pub byte_length: u64,
    /// `sha256:` digest of the bytes, null when absent
    pub content_sha256: Option<Sha256Digest>,
    /// Standard base64 of the bytes, null when absent
    pub content_base64: Option<String>,
}

impl FileSnapshotEntry {
    /// Entry for a path with no file
    #[must_use]
    pub fn absent(path: WorkspacePath) -> Self {
        Self {
            path,
            exists: false,
            byte_length: 0,
            content_sha256: None,
            content_base64: None,
        }
    }

    /// Entry for a path holding `bytes`
    #[must_use]
    pub fn present(path: WorkspacePath, bytes: &[u8]) -> Self {
        Self {
            path,
            exists: true,
            byte_length: bytes.len() as u64,
            content_sha256: Some(Sha256Digest::compute(bytes)),
            content_base64: Some(STANDARD.encode(bytes)),
        }
    }

    /// Check the entry invariants and return the decoded bytes
    ///
    /// `None` for absent entries.
    ///
    /// # Errors
    /// Returns error if content fields disagree with `exists`, the base64 is
    /// malformed, or the decoded bytes do not match length and digest
    pub fn verify(&self) -> Result<Option<Vec<u8>>, SnapshotIntegrityError> {
        match (self.exists, &self.content_sha256, &self.content_base64) {
            (false, None, None) => {
                if self.byte_length != 0 {
                    return Err(self.corrupt("absent entry has non-zero length"));
                }
                Ok(None)
            }
            (true, Some(expected), Some(encoded)) => {
                let bytes = STANDARD
                    .decode(encoded)
                    .map_err(|e| self.corrupt(&format!("invalid base64: {e}")))?;
                if bytes.len() as u64 != self.byte_length {
                    return Err(self.corrupt(&format!(
                        "decoded {} bytes, recorded {}",
                        bytes.len(),
                        self.byte_length
                    )));
                }
                Sha256Digest::compute(&bytes)
                    .expect_matches(expected)
                    .map_err(|e| self.corrupt(&e.to_string()))?;
                Ok(Some(bytes))
            }
            _ => Err(self.corrupt("content fields must be null exactly when the file is absent")),
        }
    }

    fn corrupt(&self, reason: &str) -> SnapshotIntegrityError {
        SnapshotIntegrityError::CorruptEntry {
            path: self.path.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Metadata folded into a snapshot digest
#[derive(Serialize)]
struct EntryMetadata<'a> {
    path: &'a WorkspacePath,
    exists: bool,
    byte_length: u64,
    content_sha256: Option<&'a Sha256Digest>,
}

/// Digest-addressed set of file entries, sorted by path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateSnapshot {
    /// Digest over sorted entry metadata
    pub digest: Sha256Digest,
    /// Entries sorted by path
    pub files: Vec<FileSnapshotEntry>,
}

impl StateSnapshot {
    /// Build from entries in any order
    ///
    /// # Errors
    /// Returns error on duplicate paths
    pub fn from_entries(mut files: Vec<FileSnapshotEntry>) -> Result<Self, SnapshotIntegrityError> {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        if let Some(pair) = files.windows(2).find(|w| w[0].path == w[1].path) {
            return Err(SnapshotIntegrityError::DuplicatePath(pair[0].path.to_string()));
        }
        let digest = Self::compute_digest(&files)?;
        Ok(Self { digest, files })
    }

    /// Digest over the metadata of already-sorted entries
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn compute_digest(
        files: &[FileSnapshotEntry],
    ) -> Result<Sha256Digest, SnapshotIntegrityError> {
        let metadata: Vec<EntryMetadata<'_>> = files
            .iter()
            .map(|f| EntryMetadata {
                path: &f.path,
                exists: f.exists,
                byte_length: f.byte_length,
                content_sha256: f.content_sha256.as_ref(),
            })
            .collect();
        Ok(Sha256Digest::compute_json(&metadata)?)
    }

    /// Recompute the digest and verify every entry
    ///
    /// # Errors
    /// Returns the first integrity failure
    pub fn verify(&self) -> Result<(), SnapshotIntegrityError> {
        if self.files.windows(2).any(|w| w[0].path >= w[1].path) {
            return Err(SnapshotIntegrityError::Unsorted);
        }
        Self::compute_digest(&self.files)?
            .expect_matches(&self.digest)
            .map_err(SnapshotIntegrityError::DigestMismatch)?;
        for entry in &self.files {
            entry.verify()?;
        }
        Ok(())
    }

    /// Entry for a path, if recorded
    #[must_use]
    pub fn entry(&self, path: &WorkspacePath) -> Option<&FileSnapshotEntry> {
        self.files
            .binary_search_by(|f| f.path.cmp(path))
            .ok()
            .map(|idx| &self.files[idx])
    }

    /// True if every path in `paths` has an entry
    #[must_use]
    pub fn covers<'a, I>(&self, paths: I) -> bool
    where
        I: IntoIterator<Item = &'a WorkspacePath>,
    {
        paths.into_iter().all(|p| self.entry(p).is_some())
    }
}

/// Snapshot integrity failures
#[derive(Debug, thiserror::Error)]
pub enum SnapshotIntegrityError {
    /// One entry violates its invariant
    #[error("corrupted snapshot entry {path}: {reason}")]
    CorruptEntry { path: String, reason: String },

    /// Same path recorded twice
    #[error("duplicate snapshot path: {0}")]
    DuplicatePath(String),

    /// Entries not strictly sorted by path
    #[error("snapshot entries are not sorted by path")]
    Unsorted,

    /// Stored digest disagrees with the entries
    #[error("snapshot digest mismatch: {0}")]
    DigestMismatch(DigestError),

    /// Digest computation failed
    #[error("snapshot digest error: {0}")]
    Digest(#[from] DigestError),
}
