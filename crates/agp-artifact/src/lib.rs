//! AGP Artifact Model
//!
//! Typed, content-addressed pipeline artifacts and the value primitives they
//! are built from.
//!
//! # Core Concepts
//!
//! - [`Artifact<K>`]: Shared envelope around a stage trace and payload
//! - [`ArtifactKind`]: Sealed trait binding a stage's type id, id prefix,
//!   trace and payload
//! - [`Sha256Digest`]: `sha256:<hex>` digest used for every content address
//! - [`DecisionRecord<R>`]: `continue`/`escalate`/`stop` plus a stage reason code
//! - [`WorkspacePath`]: Normalized workspace-relative path
//! - [`StateSnapshot`]: Byte-exact record of a set of workspace paths
//! - [`GlobCache`]: Memoizing path glob matcher
//!
//! # Example
//!
//! ```rust,ignore
//! use agp_artifact::{Artifact, EnvelopeHeader};
//!
//! let artifact = Artifact::<WorkspaceSnapshotKind>::seal(header, vec![], trace, payload)?;
//! println!("id: {}", artifact.id());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
mod artifact;
mod decision;
mod digest;
mod glob;
mod path;
mod snapshot;

// Re-exports
pub use artifact::{
    dedup_inputs, Artifact, ArtifactError, ArtifactKind, ArtifactRef, EnvelopeHeader,
    ARTIFACT_ID_HEX_LEN, SCHEMA_VERSION, TOOL_VERSION,
};

/// Sealed trait support - for declaring stage artifact kinds.
#[doc(hidden)]
pub mod __private {
    pub use super::artifact::private::Sealed;
}
pub use decision::{Decision, DecisionRecord, ReasonCode};
pub use digest::{DigestError, Sha256Digest, DIGEST_PREFIX};
pub use glob::{Glob, GlobCache, GlobError};
pub use path::{PathError, SymbolPath, WorkspacePath};
pub use snapshot::{FileSnapshotEntry, SnapshotIntegrityError, StateSnapshot};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;

    crate::reason_codes! {
        enum NoteReason {
            Ok => "ok",
            Empty => "empty",
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct NoteKind;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct NotePayload {
        decision: DecisionRecord<NoteReason>,
        state: StateSnapshot,
    }

    impl __private::Sealed for NoteKind {}

    impl ArtifactKind for NoteKind {
        type Trace = Vec<String>;
        type Payload = NotePayload;

        const TYPE_ID: &'static str = "note";
        const ID_PREFIX: &'static str = "note";
    }

    #[test]
    fn envelope_carries_decision_and_state() {
        let path = WorkspacePath::parse("docs/a.md").unwrap();
        let state = StateSnapshot::from_entries(vec![FileSnapshotEntry::present(path, b"# A\n")])
            .unwrap();
        let payload = NotePayload {
            decision: DecisionRecord::stop(NoteReason::Empty, "nothing to do"),
            state,
        };
        let artifact = Artifact::<NoteKind>::seal(
            EnvelopeHeader::new("run_x", "2026-01-01T00:00:00.000Z"),
            vec![],
            vec!["walker".to_string()],
            payload,
        )
        .unwrap();

        let json = artifact.to_json_pretty().unwrap();
        let back = Artifact::<NoteKind>::from_json(&json).unwrap();
        assert_eq!(back.payload().decision.decision, Decision::Stop);
        assert_eq!(back.payload().decision.reason_code.as_str(), "empty");
        back.payload().state.verify().unwrap();
        assert!(artifact.id().starts_with("note_"));
    }
}
