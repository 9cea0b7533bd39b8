//! AGP Workspace Boundary
//!
//! The trusted boundary between the workspace filesystem and the pipeline's
//! artifact model. Nothing in `agp-core` touches the filesystem except through
//! this crate.
//!
//! # Core Operations
//!
//! - **Resolve**: [`WorkspaceRoot::open`] canonicalizes the root
//! - **Walk**: [`walk_files`] lists regular files, skipping links and ignored trees
//! - **Probe**: [`VcsProbe`] reads repository metadata ([`GitCli`] shells out to `git`)
//! - **Parse**: [`ParserRegistry`] extracts declared symbols from documents
//! - **Capture/Restore**: [`capture_state`] / [`restore_state`] move exact bytes
//!   in and out of [`StateSnapshot`](agp_artifact::StateSnapshot)s
//!
//! # Architecture
//!
//! ```text
//! File System → walk_files ─→ inventory
//!             → ParserRegistry ─→ SyntaxTree
//!             ⇄ capture_state / restore_state ⇄ StateSnapshot
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod error;
pub mod language;
pub mod parsers;
pub mod root;
pub mod state;
pub mod vcs;

// Re-exports for convenience
pub use error::{Diagnostic, ParseError, VcsError, WorkspaceError};
pub use language::Language;
pub use parsers::{
    default_parsers, DocumentParser, DocumentSymbol, LineRange, LsDocumentParser, ParserRegistry,
    SyntaxTree,
};
pub use root::{walk_files, IgnoreFilter, WalkOutcome, WalkedFile, WorkspaceRoot};
pub use state::{capture_state, guard_path, read_file, remove_file, restore_state, write_file};
pub use vcs::{normalize_porcelain, GitCli, VcsProbe, VcsSummary};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the workspace boundary
    pub use crate::error::{ParseError, VcsError, WorkspaceError};
    pub use crate::parsers::{default_parsers, DocumentParser, ParserRegistry};
    pub use crate::root::{walk_files, IgnoreFilter, WorkspaceRoot};
    pub use crate::state::{capture_state, restore_state};
    pub use crate::vcs::{GitCli, VcsProbe};
    pub use agp_artifact::{StateSnapshot, WorkspacePath};
}
