//! AGP CLI - command-line driver for the governance pipeline
//!
//! Every subcommand runs exactly one stage: it reads upstream artifacts as
//! JSON files, verifies them, and writes the new artifact to stdout or
//! `--out`. Logs go to stderr.
//!
//! # Quick Start
//!
//! ```text
//! agp snapshot --root . -o wsnap.json
//! agp map --snapshot wsnap.json --intent "Update capability read_docs" -o imap.json
//! agp plan --mapping imap.json -o dplan.json
//! agp patch --plan dplan.json --results checks.json -o patch.json
//! agp bundle --patch-run patch.json --plan dplan.json --mapping imap.json --snapshot wsnap.json -o prb.json
//! agp apply --bundle prb.json --capability fs.write --execute -o applyrb.json
//! agp rollback --bundle prb.json --prior applyrb.json --capability fs.write --execute
//! ```

pub mod cli;
pub mod commands;
pub mod io;
pub mod logging;

pub use cli::build_cli;
pub use commands::{run, Outcome};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
