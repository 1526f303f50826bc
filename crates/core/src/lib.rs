//! treedriver core library.
//!
//! Drives a local source checkout through external command-line tools:
//! home-shorthand path expansion, an asynchronous shell command runner with
//! timing diagnostics and output caps, a parser for two-field `git log`
//! output, and `git checkout` / `gclient sync` wrappers built on top of it.

pub mod config;
pub mod errors;
pub mod paths;
pub mod revision;
pub mod runner;

// Re-exports for convenience.
pub use config::TreedriverConfig;
pub use errors::{CoreError, ExecError, ParseError};
pub use paths::expand_path;
pub use revision::{RevisionRange, RevisionRecord};
pub use runner::{CommandRunner, ExecOptions, OutputEncoding};
