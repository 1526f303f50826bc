//! Error types for the treedriver core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them for callers that want a single
//! error type. Path expansion is total and has no error type.

use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Subprocess errors
// ---------------------------------------------------------------------------

/// Which captured stream an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Errors from running a shell command.
///
/// Every variant carries the command line that was executed so a failure can
/// be reported without extra context from the caller.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The shell process could not be started at all.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command exited with a non-zero status.
    #[error("command `{command}` failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The command was terminated without an exit code (e.g. by a signal).
    #[error("command `{command}` was terminated (signal {}): {stderr}", signal_label(.signal))]
    Terminated {
        command: String,
        signal: Option<i32>,
        stderr: String,
    },

    /// One of the captured streams grew past the configured cap.
    #[error("command `{command}` exceeded the {limit}-byte {stream} buffer")]
    MaxBufferExceeded {
        command: String,
        stream: OutputStream,
        limit: usize,
    },

    /// Strict decoding was requested and the output was not valid UTF-8.
    #[error("command `{command}` produced invalid UTF-8 on {stream}")]
    InvalidUtf8 {
        command: String,
        stream: OutputStream,
    },

    /// Reading pipes or waiting on the child failed.
    #[error("I/O error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

fn signal_label(signal: &Option<i32>) -> String {
    match signal {
        Some(signal) => signal.to_string(),
        None => "unknown".into(),
    }
}

impl ExecError {
    /// The command line this error refers to.
    pub fn command(&self) -> &str {
        match self {
            ExecError::Spawn { command, .. }
            | ExecError::CommandFailed { command, .. }
            | ExecError::Terminated { command, .. }
            | ExecError::MaxBufferExceeded { command, .. }
            | ExecError::InvalidUtf8 { command, .. }
            | ExecError::Io { command, .. } => command,
        }
    }

    /// The exit code, when the child exited normally with a failure status.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ExecError::CommandFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Revision log parse errors
// ---------------------------------------------------------------------------

/// Errors from parsing `hash<TAB>subject` log output.
///
/// `record_index` is the 1-based position among non-blank lines, i.e. the
/// record the line would have become, not the raw output line number.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A log line did not contain the tab separating hash and subject.
    #[error("log record {record_index} has no tab separator: {line:?}")]
    MissingSeparator { record_index: usize, line: String },

    /// A log line started with the separator, leaving no hash.
    #[error("log record {record_index} has an empty hash: {line:?}")]
    EmptyHash { record_index: usize, line: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
