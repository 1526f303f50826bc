//! Asynchronous shell command runner bound to one checkout.
//!
//! Every operation spawns exactly one shell process rooted at the runner's
//! working directory, captures stdout and stderr separately, and resolves
//! with stdout or fails with an [`ExecError`]. Calls are independent: a
//! runner holds no mutable state, so any number of operations may be in
//! flight at once and complete in whatever order their processes exit.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::config::TreedriverConfig;
use crate::errors::{CoreError, ExecError, OutputStream};
use crate::paths::expand_path;
use crate::revision::{
    log_command, parse_revision_list, MalformedLinePolicy, RevisionRange, RevisionRecord,
};

/// Default per-stream capture cap: 16 MiB.
pub const DEFAULT_MAX_BUFFER: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How captured output bytes become text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputEncoding {
    /// UTF-8, invalid sequences replaced with U+FFFD.
    #[default]
    Utf8Lossy,
    /// UTF-8, invalid sequences are an error.
    Utf8Strict,
}

impl OutputEncoding {
    fn decode(
        self,
        bytes: Vec<u8>,
        command: &str,
        stream: OutputStream,
    ) -> Result<String, ExecError> {
        match self {
            OutputEncoding::Utf8Lossy => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            OutputEncoding::Utf8Strict => {
                String::from_utf8(bytes).map_err(|_| ExecError::InvalidUtf8 {
                    command: command.to_string(),
                    stream,
                })
            }
        }
    }
}

/// Per-call overrides layered on top of the runner's defaults.
///
/// A field that is set wins; an unset field falls back to the runner's value.
/// `env` entries are added to the inherited environment of the child.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub cwd: Option<PathBuf>,
    pub encoding: Option<OutputEncoding>,
    pub max_buffer: Option<usize>,
    pub env: Vec<(String, String)>,
}

impl ExecOptions {
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_encoding(mut self, encoding: OutputEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn with_max_buffer(mut self, max_buffer: usize) -> Self {
        self.max_buffer = Some(max_buffer);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Shell program plus the flag that makes it run a command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    program: String,
    flag: &'static str,
}

impl Shell {
    /// Use `program` as the shell; `cmd`/`cmd.exe` get `/C`, anything else `-c`.
    pub fn new(program: impl Into<String>) -> Self {
        let program = program.into();
        let stem = Path::new(&program)
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let flag = if stem == "cmd" { "/C" } else { "-c" };
        Self { program, flag }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for Shell {
    #[cfg(windows)]
    fn default() -> Self {
        Self::new(std::env::var("ComSpec").unwrap_or_else(|_| "cmd.exe".into()))
    }

    #[cfg(not(windows))]
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs shell commands, `git` and `gclient` inside one working directory.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    root: PathBuf,
    shell: Shell,
    max_buffer: usize,
    encoding: OutputEncoding,
    malformed_lines: MalformedLinePolicy,
}

impl CommandRunner {
    /// Create a runner rooted at `workdir` (home shorthand is expanded once,
    /// here) with default settings.
    pub fn new(workdir: &str) -> Self {
        let runner = Self {
            root: expand_path(workdir),
            shell: Shell::default(),
            max_buffer: DEFAULT_MAX_BUFFER,
            encoding: OutputEncoding::default(),
            malformed_lines: MalformedLinePolicy::default(),
        };
        debug!(root = %runner.root.display(), "created CommandRunner");
        runner
    }

    /// Create a runner from a loaded configuration.
    pub fn from_config(config: &TreedriverConfig) -> Self {
        let runner = Self {
            root: expand_path(&config.runner.workdir),
            shell: config
                .runner
                .shell
                .as_deref()
                .map(Shell::new)
                .unwrap_or_default(),
            max_buffer: config.runner.max_buffer,
            encoding: config.runner.encoding,
            malformed_lines: config.revisions.malformed_lines,
        };
        debug!(
            root = %runner.root.display(),
            shell = runner.shell.program(),
            max_buffer = runner.max_buffer,
            "created CommandRunner from config"
        );
        runner
    }

    /// Choose how [`revision_list`](Self::revision_list) treats log lines
    /// without a `hash<TAB>subject` shape.
    pub fn with_malformed_lines(mut self, policy: MalformedLinePolicy) -> Self {
        self.malformed_lines = policy;
        self
    }

    /// The resolved working-directory root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Run `command` through the shell and return its stdout.
    ///
    /// Logs `    exec: <command>` before spawning and the elapsed seconds
    /// after completion, whether or not the command succeeded. Stderr is
    /// discarded on success and carried in the error otherwise.
    pub async fn exec(&self, command: &str, options: &ExecOptions) -> Result<String, ExecError> {
        let cwd = options.cwd.as_deref().unwrap_or(self.root.as_path());
        let encoding = options.encoding.unwrap_or(self.encoding);
        let max_buffer = options.max_buffer.unwrap_or(self.max_buffer);

        let started = Instant::now();
        info!("    exec: {command}");
        let result = self.run(command, cwd, &options.env, max_buffer).await;
        info!("          {:.3} seconds", started.elapsed().as_secs_f64());

        encoding.decode(result?, command, OutputStream::Stdout)
    }

    /// [`exec`](Self::exec) with no overrides.
    pub async fn exec_default(&self, command: &str) -> Result<String, ExecError> {
        self.exec(command, &ExecOptions::default()).await
    }

    /// List the commits in `range` as emitted by `git log`.
    #[instrument(skip(self, range), fields(root = %self.root.display(), %range))]
    pub async fn revision_list(
        &self,
        range: &RevisionRange,
    ) -> Result<Vec<RevisionRecord>, CoreError> {
        let raw = self.exec_default(&log_command(range)).await?;
        let records = parse_revision_list(&raw, self.malformed_lines)?;
        debug!(%range, count = records.len(), "listed revisions");
        Ok(records)
    }

    /// The last 100 commits up to `HEAD`.
    pub async fn recent_revisions(&self) -> Result<Vec<RevisionRecord>, CoreError> {
        self.revision_list(&RevisionRange::default()).await
    }

    /// Force the working tree to `reference`, discarding local modifications.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn checkout(&self, reference: &str) -> Result<(), ExecError> {
        self.exec_default(&format!("git checkout -f {reference}")).await?;
        Ok(())
    }

    /// Fetch and update declared dependencies with `gclient sync`.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn gclient_sync(&self) -> Result<(), ExecError> {
        self.exec_default("gclient sync").await?;
        Ok(())
    }

    async fn run(
        &self,
        command: &str,
        cwd: &Path,
        env: &[(String, String)],
        max_buffer: usize,
    ) -> Result<Vec<u8>, ExecError> {
        let mut cmd = Command::new(&self.shell.program);
        cmd.arg(self.shell.flag)
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
            command: command.to_string(),
            source,
        })?;

        let captured = tokio::try_join!(
            read_capped(child.stdout.take(), max_buffer, OutputStream::Stdout),
            read_capped(child.stderr.take(), max_buffer, OutputStream::Stderr),
        );

        let (stdout, stderr) = match captured {
            Ok(streams) => streams,
            Err(err) => {
                if let Err(kill_err) = child.kill().await {
                    debug!(error = %kill_err, "failed to kill child after capture error");
                }
                return Err(err.into_exec_error(command, max_buffer));
            }
        };

        let status = child.wait().await.map_err(|source| ExecError::Io {
            command: command.to_string(),
            source,
        })?;

        if status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&stderr).into_owned();
        Err(match status.code() {
            Some(exit_code) => ExecError::CommandFailed {
                command: command.to_string(),
                exit_code,
                stderr,
            },
            None => ExecError::Terminated {
                command: command.to_string(),
                signal: termination_signal(&status),
                stderr,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

enum CaptureError {
    Overflow(OutputStream),
    Io(std::io::Error),
}

impl CaptureError {
    fn into_exec_error(self, command: &str, limit: usize) -> ExecError {
        match self {
            CaptureError::Overflow(stream) => ExecError::MaxBufferExceeded {
                command: command.to_string(),
                stream,
                limit,
            },
            CaptureError::Io(source) => ExecError::Io {
                command: command.to_string(),
                source,
            },
        }
    }
}

/// Read a pipe to EOF, failing as soon as more than `limit` bytes arrive.
async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    limit: usize,
    stream: OutputStream,
) -> Result<Vec<u8>, CaptureError> {
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };

    let mut captured = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await.map_err(CaptureError::Io)?;
        if n == 0 {
            return Ok(captured);
        }
        if captured.len() + n > limit {
            return Err(CaptureError::Overflow(stream));
        }
        captured.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(unix)]
fn termination_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
