//! TOML-based configuration for treedriver.
//!
//! Every field except `runner.workdir` has a default, so a minimal file is a
//! single `[runner]` table naming the checkout. Front-ends may fill in
//! `workdir` from their own flags before calling [`TreedriverConfig::validate`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::revision::MalformedLinePolicy;
use crate::runner::{OutputEncoding, DEFAULT_MAX_BUFFER};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreedriverConfig {
    /// Command runner settings.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Revision log parsing settings.
    #[serde(default)]
    pub revisions: RevisionConfig,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Where and how shell commands run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Checkout root. `~` and `~/...` are expanded.
    #[serde(default)]
    pub workdir: String,

    /// Shell used to run command lines. Platform default when unset.
    #[serde(default)]
    pub shell: Option<String>,

    /// Per-stream capture cap in bytes (default 16 MiB).
    #[serde(default = "default_max_buffer")]
    pub max_buffer: usize,

    /// How captured stdout is decoded.
    #[serde(default)]
    pub encoding: OutputEncoding,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_buffer() -> usize {
    DEFAULT_MAX_BUFFER
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workdir: String::new(),
            shell: None,
            max_buffer: default_max_buffer(),
            encoding: OutputEncoding::default(),
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Revisions
// ---------------------------------------------------------------------------

/// Revision log settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevisionConfig {
    /// Handling of log lines without a `hash<TAB>subject` shape.
    #[serde(default)]
    pub malformed_lines: MalformedLinePolicy,
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl TreedriverConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: TreedriverConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.workdir.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "runner.workdir".into(),
                detail: "working directory must not be empty".into(),
            });
        }
        if self.runner.max_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "runner.max_buffer".into(),
                detail: "max buffer must be > 0".into(),
            });
        }
        if let Some(shell) = &self.runner.shell {
            if shell.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "runner.shell".into(),
                    detail: "shell must not be empty when set".into(),
                });
            }
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[runner]
workdir = "~/chromium/src"
shell = "/bin/bash"
max_buffer = 1048576
encoding = "utf8-strict"
log_level = "debug"

[revisions]
malformed_lines = "skip"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: TreedriverConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.runner.workdir, "~/chromium/src");
        assert_eq!(config.runner.shell.as_deref(), Some("/bin/bash"));
        assert_eq!(config.runner.max_buffer, 1024 * 1024);
        assert_eq!(config.runner.encoding, OutputEncoding::Utf8Strict);
        assert_eq!(config.runner.log_level, "debug");
        assert_eq!(config.revisions.malformed_lines, MalformedLinePolicy::Skip);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("treedriver.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = TreedriverConfig::load_and_validate(&path).expect("load failed");
        assert_eq!(config.runner.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = TreedriverConfig::load_from_file("/nonexistent/treedriver.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[runner\nworkdir = ").unwrap();

        let result = TreedriverConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validate_rejects_empty_workdir() {
        let config = TreedriverConfig::default();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "runner.workdir"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_buffer() {
        let mut config: TreedriverConfig = toml::from_str(sample_toml()).unwrap();
        config.runner.max_buffer = 0;
        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "runner.max_buffer"
        ));
    }

    #[test]
    fn test_validate_rejects_blank_shell() {
        let mut config: TreedriverConfig = toml::from_str(sample_toml()).unwrap();
        config.runner.shell = Some("  ".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults() {
        let minimal = r#"
[runner]
workdir = "/src/chromium"
"#;
        let config: TreedriverConfig = toml::from_str(minimal).unwrap();
        assert_eq!(config.runner.max_buffer, 16 * 1024 * 1024);
        assert_eq!(config.runner.encoding, OutputEncoding::Utf8Lossy);
        assert_eq!(config.runner.log_level, "info");
        assert!(config.runner.shell.is_none());
        assert_eq!(config.revisions.malformed_lines, MalformedLinePolicy::Fail);
        assert!(config.validate().is_ok());
    }
}
