//! Revision records and the parser for two-field `git log` output.
//!
//! The log is requested as `%H%x09%s`, i.e. one `hash<TAB>subject` line per
//! commit. Parsing is deterministic and order preserving:
//!
//! 1. split on runs of `\n` / `\r` (both line-ending conventions),
//! 2. drop empty or whitespace-only segments ([`non_blank_lines`]),
//! 3. split each segment on its first tab into hash and subject,
//! 4. emit one [`RevisionRecord`] per segment in input order.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ParseError;

/// Pretty format handed to `git log`: full hash, a tab, the subject line.
pub const LOG_FORMAT: &str = "format:%H%x09%s";

/// Lower bound of [`RevisionRange::default`].
pub const DEFAULT_FROM: &str = "HEAD~100";

/// Upper bound of [`RevisionRange::default`].
pub const DEFAULT_TO: &str = "HEAD";

/// A single commit as reported by the log command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub hash: String,
    pub subject: String,
}

/// An exclusive `from..to` span of history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRange {
    pub from: String,
    pub to: String,
}

impl RevisionRange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// The 100-commit lookback window ending at `HEAD`.
impl Default for RevisionRange {
    fn default() -> Self {
        Self::new(DEFAULT_FROM, DEFAULT_TO)
    }
}

impl fmt::Display for RevisionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

/// What to do with a line that does not have the `hash<TAB>subject` shape.
///
/// A subject containing a bare `\r` is split into two segments, the second
/// without a tab; under [`Fail`](Self::Fail) that rejects the whole range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedLinePolicy {
    /// Stop parsing and return a [`ParseError`].
    #[default]
    Fail,
    /// Drop the line and log a warning.
    Skip,
}

/// Build the `git log` command line for `range`.
pub fn log_command(range: &RevisionRange) -> String {
    format!("git log --pretty='{}' {}", LOG_FORMAT, range)
}

/// Split raw output into lines, discarding blank and whitespace-only ones.
///
/// Runs of `\n` and `\r` act as a single separator, so CRLF output and
/// stray blank lines (including the trailing one) never reach the parser.
pub fn non_blank_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(['\n', '\r'])
        .filter(|segment| !segment.trim().is_empty())
}

/// Parse `hash<TAB>subject` lines into records, preserving input order.
///
/// Only the first tab separates the fields; any further tabs remain part of
/// the subject.
pub fn parse_revision_list(
    raw: &str,
    policy: MalformedLinePolicy,
) -> Result<Vec<RevisionRecord>, ParseError> {
    debug!("parsing revision list ({} bytes)", raw.len());
    let mut records = Vec::new();

    for (index, line) in non_blank_lines(raw).enumerate() {
        match parse_line(index + 1, line) {
            Ok(record) => records.push(record),
            Err(err) => match policy {
                MalformedLinePolicy::Fail => return Err(err),
                MalformedLinePolicy::Skip => {
                    warn!(error = %err, "skipping malformed log line");
                }
            },
        }
    }

    debug!(count = records.len(), "parsed revision records");
    Ok(records)
}

fn parse_line(record_index: usize, line: &str) -> Result<RevisionRecord, ParseError> {
    let (hash, subject) = line
        .split_once('\t')
        .ok_or_else(|| ParseError::MissingSeparator {
            record_index,
            line: line.to_string(),
        })?;

    if hash.is_empty() {
        return Err(ParseError::EmptyHash {
            record_index,
            line: line.to_string(),
        });
    }

    Ok(RevisionRecord {
        hash: hash.to_string(),
        subject: subject.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hash: &str, subject: &str) -> RevisionRecord {
        RevisionRecord {
            hash: hash.into(),
            subject: subject.into(),
        }
    }

    #[test]
    fn test_parse_two_records_drops_trailing_blank() {
        let raw = "aaa111\tFix bug\naaa222\tAdd feature\n\n";
        let records = parse_revision_list(raw, MalformedLinePolicy::Fail).unwrap();
        assert_eq!(
            records,
            vec![record("aaa111", "Fix bug"), record("aaa222", "Add feature")]
        );
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_revision_list("", MalformedLinePolicy::Fail)
            .unwrap()
            .is_empty());
        assert!(parse_revision_list("\n\r\n  \n", MalformedLinePolicy::Fail)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_parse_crlf_and_blank_runs() {
        let raw = "c3\tthird\r\n\r\n\r\nb2\tsecond\rA1\tfirst";
        let records = parse_revision_list(raw, MalformedLinePolicy::Fail).unwrap();
        assert_eq!(
            records,
            vec![
                record("c3", "third"),
                record("b2", "second"),
                record("A1", "first"),
            ]
        );
    }

    #[test]
    fn test_parse_preserves_order_and_duplicates() {
        let raw = "b\tsame\na\tsame\nb\tsame";
        let records = parse_revision_list(raw, MalformedLinePolicy::Fail).unwrap();
        let hashes: Vec<&str> = records.iter().map(|r| r.hash.as_str()).collect();
        assert_eq!(hashes, vec!["b", "a", "b"]);
    }

    #[test]
    fn test_parse_subject_keeps_extra_tabs() {
        let records =
            parse_revision_list("abc\tcol1\tcol2", MalformedLinePolicy::Fail).unwrap();
        assert_eq!(records, vec![record("abc", "col1\tcol2")]);
    }

    #[test]
    fn test_parse_empty_subject() {
        let records = parse_revision_list("abc\t\n", MalformedLinePolicy::Fail).unwrap();
        assert_eq!(records, vec![record("abc", "")]);
    }

    #[test]
    fn test_parse_missing_separator_fails() {
        let raw = "aaa\tok\nno-tab-here\nbbb\tok";
        let err = parse_revision_list(raw, MalformedLinePolicy::Fail).unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingSeparator {
                record_index: 2,
                line: "no-tab-here".into(),
            }
        );
    }

    #[test]
    fn test_parse_empty_hash_fails() {
        let err = parse_revision_list("\torphan subject", MalformedLinePolicy::Fail).unwrap_err();
        assert!(matches!(err, ParseError::EmptyHash { record_index: 1, .. }));
    }

    #[test]
    fn test_parse_skip_policy_drops_malformed_lines() {
        let raw = "aaa\tok\nno-tab-here\n\tno hash\nbbb\talso ok\n";
        let records = parse_revision_list(raw, MalformedLinePolicy::Skip).unwrap();
        assert_eq!(records, vec![record("aaa", "ok"), record("bbb", "also ok")]);
    }

    #[test]
    fn test_record_index_ignores_blank_runs() {
        let raw = "aaa\tok\n\n\n\r\nno-tab-here\n";
        let err = parse_revision_list(raw, MalformedLinePolicy::Fail).unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingSeparator {
                record_index: 2,
                line: "no-tab-here".into(),
            }
        );
    }

    #[test]
    fn test_carriage_return_inside_subject() {
        // `%s` keeps a bare `\r`, which the line split treats as a break.
        let raw = "abc\tFix\rbug\ndef\tNext\n";

        let err = parse_revision_list(raw, MalformedLinePolicy::Fail).unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingSeparator {
                record_index: 2,
                line: "bug".into(),
            }
        );

        let records = parse_revision_list(raw, MalformedLinePolicy::Skip).unwrap();
        assert_eq!(records, vec![record("abc", "Fix"), record("def", "Next")]);
    }

    #[test]
    fn test_non_blank_lines_filter() {
        let lines: Vec<&str> = non_blank_lines("a\n \n\t\n\r\nb\n").collect();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_range_display_and_default() {
        assert_eq!(RevisionRange::default().to_string(), "HEAD~100..HEAD");
        assert_eq!(RevisionRange::new("v1", "v2").to_string(), "v1..v2");
    }

    #[test]
    fn test_log_command() {
        assert_eq!(
            log_command(&RevisionRange::new("abc", "def")),
            "git log --pretty='format:%H%x09%s' abc..def"
        );
    }

    #[test]
    fn test_record_serializes_to_json() {
        let json = serde_json::to_string(&record("abc", "Fix bug")).unwrap();
        assert_eq!(json, r#"{"hash":"abc","subject":"Fix bug"}"#);
    }

    #[test]
    fn test_policy_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: MalformedLinePolicy,
        }
        let w: Wrapper = toml::from_str("policy = \"skip\"").unwrap();
        assert_eq!(w.policy, MalformedLinePolicy::Skip);
    }
}
