// SPDX-License-Identifier: PMPL-1.0-or-later

//! Known-issue registry
//!
//! The issue tracker fetcher writes the candidate issues to a JSON or YAML
//! file. Each entry either carries its pattern directly or embeds it in
//! the issue body:
//!
//! ````text
//! ```ci-regexp
//! timely communication error: .* lost
//! ```
//! ```ci-apply-to
//! testdrive
//! ```
//! ````
//!
//! The resulting [`Registry`] is an immutable snapshot for the whole run.

use crate::config::has_extension;
use crate::error::RegistryError;
use crate::types::{ErrorKind, ErrorRecord, IssueRef, IssueState, KnownIssue, ObservedError};
use regex::bytes::Regex;
use regex::Regex as TextRegex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// An issue as written by the tracker fetcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub state: IssueState,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub apply_to: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    issues: Vec<KnownIssue>,
    invalid: Vec<ObservedError>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile registry entries, keeping their order.
    ///
    /// Entries whose pattern fails to compile are kept as errors so the
    /// broken definition shows up in the annotation.
    pub fn from_entries(entries: Vec<RegistryEntry>) -> Result<Self, RegistryError> {
        let blocks = BodyBlocks::new()?;
        let mut registry = Self::default();

        for entry in entries {
            let body_blocks = entry.body.as_deref().map(|body| blocks.parse(body));
            let pattern = entry
                .pattern
                .clone()
                .or_else(|| body_blocks.as_ref().and_then(|b| b.regexp.clone()));
            let Some(pattern) = pattern else {
                debug!(issue = entry.number, "issue has no ci-regexp, skipping");
                continue;
            };
            let apply_to = entry
                .apply_to
                .clone()
                .or_else(|| body_blocks.and_then(|b| b.apply_to))
                .map(|scope| scope.trim().to_lowercase())
                .filter(|scope| !scope.is_empty());

            let issue_ref = IssueRef {
                number: entry.number,
                title: entry.title,
                url: entry.url,
            };

            match Regex::new(pattern.trim()) {
                Ok(compiled) => registry.issues.push(KnownIssue {
                    pattern: compiled,
                    state: entry.state,
                    number: issue_ref.number,
                    title: issue_ref.title,
                    url: issue_ref.url,
                    apply_to,
                }),
                Err(err) => {
                    warn!(issue = issue_ref.number, "invalid ci-regexp: {}", err);
                    registry.invalid.push(invalid_pattern_error(
                        issue_ref,
                        entry.state,
                        &pattern,
                        &err,
                    ));
                }
            }
        }

        Ok(registry)
    }

    /// Load a registry file, JSON or YAML by extension
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Result<Vec<RegistryEntry>, String> = if has_extension(path, "json") {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };
        let entries = entries.map_err(|reason| RegistryError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;
        debug!(path = %path.display(), entries = entries.len(), "loaded issue registry");
        Self::from_entries(entries)
    }

    pub fn issues(&self) -> &[KnownIssue] {
        &self.issues
    }

    /// Entries whose pattern did not compile, as reportable errors
    pub fn invalid_patterns(&self) -> &[ObservedError] {
        &self.invalid
    }
}

fn invalid_pattern_error(
    issue: IssueRef,
    state: IssueState,
    pattern: &str,
    err: &regex::Error,
) -> ObservedError {
    ObservedError::WithIssue {
        record: ErrorRecord::new(ErrorKind::InvalidIssuePattern, pattern.trim(), "ci-regexp")
            .with_details(Some(err.to_string())),
        issue,
        issue_is_closed: state == IssueState::Closed,
    }
}

/// Fenced blocks found in an issue body
#[derive(Debug, Default, PartialEq, Eq)]
struct ParsedBody {
    regexp: Option<String>,
    apply_to: Option<String>,
}

struct BodyBlocks {
    regexp: TextRegex,
    apply_to: TextRegex,
}

impl BodyBlocks {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            regexp: TextRegex::new(r"(?s)```ci-regexp\r?\n(?P<content>.*?)\r?\n```")?,
            apply_to: TextRegex::new(r"(?s)```ci-apply-to\r?\n(?P<content>.*?)\r?\n```")?,
        })
    }

    fn parse(&self, body: &str) -> ParsedBody {
        let block = |re: &TextRegex| {
            re.captures(body)
                .map(|caps| caps["content"].trim().to_string())
                .filter(|content| !content.is_empty())
        };
        ParsedBody {
            regexp: block(&self.regexp),
            apply_to: block(&self.apply_to),
        }
    }
}
