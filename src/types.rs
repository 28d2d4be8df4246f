// SPDX-License-Identifier: PMPL-1.0-or-later

//! Core type definitions for ci-annotate
//!
//! Raw matches come out of the scanner, correlator and JUnit extractor,
//! get classified into [`ObservedError`]s and are finally grouped into an
//! [`Annotation`].

use crate::history::BuildHistory;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

/// A located span of log bytes identified as a fatal signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawErrorMatch {
    pub text: Vec<u8>,
    pub file: String,
}

impl RawErrorMatch {
    pub fn new(text: impl Into<Vec<u8>>, file: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            file: file.into(),
        }
    }

    /// Matched text, with invalid UTF-8 replaced
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.text).into_owned()
    }
}

/// One failing or erroring test case result from a JUnit report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    pub test_class: String,
    pub test_case: String,
    pub message: String,
    pub text: String,
}

impl TestFailure {
    /// Failures emitted by the coverage tooling are informational only
    pub fn is_coverage_failure(&self) -> bool {
        self.text.contains("in Code Coverage") || self.message.contains("covered")
    }
}

/// Anything the collection stage hands to the classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectedError {
    Log(RawErrorMatch),
    Junit(TestFailure),
}

/// Lifecycle state of a registered issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

/// A registry entry with its compiled matching pattern
#[derive(Debug, Clone)]
pub struct KnownIssue {
    pub pattern: Regex,
    pub state: IssueState,
    pub number: u64,
    pub title: String,
    pub url: String,
    /// Lowercased build-step key or label this issue is limited to
    pub apply_to: Option<String>,
}

impl KnownIssue {
    pub fn issue_ref(&self) -> IssueRef {
        IssueRef {
            number: self.number,
            title: self.title.clone(),
            url: self.url.clone(),
        }
    }

    /// Whether the scope restriction admits the given step key or label
    pub fn applies_to(&self, step_key: &str, step_label: &str) -> bool {
        match &self.apply_to {
            None => true,
            Some(scope) => {
                *scope == step_key.to_lowercase() || *scope == step_label.to_lowercase()
            }
        }
    }
}

/// Reference to an issue as rendered next to an error
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssueRef {
    pub number: u64,
    pub title: String,
    pub url: String,
}

/// Kind tag of an observed error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    KnownIssue,
    PotentialRegression,
    UnknownError,
    InvalidIssuePattern,
    FailureInCoverageMode,
}

impl ErrorKind {
    /// Human readable prefix used in annotations
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::KnownIssue => "Known issue",
            ErrorKind::PotentialRegression => "Potential regression",
            ErrorKind::UnknownError => "Unknown error",
            ErrorKind::InvalidIssuePattern => "Invalid regex in ci-regexp",
            ErrorKind::FailureInCoverageMode => "Failure",
        }
    }

    /// Stable tag stored with analytics entries
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorKind::KnownIssue => "KNOWN_ISSUE",
            ErrorKind::PotentialRegression => "POTENTIAL_REGRESSION",
            ErrorKind::UnknownError => "UNKNOWN ERROR",
            ErrorKind::InvalidIssuePattern => "INVALID_ISSUE_REGEX",
            ErrorKind::FailureInCoverageMode => "FAILURE_IN_COVERAGE_MODE",
        }
    }
}

/// Crop limits applied when rendering message and details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TruncationLimits {
    pub max_message_len: usize,
    pub max_details_len: usize,
}

impl Default for TruncationLimits {
    fn default() -> Self {
        Self {
            max_message_len: 10_000,
            max_details_len: 10_000,
        }
    }
}

/// Attributes shared by every observed error variant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_url: Option<String>,
    #[serde(skip)]
    pub limits: TruncationLimits,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            location: location.into(),
            location_url: None,
            limits: TruncationLimits::default(),
        }
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }

    pub fn with_location_url(mut self, url: Option<String>) -> Self {
        self.location_url = url;
        self
    }

    pub fn with_limits(mut self, limits: TruncationLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// The unit of classification and reporting.
///
/// Equality is structural; occurrence counts live in [`ErrorOccurrences`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ObservedError {
    /// Matched an issue from the registry (or is a broken registry entry)
    WithIssue {
        record: ErrorRecord,
        issue: IssueRef,
        issue_is_closed: bool,
    },
    /// No issue reference
    Located(ErrorRecord),
    /// Reported verbatim, never matched against issues
    CoverageFailure(ErrorRecord),
}

impl ObservedError {
    pub fn record(&self) -> &ErrorRecord {
        match self {
            ObservedError::WithIssue { record, .. } => record,
            ObservedError::Located(record) => record,
            ObservedError::CoverageFailure(record) => record,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.record().kind
    }

    pub fn issue(&self) -> Option<&IssueRef> {
        match self {
            ObservedError::WithIssue { issue, .. } => Some(issue),
            _ => None,
        }
    }
}

/// An observed error together with how often it was seen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorOccurrences {
    pub error: ObservedError,
    pub occurrences: usize,
}

impl ErrorOccurrences {
    pub fn once(error: ObservedError) -> Self {
        Self {
            error,
            occurrences: 1,
        }
    }
}

/// The final report for one test suite / job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub suite_name: String,
    pub job_id: String,
    pub is_failure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_history: Option<BuildHistory>,
    pub known_errors: Vec<ErrorOccurrences>,
    pub unknown_errors: Vec<ErrorOccurrences>,
}

impl Annotation {
    /// CI annotation style: informational unless unknown errors exist or
    /// the job failed without leaving any error in its logs
    pub fn style(&self) -> &'static str {
        let silent_failure = self.is_failure && self.known_errors.is_empty();
        if self.unknown_errors.is_empty() && !silent_failure {
            "info"
        } else {
            "error"
        }
    }
}
