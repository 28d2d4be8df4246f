// SPDX-License-Identifier: PMPL-1.0-or-later

//! Known-issue classification
//!
//! Every collected error ends up in exactly one bucket: a known issue
//! (open), a potential regression (closed issue whose pattern matched
//! again) or an unknown error. Open issues always outrank closed ones;
//! within a state the first entry in registry order wins.

use crate::config::RunContext;
use crate::registry::Registry;
use crate::types::{
    CollectedError, ErrorKind, ErrorRecord, IssueState, KnownIssue, ObservedError, RawErrorMatch,
    TestFailure,
};
use std::collections::HashSet;
use tracing::debug;

/// Placeholder substituted for the current build number
pub const BUILD_PLACEHOLDER: &str = "<build>";
/// Placeholder substituted for the current job id
pub const JOB_PLACEHOLDER: &str = "<job>";

/// Outcome of matching one searchable text against the registry
#[derive(Debug, Clone, Copy)]
pub enum IssueMatch<'a> {
    Open(&'a KnownIssue),
    Closed(&'a KnownIssue),
    NoMatch,
}

/// Flatten line breaks so patterns never have to spell out newlines
pub fn flatten_line_breaks(text: &str) -> String {
    text.replace("\r\n", " ").replace('\n', " ")
}

/// Strip run-specific noise before searching issue patterns.
///
/// Line breaks become single spaces; references to the current job and
/// build become generic placeholders.
pub fn normalize_for_matching(text: &str, ctx: &RunContext) -> String {
    let mut normalized = flatten_line_breaks(text);
    if !ctx.job_id.is_empty() {
        normalized = normalized.replace(&ctx.job_id, JOB_PLACEHOLDER);
    }
    if !ctx.build_number.is_empty() {
        normalized = replace_number(&normalized, &ctx.build_number, BUILD_PLACEHOLDER);
    }
    normalized
}

/// Replace `number` only where it is not part of a longer number
fn replace_number(text: &str, number: &str, placeholder: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (pos, _) in text.match_indices(number) {
        let end = pos + number.len();
        let before = text[..pos].chars().next_back();
        let after = text[end..].chars().next();
        let isolated = !before.is_some_and(|c| c.is_ascii_digit())
            && !after.is_some_and(|c| c.is_ascii_digit());
        if isolated {
            out.push_str(&text[last..pos]);
            out.push_str(placeholder);
            last = end;
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Text searched for a message with optional details
pub fn searchable_text(message: &str, details: Option<&str>) -> String {
    match details {
        Some(details) => format!("{}\n{}", message, details),
        None => message.to_string(),
    }
}

/// Pure matcher over an immutable registry
pub struct IssueMatcher<'a> {
    registry: &'a Registry,
    ctx: &'a RunContext,
}

impl<'a> IssueMatcher<'a> {
    pub fn new(registry: &'a Registry, ctx: &'a RunContext) -> Self {
        Self { registry, ctx }
    }

    /// Match a searchable text: open issues first, then closed ones.
    ///
    /// A pattern matches when it finds either the flattened literal text or
    /// its placeholder form.
    pub fn find(&self, text: &str) -> IssueMatch<'a> {
        let literal = flatten_line_breaks(text);
        let normalized = normalize_for_matching(text, self.ctx);
        let haystacks = [literal.as_bytes(), normalized.as_bytes()];

        if let Some(issue) = self.first_match(IssueState::Open, &haystacks) {
            return IssueMatch::Open(issue);
        }
        if let Some(issue) = self.first_match(IssueState::Closed, &haystacks) {
            return IssueMatch::Closed(issue);
        }
        IssueMatch::NoMatch
    }

    fn first_match(&self, state: IssueState, haystacks: &[&[u8]]) -> Option<&'a KnownIssue> {
        let registry: &'a Registry = self.registry;
        registry.issues().iter().find(|issue| {
            issue.state == state
                && haystacks.iter().any(|haystack| issue.pattern.is_match(haystack))
                && issue.applies_to(&self.ctx.step_key, &self.ctx.step_label)
        })
    }
}

/// Classified errors of one run, before grouping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub known: Vec<ObservedError>,
    pub unknown: Vec<ObservedError>,
}

/// Stateful classifier for one run.
///
/// Remembers which issue numbers were already reported: a second error
/// matching the same issue is dropped entirely. Broken registry patterns
/// are only reported for runs that collected at least one error.
pub struct Classifier<'a> {
    registry: &'a Registry,
    matcher: IssueMatcher<'a>,
    ctx: &'a RunContext,
    reported_issues: HashSet<u64>,
    classified: Classified,
    seen_errors: bool,
}

impl<'a> Classifier<'a> {
    pub fn new(registry: &'a Registry, ctx: &'a RunContext) -> Self {
        Self {
            registry,
            matcher: IssueMatcher::new(registry, ctx),
            ctx,
            reported_issues: HashSet::new(),
            classified: Classified::default(),
            seen_errors: false,
        }
    }

    pub fn add(&mut self, error: CollectedError) {
        self.seen_errors = true;
        match error {
            CollectedError::Log(raw) => self.add_log_match(raw),
            CollectedError::Junit(failure) => self.add_test_failure(failure),
        }
    }

    pub fn add_log_match(&mut self, raw: RawErrorMatch) {
        let location_url = self.ctx.artifact_url(&raw.file).map(str::to_string);
        let message = raw.text_lossy();
        self.handle(message, None, raw.file, location_url);
    }

    pub fn add_test_failure(&mut self, failure: TestFailure) {
        if failure.is_coverage_failure() {
            let message = [failure.message.as_str(), failure.text.as_str()]
                .into_iter()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            let record = ErrorRecord::new(
                ErrorKind::FailureInCoverageMode,
                message,
                failure.test_case,
            )
            .with_limits(self.ctx.limits);
            self.classified
                .known
                .push(ObservedError::CoverageFailure(record));
            return;
        }

        let details = Some(failure.text).filter(|text| !text.is_empty());
        self.handle(failure.message, details, failure.test_case, None);
    }

    fn handle(
        &mut self,
        message: String,
        details: Option<String>,
        location: String,
        location_url: Option<String>,
    ) {
        let text = searchable_text(&message, details.as_deref());
        let (issue, closed) = match self.matcher.find(&text) {
            IssueMatch::Open(issue) => (issue, false),
            IssueMatch::Closed(issue) => (issue, true),
            IssueMatch::NoMatch => {
                let record = ErrorRecord::new(ErrorKind::UnknownError, message, location)
                    .with_details(details)
                    .with_location_url(location_url)
                    .with_limits(self.ctx.limits);
                self.classified.unknown.push(ObservedError::Located(record));
                return;
            }
        };

        if !self.reported_issues.insert(issue.number) {
            debug!(issue = issue.number, "issue already reported, dropping repeat");
            return;
        }

        let kind = if closed {
            ErrorKind::PotentialRegression
        } else {
            ErrorKind::KnownIssue
        };
        let error = ObservedError::WithIssue {
            record: ErrorRecord::new(kind, message, location)
                .with_details(details)
                .with_location_url(location_url)
                .with_limits(self.ctx.limits),
            issue: issue.issue_ref(),
            issue_is_closed: closed,
        };

        // A closed issue matching again fails the run like an unknown error
        if closed {
            self.classified.unknown.push(error);
        } else {
            self.classified.known.push(error);
        }
    }

    pub fn finish(self) -> Classified {
        let mut classified = self.classified;
        if self.seen_errors {
            let mut unknown = self.registry.invalid_patterns().to_vec();
            unknown.append(&mut classified.unknown);
            classified.unknown = unknown;
        }
        classified
    }
}

/// Classify all collected errors in order
pub fn classify_errors(
    errors: impl IntoIterator<Item = CollectedError>,
    registry: &Registry,
    ctx: &RunContext,
) -> Classified {
    let mut classifier = Classifier::new(registry, ctx);
    for error in errors {
        classifier.add(error);
    }
    classifier.finish()
}
