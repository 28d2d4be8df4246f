// SPDX-License-Identifier: PMPL-1.0-or-later

//! Annotation rendering and console output

use crate::history::BuildHistory;
use crate::types::*;
use colored::*;

/// Default cap for text placed inside a markdown code block
pub const SANITIZE_MAX_LEN: usize = 4_000;
/// Suffix marking cropped text
pub const CROP_MARKER: &str = " [...]";

/// Crop `text` to `max_len` characters, marking the cut
pub fn crop_text(text: &str, max_len: usize) -> String {
    match text.char_indices().nth(max_len) {
        Some((cut, _)) => format!("{}{}", &text[..cut], CROP_MARKER),
        None => text.to_string(),
    }
}

/// Crop and escape code fences so the text cannot break out of a block
pub fn sanitize_text(text: &str, max_len: usize) -> String {
    crop_text(text, max_len).replace("```", r"\`\`\`")
}

/// Render a message as a fenced code block, empty for empty input
pub fn format_error_message(message: &str, max_len: usize) -> String {
    if message.is_empty() {
        return String::new();
    }
    format!("```\n{}\n```", sanitize_text(message, max_len))
}

/// Plain-text and markdown renderings
pub trait Render {
    fn to_text(&self) -> String;
    fn to_markdown(&self) -> String;
}

fn location_markdown(record: &ErrorRecord) -> String {
    match &record.location_url {
        Some(url) => format!("<a href=\"{}\">{}</a>", url, record.location),
        None => record.location.clone(),
    }
}

fn issue_presentation(issue: &IssueRef, closed: bool) -> String {
    if closed {
        format!("#{}, closed", issue.number)
    } else {
        format!("#{}", issue.number)
    }
}

impl Render for ObservedError {
    fn to_text(&self) -> String {
        let record = self.record();
        let limits = record.limits;
        let message = crop_text(&record.message, limits.max_message_len);

        match self {
            ObservedError::WithIssue {
                issue,
                issue_is_closed,
                ..
            } => {
                let mut text = format!(
                    "{} {} ({}) in {}: {}",
                    record.kind.label(),
                    issue.title,
                    issue_presentation(issue, *issue_is_closed),
                    record.location,
                    message
                );
                if let Some(details) = &record.details {
                    text.push('\n');
                    text.push_str(&crop_text(details, limits.max_details_len));
                }
                text
            }
            ObservedError::Located(_) => {
                let details = match record.details.as_deref() {
                    Some(details) if !details.is_empty() => {
                        format!(" {}", crop_text(details, limits.max_details_len))
                    }
                    _ => String::new(),
                };
                format!(
                    "{} in {}: {}{}",
                    record.kind.label(),
                    record.location,
                    message,
                    details
                )
            }
            ObservedError::CoverageFailure(_) => format!("{}: {}", record.location, message),
        }
    }

    fn to_markdown(&self) -> String {
        let record = self.record();
        let limits = record.limits;
        let message = format_error_message(&record.message, limits.max_message_len);

        match self {
            ObservedError::WithIssue {
                issue,
                issue_is_closed,
                ..
            } => {
                let mut markdown = format!(
                    "{} <a href=\"{}\">{} ({})</a> in {}:\n{}",
                    record.kind.label(),
                    issue.url,
                    issue.title,
                    issue_presentation(issue, *issue_is_closed),
                    location_markdown(record),
                    message
                );
                if let Some(details) = &record.details {
                    markdown.push('\n');
                    markdown.push_str(&format_error_message(details, limits.max_details_len));
                }
                markdown
            }
            ObservedError::Located(_) => {
                let mut markdown = format!(
                    "{} in {}:\n{}",
                    record.kind.label(),
                    location_markdown(record),
                    message
                );
                if let Some(details) = record.details.as_deref().filter(|d| !d.is_empty()) {
                    markdown.push('\n');
                    markdown.push_str(&format_error_message(details, limits.max_details_len));
                }
                markdown
            }
            ObservedError::CoverageFailure(_) => format!("{}:\n{}", record.location, message),
        }
    }
}

impl Render for ErrorOccurrences {
    fn to_text(&self) -> String {
        self.error.to_text()
    }

    fn to_markdown(&self) -> String {
        if self.occurrences > 1 {
            format!("{} ({} occurrences)", self.error.to_markdown(), self.occurrences)
        } else {
            self.error.to_markdown()
        }
    }
}

impl Render for BuildHistory {
    fn to_text(&self) -> String {
        let outcomes: String = self
            .last_build_step_outcomes
            .iter()
            .map(|outcome| if outcome.passed { '+' } else { '-' })
            .collect();
        format!("main history: {}", outcomes)
    }

    fn to_markdown(&self) -> String {
        let outcomes: String = self
            .last_build_step_outcomes
            .iter()
            .map(|outcome| {
                let status = if outcome.passed {
                    ":bk-status-passed:"
                } else {
                    ":bk-status-failed:"
                };
                format!("<a href=\"{}\">{}</a>", outcome.web_url_to_job, status)
            })
            .collect();
        format!(
            "<a href=\"{}\">main</a> history: {}",
            self.pipeline_path(),
            outcomes
        )
    }
}

impl Annotation {
    fn outcome_word(&self) -> &'static str {
        if self.is_failure {
            "failed"
        } else {
            "succeeded"
        }
    }

    fn title_suffix(&self) -> &'static str {
        match (self.unknown_errors.is_empty(), self.known_errors.is_empty()) {
            (true, false) => " with known error logs",
            (true, true) => ", but no error in logs found",
            _ => "",
        }
    }

    fn only_known_errors(&self) -> bool {
        self.unknown_errors.is_empty() && !self.known_errors.is_empty()
    }

    fn all_errors(&self) -> impl Iterator<Item = &ErrorOccurrences> {
        self.unknown_errors.iter().chain(self.known_errors.iter())
    }
}

impl Render for Annotation {
    fn to_text(&self) -> String {
        let mut text = format!(
            "{} {}{}",
            self.suite_name,
            self.outcome_word(),
            self.title_suffix()
        );
        if let Some(history) = &self.build_history {
            text.push_str(", ");
            text.push_str(&history.to_text());
        }
        for error in self.all_errors() {
            text.push_str("\n- ");
            text.push_str(&error.to_text());
            if error.occurrences > 1 {
                text.push_str(&format!(" ({} occurrences)", error.occurrences));
            }
        }
        text
    }

    fn to_markdown(&self) -> String {
        let mut markdown = format!(
            "<a href=\"#{}\">{}</a> {}{}",
            self.job_id,
            self.suite_name,
            self.outcome_word(),
            self.title_suffix()
        );
        if let Some(history) = &self.build_history {
            markdown.push_str(", ");
            markdown.push_str(&history.to_markdown());
        }

        let wrap = self.only_known_errors();
        if wrap {
            markdown = format!("<summary>{}</summary>\n", markdown);
        }

        // Unknown errors first; each list starts on its own line
        for errors in [&self.unknown_errors, &self.known_errors] {
            if errors.is_empty() {
                continue;
            }
            let bullets: Vec<String> = errors
                .iter()
                .map(|error| format!("* {}", error.to_markdown()))
                .collect();
            markdown.push('\n');
            markdown.push_str(&bullets.join("\n"));
        }

        if wrap {
            markdown = format!("<details>{}\n</details>", markdown);
        }
        markdown
    }
}

pub struct ReportFormatter;

impl ReportFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Console summary for the build log
    pub fn print(&self, annotation: &Annotation) {
        println!("\n{}", "=== CI ERROR ANNOTATION ===".bold().cyan());

        let verdict = if annotation.is_failure {
            "FAILED".red().bold()
        } else {
            "SUCCEEDED".green().bold()
        };
        println!("  Suite: {} ({})", annotation.suite_name, verdict);
        println!("  Style: {}", annotation.style());

        if let Some(history) = &annotation.build_history {
            println!("  {}", history.to_text().dimmed());
        }

        self.print_errors("UNKNOWN ERRORS", &annotation.unknown_errors, "red");
        self.print_errors("KNOWN ERRORS", &annotation.known_errors, "yellow");

        if annotation.unknown_errors.is_empty() && annotation.known_errors.is_empty() {
            println!("  {}", "No error in logs found".green());
        }
        println!();
    }

    fn print_errors(&self, heading: &str, errors: &[ErrorOccurrences], color: &str) {
        if errors.is_empty() {
            return;
        }
        println!();
        println!("{}", heading.bold().color(color));
        for (i, error) in errors.iter().enumerate() {
            let first_line = error.to_text();
            let first_line = first_line.lines().next().unwrap_or_default();
            let count = if error.occurrences > 1 {
                format!(" x{}", error.occurrences)
            } else {
                String::new()
            };
            println!(
                "  {}. [{}]{} {}",
                i + 1,
                error.error.kind().label().color(color),
                count.bold(),
                crop_text(first_line, 200)
            );
            if let Some(issue) = error.error.issue() {
                println!("     Issue: {}", issue.url.dimmed());
            }
        }
    }
}

impl Default for ReportFormatter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::BuildStepOutcome;

    fn unknown(message: &str, details: Option<&str>) -> ObservedError {
        ObservedError::Located(
            ErrorRecord::new(ErrorKind::UnknownError, message, "services.log")
                .with_details(details.map(str::to_string)),
        )
    }

    fn known(number: u64, closed: bool) -> ObservedError {
        let kind = if closed {
            ErrorKind::PotentialRegression
        } else {
            ErrorKind::KnownIssue
        };
        ObservedError::WithIssue {
            record: ErrorRecord::new(kind, "boom", "test_case"),
            issue: IssueRef {
                number,
                title: "Boom".to_string(),
                url: format!("https://tracker.invalid/{}", number),
            },
            issue_is_closed: closed,
        }
    }

    fn annotation(
        unknown_errors: Vec<ErrorOccurrences>,
        known_errors: Vec<ErrorOccurrences>,
    ) -> Annotation {
        Annotation {
            suite_name: "Testdrive".to_string(),
            job_id: "job-1".to_string(),
            is_failure: !unknown_errors.is_empty(),
            build_history: None,
            known_errors,
            unknown_errors,
        }
    }

    #[test]
    fn test_crop_text() {
        assert_eq!(crop_text("abcdef", 3), "abc [...]");
        assert_eq!(crop_text("abc", 3), "abc");
        assert_eq!(crop_text("äöüß", 2), "äö [...]");
    }

    #[test]
    fn test_sanitize_escapes_code_fences() {
        assert_eq!(sanitize_text("a ``` b", SANITIZE_MAX_LEN), r"a \`\`\` b");
    }

    #[test]
    fn test_format_error_message() {
        assert_eq!(format_error_message("", 10), "");
        assert_eq!(format_error_message("oops", 10), "```\noops\n```");
    }

    #[test]
    fn test_unknown_error_text() {
        assert_eq!(
            unknown("segfault", Some("at 0x0")).to_text(),
            "Unknown error in services.log: segfault at 0x0"
        );
        assert_eq!(
            unknown("segfault", None).to_text(),
            "Unknown error in services.log: segfault"
        );
    }

    #[test]
    fn test_issue_markdown_marks_closed() {
        assert_eq!(
            known(12, true).to_markdown(),
            "Potential regression <a href=\"https://tracker.invalid/12\">Boom (#12, closed)</a> in test_case:\n```\nboom\n```"
        );
    }

    #[test]
    fn test_location_link() {
        let error = ObservedError::Located(
            ErrorRecord::new(ErrorKind::UnknownError, "x", "services.log")
                .with_location_url(Some("https://ci.invalid/a".to_string())),
        );
        assert_eq!(
            error.to_markdown(),
            "Unknown error in <a href=\"https://ci.invalid/a\">services.log</a>:\n```\nx\n```"
        );
    }

    #[test]
    fn test_occurrences_suffix() {
        let grouped = ErrorOccurrences {
            error: unknown("x", None),
            occurrences: 3,
        };
        assert!(grouped.to_markdown().ends_with("``` (3 occurrences)"));
        assert!(!ErrorOccurrences::once(unknown("x", None))
            .to_markdown()
            .contains("occurrences"));
    }

    #[test]
    fn test_only_known_errors_are_collapsed() {
        let markdown = annotation(Vec::new(), vec![ErrorOccurrences::once(known(1, false))])
            .to_markdown();
        assert!(markdown.starts_with(
            "<details><summary><a href=\"#job-1\">Testdrive</a> succeeded with known error logs</summary>\n\n* Known issue"
        ));
        assert!(markdown.ends_with("\n</details>"));
    }

    #[test]
    fn test_unknown_errors_listed_before_known() {
        let markdown = annotation(
            vec![ErrorOccurrences::once(unknown("u", None))],
            vec![ErrorOccurrences::once(known(1, false))],
        )
        .to_markdown();
        assert!(markdown.starts_with("<a href=\"#job-1\">Testdrive</a> failed\n* Unknown error"));
        let unknown_at = markdown.find("Unknown error").unwrap();
        let known_at = markdown.find("Known issue").unwrap();
        assert!(unknown_at < known_at);
        assert!(!markdown.contains("<details>"));
    }

    #[test]
    fn test_no_errors_title() {
        let mut empty = annotation(Vec::new(), Vec::new());
        empty.is_failure = true;
        assert_eq!(
            empty.to_markdown(),
            "<a href=\"#job-1\">Testdrive</a> failed, but no error in logs found"
        );
    }

    #[test]
    fn test_history_markdown() {
        let history = BuildHistory {
            organization_slug: Some("acme".to_string()),
            pipeline_slug: "tests".to_string(),
            last_build_step_outcomes: vec![
                BuildStepOutcome {
                    build_number: "2".to_string(),
                    passed: true,
                    web_url_to_job: "https://ci.invalid/2".to_string(),
                },
                BuildStepOutcome {
                    build_number: "1".to_string(),
                    passed: false,
                    web_url_to_job: "https://ci.invalid/1".to_string(),
                },
            ],
        };
        assert_eq!(
            history.to_markdown(),
            "<a href=\"/acme/tests/builds?branch=main\">main</a> history: <a href=\"https://ci.invalid/2\">:bk-status-passed:</a><a href=\"https://ci.invalid/1\">:bk-status-failed:</a>"
        );
        assert_eq!(history.to_text(), "main history: +-");
    }
}
