// SPDX-License-Identifier: PMPL-1.0-or-later

//! Serialization helpers for printed/exported annotations

use crate::config::RunContext;
use crate::report::formatter::Render;
use crate::types::{Annotation, ErrorOccurrences, ObservedError};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Markdown,
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Some(OutputFormat::Markdown),
            "text" | "txt" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            _ => None,
        }
    }

    /// Format implied by a file extension, markdown when unknown
    pub fn for_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::parse)
            .unwrap_or(OutputFormat::Markdown)
    }

    pub fn serialize(&self, annotation: &Annotation) -> Result<String> {
        match self {
            OutputFormat::Markdown => Ok(annotation.to_markdown()),
            OutputFormat::Text => Ok(annotation.to_text()),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(annotation)?),
            OutputFormat::Yaml => Ok(serde_yaml::to_string(annotation)?),
        }
    }
}

/// Flat projection of one error for the analytics store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationErrorEntry {
    pub error_type: String,
    pub message: String,
    pub issue: Option<String>,
    pub occurrence_count: usize,
    /// blake3 over the structural identity, stable across runs
    pub fingerprint: String,
}

/// Flat projection of an annotation for the analytics store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub test_suite: String,
    pub test_retry_count: u32,
    pub is_failure: bool,
    pub created_at: DateTime<Utc>,
    pub errors: Vec<AnnotationErrorEntry>,
}

impl AnnotationRecord {
    pub fn from_annotation(annotation: &Annotation, ctx: &RunContext) -> Self {
        let errors = annotation
            .known_errors
            .iter()
            .chain(annotation.unknown_errors.iter())
            .map(|grouped| error_entry(grouped, ctx.issue_repository.as_deref()))
            .collect();

        Self {
            test_suite: ctx.suite_name(false),
            test_retry_count: ctx.retry_count,
            is_failure: annotation.is_failure,
            created_at: Utc::now(),
            errors,
        }
    }
}

fn error_entry(grouped: &ErrorOccurrences, repository: Option<&str>) -> AnnotationErrorEntry {
    let error = &grouped.error;
    let issue = match (error.issue(), repository) {
        (Some(issue), Some(repo)) => Some(format!("{}/{}", repo, issue.number)),
        _ => None,
    };

    AnnotationErrorEntry {
        error_type: error.kind().tag().to_string(),
        message: error.to_text(),
        issue,
        occurrence_count: grouped.occurrences,
        fingerprint: fingerprint(error),
    }
}

/// Stable identity of an error, independent of run-specific links
pub fn fingerprint(error: &ObservedError) -> String {
    let record = error.record();
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"ci-annotate.error.v1\0");
    hasher.update(record.kind.tag().as_bytes());
    hasher.update(b"\0");
    hasher.update(record.message.as_bytes());
    hasher.update(b"\0");
    if let Some(details) = &record.details {
        hasher.update(details.as_bytes());
    }
    hasher.update(b"\0");
    hasher.update(record.location.as_bytes());
    if let Some(issue) = error.issue() {
        hasher.update(b"\0");
        hasher.update(issue.number.to_string().as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Write the annotation in the format implied by the file extension
pub fn save_annotation(annotation: &Annotation, path: &Path) -> Result<()> {
    let content = OutputFormat::for_path(path).serialize(annotation)?;
    fs::write(path, content).with_context(|| format!("writing {}", path.display()))
}

/// Write the analytics projection as JSON or YAML by extension
pub fn save_analytics(record: &AnnotationRecord, path: &Path) -> Result<()> {
    let content = match OutputFormat::for_path(path) {
        OutputFormat::Yaml => serde_yaml::to_string(record)?,
        _ => serde_json::to_string_pretty(record)?,
    };
    fs::write(path, content).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorKind, ErrorRecord, IssueRef};
    use tempfile::TempDir;

    fn with_issue(number: u64) -> ObservedError {
        ObservedError::WithIssue {
            record: ErrorRecord::new(ErrorKind::KnownIssue, "boom", "services.log"),
            issue: IssueRef {
                number,
                title: "Boom".to_string(),
                url: format!("https://tracker.invalid/{}", number),
            },
            issue_is_closed: false,
        }
    }

    fn sample() -> Annotation {
        Annotation {
            suite_name: "Testdrive (#2)".to_string(),
            job_id: "job-1".to_string(),
            is_failure: true,
            build_history: None,
            known_errors: vec![ErrorOccurrences {
                error: with_issue(77),
                occurrences: 2,
            }],
            unknown_errors: vec![ErrorOccurrences::once(ObservedError::Located(
                ErrorRecord::new(ErrorKind::UnknownError, "segfault", "services.log"),
            ))],
        }
    }

    #[test]
    fn test_parse_formats() {
        assert_eq!(OutputFormat::parse("YML"), Some(OutputFormat::Yaml));
        assert_eq!(OutputFormat::parse("md"), Some(OutputFormat::Markdown));
        assert_eq!(OutputFormat::parse("xml"), None);
        assert_eq!(
            OutputFormat::for_path(Path::new("out/annotation.json")),
            OutputFormat::Json
        );
        assert_eq!(
            OutputFormat::for_path(Path::new("annotation")),
            OutputFormat::Markdown
        );
    }

    #[test]
    fn test_analytics_projection() {
        let ctx = RunContext {
            step_label: "Testdrive".to_string(),
            retry_count: 1,
            issue_repository: Some("acme/db".to_string()),
            ..Default::default()
        };
        let record = AnnotationRecord::from_annotation(&sample(), &ctx);

        assert_eq!(record.test_suite, "Testdrive");
        assert_eq!(record.test_retry_count, 1);
        assert!(record.is_failure);
        assert_eq!(record.errors.len(), 2);
        assert_eq!(record.errors[0].error_type, "KNOWN_ISSUE");
        assert_eq!(record.errors[0].issue.as_deref(), Some("acme/db/77"));
        assert_eq!(record.errors[0].occurrence_count, 2);
        assert_eq!(record.errors[1].error_type, "UNKNOWN ERROR");
        assert_eq!(record.errors[1].issue, None);
        assert_eq!(
            record.errors[1].message,
            "Unknown error in services.log: segfault"
        );
    }

    #[test]
    fn test_fingerprint_ignores_location_url() {
        let plain = ObservedError::Located(ErrorRecord::new(ErrorKind::UnknownError, "x", "log"));
        let linked = ObservedError::Located(
            ErrorRecord::new(ErrorKind::UnknownError, "x", "log")
                .with_location_url(Some("https://ci.invalid/a".to_string())),
        );
        assert_eq!(fingerprint(&plain), fingerprint(&linked));
        assert_ne!(fingerprint(&plain), fingerprint(&with_issue(1)));
        assert_ne!(fingerprint(&with_issue(1)), fingerprint(&with_issue(2)));
        assert_eq!(fingerprint(&plain).len(), 64);
    }

    #[test]
    fn test_save_annotation_by_extension() {
        let dir = TempDir::new().unwrap();
        let md = dir.path().join("annotation.md");
        let yaml = dir.path().join("annotation.yaml");

        save_annotation(&sample(), &md).expect("markdown export should succeed");
        save_annotation(&sample(), &yaml).expect("yaml export should succeed");

        let markdown = fs::read_to_string(&md).unwrap();
        assert!(markdown.starts_with("<a href=\"#job-1\">Testdrive (#2)</a> failed"));
        let parsed: serde_yaml::Value =
            serde_yaml::from_str(&fs::read_to_string(&yaml).unwrap()).unwrap();
        assert_eq!(parsed["suite_name"].as_str(), Some("Testdrive (#2)"));
    }

    #[test]
    fn test_save_analytics_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("analytics.json");
        let record = AnnotationRecord::from_annotation(&sample(), &RunContext::default());

        save_analytics(&record, &path).expect("analytics export should succeed");
        let loaded: AnnotationRecord =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, record);
    }
}
