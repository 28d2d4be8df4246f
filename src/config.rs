// SPDX-License-Identifier: PMPL-1.0-or-later

//! Run context: the CI facts the classifier consults
//!
//! Collected once at the boundary (environment or a context file) and
//! passed by reference into the core. Nothing below `main` reads the
//! process environment.

use crate::error::ConfigError;
use crate::types::TruncationLimits;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// An uploaded artifact of the current build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub job_id: String,
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunContext {
    pub step_key: String,
    pub step_label: String,
    pub job_id: String,
    pub build_number: String,
    pub pipeline_slug: String,
    pub retry_count: u32,
    /// Instrumented build, enables the coverage-mode segfault suppression
    pub coverage_enabled: bool,
    /// Exit status of the test process itself
    pub command_succeeded: bool,
    /// Job state as reported by the orchestrator, e.g. `canceling`
    pub job_state: Option<String>,
    /// Repository prefix for analytics issue references, e.g. `org/repo`
    pub issue_repository: Option<String>,
    pub artifacts: Vec<Artifact>,
    pub limits: TruncationLimits,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            step_key: String::new(),
            step_label: String::new(),
            job_id: String::new(),
            build_number: String::new(),
            pipeline_slug: String::new(),
            retry_count: 0,
            coverage_enabled: false,
            command_succeeded: true,
            job_state: None,
            issue_repository: None,
            artifacts: Vec::new(),
            limits: TruncationLimits::default(),
        }
    }
}

impl RunContext {
    /// Collect the context from Buildkite style environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let retry_count = match env::var("BUILDKITE_RETRY_COUNT") {
            Ok(value) if !value.trim().is_empty() => {
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "BUILDKITE_RETRY_COUNT",
                        value,
                    })?
            }
            _ => 0,
        };

        Ok(Self {
            step_key: env_or_empty("BUILDKITE_STEP_KEY"),
            step_label: env_or_empty("BUILDKITE_LABEL"),
            job_id: env_or_empty("BUILDKITE_JOB_ID"),
            build_number: env_or_empty("BUILDKITE_BUILD_NUMBER"),
            pipeline_slug: env_or_empty("BUILDKITE_PIPELINE_SLUG"),
            retry_count,
            coverage_enabled: is_truthy(&env_or_empty("CI_COVERAGE_ENABLED")),
            command_succeeded: env_or_empty("BUILDKITE_COMMAND_EXIT_STATUS") == "0",
            job_state: env::var("BUILDKITE_JOB_STATE").ok(),
            issue_repository: env::var("CI_ANNOTATE_ISSUE_REPOSITORY").ok(),
            artifacts: Vec::new(),
            limits: TruncationLimits::default(),
        })
    }

    /// Load the context from a YAML or JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = if has_extension(path, "json") {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Suite name shown in annotations, with the retry attempt appended
    pub fn suite_name(&self, include_retry_info: bool) -> String {
        let mut name = if self.step_label.is_empty() {
            "Unknown Test".to_string()
        } else {
            self.step_label.clone()
        };
        if include_retry_info && self.retry_count > 0 {
            name.push_str(&format!(" (#{})", self.retry_count + 1));
        }
        name
    }

    /// Download URL of a log file uploaded by this job
    pub fn artifact_url(&self, file: &str) -> Option<&str> {
        self.artifacts
            .iter()
            .find(|artifact| artifact.job_id == self.job_id && artifact.path == file)
            .map(|artifact| artifact.url.as_str())
    }

    pub fn job_is_cancelling(&self) -> bool {
        matches!(self.job_state.as_deref(), Some("canceling" | "canceled"))
    }
}

pub(crate) fn has_extension(path: &Path, expected: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

fn env_or_empty(key: &str) -> String {
    env::var(key).unwrap_or_default()
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_suite_name_with_retry() {
        let ctx = RunContext {
            step_label: "Testdrive".to_string(),
            retry_count: 2,
            ..Default::default()
        };
        assert_eq!(ctx.suite_name(true), "Testdrive (#3)");
        assert_eq!(ctx.suite_name(false), "Testdrive");
        assert_eq!(RunContext::default().suite_name(true), "Unknown Test");
    }

    #[test]
    fn test_artifact_url_requires_same_job() {
        let ctx = RunContext {
            job_id: "job-1".to_string(),
            artifacts: vec![
                Artifact {
                    job_id: "job-0".to_string(),
                    path: "services.log".to_string(),
                    url: "https://ci.invalid/a0".to_string(),
                },
                Artifact {
                    job_id: "job-1".to_string(),
                    path: "services.log".to_string(),
                    url: "https://ci.invalid/a1".to_string(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(ctx.artifact_url("services.log"), Some("https://ci.invalid/a1"));
        assert_eq!(ctx.artifact_url("other.log"), None);
    }

    #[test]
    fn test_from_yaml_file_uses_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "step_key: testdrive\ncoverage_enabled: true").unwrap();

        let ctx = RunContext::from_file(file.path()).unwrap();
        assert_eq!(ctx.step_key, "testdrive");
        assert!(ctx.coverage_enabled);
        assert!(ctx.command_succeeded);
        assert_eq!(ctx.limits, TruncationLimits::default());
    }

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy(" TRUE "));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(""));
    }
}
