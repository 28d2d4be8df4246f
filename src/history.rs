// SPDX-License-Identifier: PMPL-1.0-or-later

//! Build history of the current step on the main branch
//!
//! The outcomes are fetched by an external collaborator; this module only
//! trims them into the summary shown next to an annotation.

use crate::config::RunContext;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// At most this many previous outcomes are shown
pub const MAX_OUTCOMES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStepOutcome {
    pub build_number: String,
    pub passed: bool,
    pub web_url_to_job: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildHistory {
    /// CI organization, prefixes the pipeline link when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_slug: Option<String>,
    /// Empty in the file means the pipeline of the current run
    #[serde(default)]
    pub pipeline_slug: String,
    pub last_build_step_outcomes: Vec<BuildStepOutcome>,
}

impl BuildHistory {
    /// Build the summary, dropping the current build.
    ///
    /// Returns `None` when no previous outcome remains.
    pub fn from_outcomes(
        pipeline_slug: &str,
        outcomes: Vec<BuildStepOutcome>,
        current_build_number: &str,
    ) -> Option<Self> {
        // Retries can yield more outcomes than fetched builds
        let last_build_step_outcomes: Vec<BuildStepOutcome> = outcomes
            .into_iter()
            .filter(|outcome| outcome.build_number != current_build_number)
            .take(MAX_OUTCOMES)
            .collect();

        if last_build_step_outcomes.is_empty() {
            return None;
        }

        Some(Self {
            organization_slug: None,
            pipeline_slug: pipeline_slug.to_string(),
            last_build_step_outcomes,
        })
    }

    /// Load raw outcomes written by the history fetcher
    pub fn load(path: &Path, ctx: &RunContext) -> Result<Option<Self>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading build history {}", path.display()))?;
        let raw: BuildHistory = serde_json::from_str(&content)
            .with_context(|| format!("parsing build history {}", path.display()))?;
        let pipeline_slug = if raw.pipeline_slug.is_empty() {
            &ctx.pipeline_slug
        } else {
            &raw.pipeline_slug
        };
        let history = Self::from_outcomes(
            pipeline_slug,
            raw.last_build_step_outcomes,
            &ctx.build_number,
        );
        Ok(history.map(|history| Self {
            organization_slug: raw.organization_slug,
            ..history
        }))
    }

    /// Path of the main-branch build list of this pipeline
    pub fn pipeline_path(&self) -> String {
        match &self.organization_slug {
            Some(org) => format!("/{}/{}/builds?branch=main", org, self.pipeline_slug),
            None => format!("/{}/builds?branch=main", self.pipeline_slug),
        }
    }
}
