// SPDX-License-Identifier: PMPL-1.0-or-later

//! Annotation generation: grouping identical errors and deciding the verdict

use crate::classify::Classified;
use crate::config::RunContext;
use crate::history::BuildHistory;
use crate::types::{Annotation, ErrorOccurrences, ObservedError};
use std::collections::HashMap;

/// Collapse structurally equal errors, keeping first-seen order
pub fn group_identical_errors(errors: Vec<ObservedError>) -> Vec<ErrorOccurrences> {
    let mut index: HashMap<ObservedError, usize> = HashMap::new();
    let mut grouped: Vec<ErrorOccurrences> = Vec::new();

    for error in errors {
        match index.get(&error) {
            Some(&slot) => grouped[slot].occurrences += 1,
            None => {
                index.insert(error.clone(), grouped.len());
                grouped.push(ErrorOccurrences::once(error));
            }
        }
    }

    grouped
}

pub struct AnnotationGenerator;

impl AnnotationGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Build the annotation for this job.
    ///
    /// Returns `None` when there is nothing to say: no errors were found
    /// and the test command succeeded, or the job is being cancelled.
    pub fn generate(
        &self,
        classified: Classified,
        ctx: &RunContext,
        build_history: Option<BuildHistory>,
    ) -> Option<Annotation> {
        let no_errors = classified.known.is_empty() && classified.unknown.is_empty();
        if no_errors && (ctx.command_succeeded || ctx.job_is_cancelling()) {
            return None;
        }

        let is_failure = !classified.unknown.is_empty() || !ctx.command_succeeded;

        Some(Annotation {
            suite_name: ctx.suite_name(true),
            job_id: ctx.job_id.clone(),
            is_failure,
            build_history,
            known_errors: group_identical_errors(classified.known),
            unknown_errors: group_identical_errors(classified.unknown),
        })
    }
}

impl Default for AnnotationGenerator {
    fn default() -> Self {
        Self::new()
    }
}
