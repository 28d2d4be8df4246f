// SPDX-License-Identifier: PMPL-1.0-or-later

//! End-to-end run: collect errors from every input, classify, annotate
//!
//! Inputs are independent, so collection may fan out over a rayon pool.
//! Results are always merged in input order, then in-file order, so the
//! annotation is identical whichever way the files were processed.

use crate::classify::{classify_errors, Classified};
use crate::config::RunContext;
use crate::error::ScanError;
use crate::history::BuildHistory;
use crate::junit;
use crate::registry::Registry;
use crate::report;
use crate::scanner::{self, Scanner};
use crate::types::{Annotation, CollectedError};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Highest process exit code that still reads as a count
pub const MAX_EXIT_CODE: usize = 254;
/// Exit code of a run aborted by a fatal error, never a count
pub const FATAL_EXIT_CODE: i32 = 255;

/// How an input file is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    JunitReport,
    Log,
}

impl InputKind {
    pub fn detect(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        if junit::is_junit_report(&name) {
            InputKind::JunitReport
        } else {
            InputKind::Log
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Process input files concurrently
    pub parallel: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// Result of one annotator run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub annotation: Option<Annotation>,
    /// Ungrouped count of unknown errors, including potential regressions
    pub unknown_error_count: usize,
}

impl RunOutcome {
    /// Process exit code: the unknown error count, clamped so that a large
    /// count never wraps around to success
    pub fn exit_code(&self) -> i32 {
        self.unknown_error_count.min(MAX_EXIT_CODE) as i32
    }
}

/// Collect raw errors of a single input file
pub fn collect_file(scanner: &Scanner, path: &Path) -> Result<Vec<CollectedError>, ScanError> {
    let file_name = path.display().to_string();
    let errors: Vec<CollectedError> = match InputKind::detect(path) {
        InputKind::JunitReport => junit::extract_failures_from_file(path)?
            .into_iter()
            .map(CollectedError::Junit)
            .collect(),
        InputKind::Log => scanner::scan_log_file(scanner, path, &file_name)?
            .into_iter()
            .map(CollectedError::Log)
            .collect(),
    };
    debug!(file = %file_name, errors = errors.len(), "collected errors");
    Ok(errors)
}

/// Collect raw errors of all input files, in input order.
///
/// The first fatal scan error aborts the collection.
pub fn collect_errors(
    scanner: &Scanner,
    files: &[PathBuf],
    options: &PipelineOptions,
) -> Result<Vec<CollectedError>, ScanError> {
    let per_file: Vec<Vec<CollectedError>> = if options.parallel {
        files
            .par_iter()
            .map(|path| collect_file(scanner, path))
            .collect::<Result<_, _>>()?
    } else {
        files
            .iter()
            .map(|path| collect_file(scanner, path))
            .collect::<Result<_, _>>()?
    };
    Ok(per_file.into_iter().flatten().collect())
}

/// Run the whole pipeline over `files`
pub fn run(
    files: &[PathBuf],
    registry: &Registry,
    ctx: &RunContext,
    build_history: Option<BuildHistory>,
    options: &PipelineOptions,
) -> Result<RunOutcome, ScanError> {
    let scanner = Scanner::new(ctx.coverage_enabled)?;
    let collected = collect_errors(&scanner, files, options)?;
    info!(
        files = files.len(),
        errors = collected.len(),
        issues = registry.issues().len(),
        "collected errors"
    );

    let classified = classify_errors(collected, registry, ctx);
    Ok(annotate(classified, ctx, build_history))
}

/// Group classified errors into the annotation and count unknown ones
pub fn annotate(
    classified: Classified,
    ctx: &RunContext,
    build_history: Option<BuildHistory>,
) -> RunOutcome {
    let unknown_error_count = classified.unknown.len();
    debug!(
        known = classified.known.len(),
        unknown = unknown_error_count,
        "classified errors"
    );
    let annotation = report::generate_annotation(classified, ctx, build_history);
    RunOutcome {
        annotation,
        unknown_error_count,
    }
}
