// SPDX-License-Identifier: PMPL-1.0-or-later

//! Annotation generation and rendering

pub mod formatter;
pub mod generator;
pub mod output;

use crate::classify::Classified;
use crate::config::RunContext;
use crate::history::BuildHistory;
use crate::types::Annotation;
use anyhow::Result;
use std::path::Path;

pub use formatter::{ReportFormatter, Render};
pub use generator::{group_identical_errors, AnnotationGenerator};
pub use output::{AnnotationRecord, OutputFormat};

/// Turn classified errors into the job annotation, if there is one
pub fn generate_annotation(
    classified: Classified,
    ctx: &RunContext,
    build_history: Option<BuildHistory>,
) -> Option<Annotation> {
    AnnotationGenerator::new().generate(classified, ctx, build_history)
}

/// Save annotation to file
pub fn save_report<P: AsRef<Path>>(annotation: &Annotation, path: P) -> Result<()> {
    output::save_annotation(annotation, path.as_ref())
}

/// Print annotation summary to console
pub fn print_report(annotation: &Annotation) {
    let formatter = ReportFormatter::new();
    formatter.print(annotation);
}
