// SPDX-License-Identifier: PMPL-1.0-or-later

//! ci-annotate: CI error detection and known-issue classification.
//!
//! Scans interleaved multi-service CI logs and JUnit reports for fatal
//! signatures and service panics, matches every finding against a registry
//! of filed issues and turns the result into a build annotation.
//!
//! PIPELINE:
//! 1. **Scanner** / **Correlator**: fatal-signature matches and cross-line
//!    service panics from plain logs.
//! 2. **JUnit**: failing and erroring test cases from structured reports.
//! 3. **Classify**: known issue, potential regression or unknown error.
//! 4. **Report**: identical errors grouped, verdict and markdown rendered.
//!
//! The number of unknown errors becomes the process exit code.

pub mod classify;
pub mod config;
pub mod correlator;
pub mod error;
pub mod history;
pub mod junit;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod scanner;
pub mod types;

pub use classify::{classify_errors, Classified};
pub use config::RunContext;
pub use error::{ConfigError, RegistryError, ScanError};
pub use pipeline::{PipelineOptions, RunOutcome};
pub use registry::Registry;
pub use types::{Annotation, ErrorOccurrences, ObservedError};
