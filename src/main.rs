// SPDX-License-Identifier: PMPL-1.0-or-later

//! ci-annotate: detect errors in CI logs and JUnit reports and classify
//! them against known issues
//!
//! The exit code of `annotate` is the number of unknown errors (at most
//! 254), so a test job fails on unexpected log output even when the tests
//! themselves passed. A run aborted by a fatal error exits with 255.

use anyhow::{Context, Result};
use ci_annotate::config::RunContext;
use ci_annotate::history::BuildHistory;
use ci_annotate::pipeline::{self, PipelineOptions};
use ci_annotate::registry::Registry;
use ci_annotate::report::{self, output, AnnotationRecord, OutputFormat};
use ci_annotate::scanner::Scanner;
use ci_annotate::types::CollectedError;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ci-annotate")]
#[command(version)]
#[command(about = "Detect errors in CI logs and JUnit reports and classify them against known issues")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan inputs, classify errors and emit the job annotation
    Annotate {
        /// Log files and junit_*.xml reports to search in
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        /// Known-issue registry (JSON or YAML)
        #[arg(short, long)]
        issues: Option<PathBuf>,

        /// Run context file (JSON or YAML); defaults to the CI environment
        #[arg(short, long)]
        context: Option<PathBuf>,

        /// Main-branch history of this step (JSON)
        #[arg(long)]
        history: Option<PathBuf>,

        /// Format printed to stdout
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: OutputFormat,

        /// Also write the annotation to a file (format by extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the analytics projection to a file (JSON or YAML)
        #[arg(long)]
        analytics: Option<PathBuf>,

        /// Print a colored console summary instead of the annotation
        #[arg(long)]
        summary: bool,

        /// Process input files one at a time
        #[arg(long)]
        sequential: bool,
    },

    /// Print raw error matches without classification
    Scan {
        /// Log files and junit_*.xml reports to search in
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        /// Suppress the environmentd segfault seen in coverage builds
        #[arg(long)]
        coverage: bool,
    },
}

struct AnnotateArgs {
    files: Vec<PathBuf>,
    issues: Option<PathBuf>,
    context: Option<PathBuf>,
    history: Option<PathBuf>,
    format: OutputFormat,
    output: Option<PathBuf>,
    analytics: Option<PathBuf>,
    summary: bool,
    sequential: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Annotate {
            files,
            issues,
            context,
            history,
            format,
            output,
            analytics,
            summary,
            sequential,
        } => annotate(AnnotateArgs {
            files,
            issues,
            context,
            history,
            format,
            output,
            analytics,
            summary,
            sequential,
        }),
        Commands::Scan { files, coverage } => scan(&files, coverage).map(|()| 0),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(pipeline::FATAL_EXIT_CODE);
        }
    }
}

fn annotate(args: AnnotateArgs) -> Result<i32> {
    let ctx = match &args.context {
        Some(path) => RunContext::from_file(path)?,
        None => RunContext::from_env()?,
    };

    let registry = match &args.issues {
        Some(path) => Registry::load(path)?,
        None => {
            warn!("no issue registry given, every error is unknown");
            Registry::empty()
        }
    };

    let build_history = match &args.history {
        Some(path) => BuildHistory::load(path, &ctx)?,
        None => None,
    };

    let options = PipelineOptions {
        parallel: !args.sequential,
    };
    let outcome = pipeline::run(&args.files, &registry, &ctx, build_history, &options)
        .context("scanning inputs failed")?;

    if let Some(annotation) = &outcome.annotation {
        info!(
            style = annotation.style(),
            known = annotation.known_errors.len(),
            unknown = annotation.unknown_errors.len(),
            "annotation ready"
        );

        if args.summary {
            report::print_report(annotation);
        } else {
            println!("{}", args.format.serialize(annotation)?);
        }

        if let Some(path) = &args.output {
            report::save_report(annotation, path)?;
        }
        if let Some(path) = &args.analytics {
            let record = AnnotationRecord::from_annotation(annotation, &ctx);
            output::save_analytics(&record, path)?;
        }
    } else {
        info!("nothing to annotate");
    }

    if outcome.unknown_error_count > 0 {
        eprintln!(
            "+++ Failing test because of {} unknown error(s)",
            outcome.unknown_error_count
        );
    }

    Ok(outcome.exit_code())
}

fn scan(files: &[PathBuf], coverage: bool) -> Result<()> {
    let scanner = Scanner::new(coverage)?;
    let options = PipelineOptions { parallel: true };
    let errors = pipeline::collect_errors(&scanner, files, &options)?;

    for error in &errors {
        match error {
            CollectedError::Log(raw) => {
                println!("{} {}", format!("{}:", raw.file).bold().cyan(), raw.text_lossy());
            }
            CollectedError::Junit(failure) => {
                println!(
                    "{} {}",
                    format!("{}::{}:", failure.test_class, failure.test_case)
                        .bold()
                        .yellow(),
                    failure.message
                );
                if !failure.text.is_empty() {
                    println!("{}", failure.text.dimmed());
                }
            }
        }
    }

    println!("\nTotal: {}", errors.len().to_string().bold());
    Ok(())
}
