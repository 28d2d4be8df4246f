// SPDX-License-Identifier: PMPL-1.0-or-later

//! Typed failures raised by the scanning and loading stages

use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort processing of one input file.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Two panics of same service {service} interleaving in {file}: {line}")]
    InterleavedPanic {
        file: String,
        service: String,
        line: String,
    },

    #[error("Panic log never finished in {file}: {}", services.join(", "))]
    UnterminatedPanic { file: String, services: Vec<String> },

    #[error("Malformed JUnit report {file}: {reason}")]
    Report { file: String, reason: String },

    #[error("Invalid built-in pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while loading the known-issue registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read issue registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse issue registry {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid built-in pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Failures while loading the run context.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read run context {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse run context {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
