// SPDX-License-Identifier: PMPL-1.0-or-later

//! Plain log scanning
//!
//! Logs are read through a read-only memory map so multi-hundred-megabyte
//! CI logs are never copied into memory. The same mapped view feeds both
//! the fatal-signature scanner and the panic correlator.

pub mod engine;
pub mod patterns;

use crate::correlator;
use crate::error::ScanError;
use crate::types::RawErrorMatch;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

pub use engine::Scanner;

/// Scan one plain log file: fatal-signature matches first, then
/// correlated service panics.
pub fn scan_log_file(
    scanner: &Scanner,
    path: &Path,
    file_name: &str,
) -> Result<Vec<RawErrorMatch>, ScanError> {
    let io_err = |source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();
    if len == 0 {
        return Ok(Vec::new());
    }

    // SAFETY: the map is read-only and dropped before returning; CI logs
    // are not truncated while the annotator runs.
    let data = unsafe { Mmap::map(&file) }.map_err(io_err)?;

    scan_bytes(scanner, &data, file_name)
}

/// Scan an in-memory or mapped buffer
pub fn scan_bytes(
    scanner: &Scanner,
    data: &[u8],
    file_name: &str,
) -> Result<Vec<RawErrorMatch>, ScanError> {
    let mut errors = scanner.scan(data, file_name);
    let panics = correlator::correlate_panics(scanner, data, file_name)?;
    errors.extend(panics.into_iter().map(|panic| panic.into_match(file_name)));
    Ok(errors)
}
