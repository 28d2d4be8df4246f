// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fatal-signature scanner over byte buffers

use crate::error::ScanError;
use crate::scanner::patterns::{COVERAGE_SEGFAULT_PATTERN, FATAL_PATTERN, IGNORE_PATTERN};
use crate::types::RawErrorMatch;
use regex::bytes::Regex;

/// Compiled fatal and ignore pattern sets.
///
/// Cheap to share across threads; holds no per-scan state.
#[derive(Debug, Clone)]
pub struct Scanner {
    fatal: Regex,
    ignore: Regex,
    coverage_segfault: Regex,
    coverage_enabled: bool,
}

impl Scanner {
    pub fn new(coverage_enabled: bool) -> Result<Self, ScanError> {
        Ok(Self {
            fatal: Regex::new(FATAL_PATTERN)?,
            ignore: Regex::new(IGNORE_PATTERN)?,
            coverage_segfault: Regex::new(COVERAGE_SEGFAULT_PATTERN)?,
            coverage_enabled,
        })
    }

    /// Whether the ignore set matches anywhere in `span`
    pub fn is_ignored(&self, span: &[u8]) -> bool {
        self.ignore.is_match(span)
    }

    /// All fatal-signature lines in `data`, in order of occurrence
    pub fn scan(&self, data: &[u8], file: &str) -> Vec<RawErrorMatch> {
        self.fatal
            .find_iter(data)
            .map(|m| m.as_bytes())
            .filter(|span| !self.is_ignored(span))
            .filter(|span| !self.is_coverage_shutdown_segfault(span))
            .map(|span| RawErrorMatch::new(span, file))
            .collect()
    }

    // environmentd segfaults during normal shutdown in coverage builds
    fn is_coverage_shutdown_segfault(&self, span: &[u8]) -> bool {
        self.coverage_enabled && self.coverage_segfault.is_match(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(matches: &[RawErrorMatch]) -> Vec<String> {
        matches.iter().map(RawErrorMatch::text_lossy).collect()
    }

    #[test]
    fn test_reports_fatal_lines_in_order() {
        let scanner = Scanner::new(false).unwrap();
        let log = b"boot ok\nsvc | halting process: unwrap on None\nnoise\nsvc | internal error: bad plan\n";
        let found = scanner.scan(log, "services.log");
        assert_eq!(
            texts(&found),
            vec![
                "svc | halting process: unwrap on None",
                "svc | internal error: bad plan"
            ]
        );
        assert!(found.iter().all(|m| m.file == "services.log"));
    }

    #[test]
    fn test_ignored_span_is_dropped() {
        let scanner = Scanner::new(false).unwrap();
        let log = b"mz | internal error: unexpected panic during query optimization\n";
        assert!(scanner.scan(log, "log").is_empty());
    }

    #[test]
    fn test_ignore_only_applies_to_own_span() {
        let scanner = Scanner::new(false).unwrap();
        let log = b"mz | forced panic\nmz | segfault at 0x0\n";
        assert_eq!(texts(&scanner.scan(log, "log")), vec!["mz | segfault at 0x0"]);
    }

    #[test]
    fn test_coverage_segfault_suppression() {
        let log = b"environmentd: segfault at 0x0 ip 0x1\nclusterd: segfault at 0x0 ip 0x1\n";

        let plain = Scanner::new(false).unwrap();
        assert_eq!(plain.scan(log, "log").len(), 2);

        let coverage = Scanner::new(true).unwrap();
        assert_eq!(
            texts(&coverage.scan(log, "log")),
            vec!["clusterd: segfault at 0x0 ip 0x1"]
        );
    }

    #[test]
    fn test_no_reported_span_matches_ignore_set() {
        let scanner = Scanner::new(false).unwrap();
        let log = b"a | fatal runtime error: stack overflow\n\
            b | timely communication error: peer gone, halting process: x\n\
            c | Out of memory\n\
            d | larger sizes prevent running out of memory\n";
        let found = scanner.scan(log, "log");
        assert_eq!(found.len(), 2);
        for m in &found {
            assert!(!scanner.is_ignored(&m.text));
        }
    }

    #[test]
    fn test_invalid_utf8_is_scanned() {
        let scanner = Scanner::new(false).unwrap();
        let log = b"\xff\xfe svc | segfault at 0x0\n";
        assert_eq!(scanner.scan(log, "log").len(), 1);
    }

    #[test]
    fn test_coverage_segfault_needs_both_parts() {
        let scanner = Scanner::new(true).unwrap();
        assert!(scanner.is_coverage_shutdown_segfault(b"environmentd | segfault at 0x0"));
        assert!(scanner.is_coverage_shutdown_segfault(b"segfault at 0x0 in environmentd"));
        assert!(!scanner.is_coverage_shutdown_segfault(b"clusterd | segfault at 0x0"));
        assert!(!scanner.is_coverage_shutdown_segfault(b"environmentd | halting process:"));

        let plain = Scanner::new(false).unwrap();
        assert!(!plain.is_coverage_shutdown_segfault(b"environmentd | segfault at 0x0"));
    }
}
