// SPDX-License-Identifier: PMPL-1.0-or-later

//! Cross-line panic correlation
//!
//! Panics span several lines and the log lines of different services are
//! interleaved, which makes them awkward to catch with a single regex.
//! Instead the buffer is walked line by line, remembering one open panic
//! per service label. The next line of the same service completes it.

use crate::error::ScanError;
use crate::scanner::patterns::{PANIC_START_PATTERN, SERVICE_LINE_PATTERN};
use crate::scanner::Scanner;
use crate::types::RawErrorMatch;
use regex::bytes::Regex;
use std::collections::HashMap;

/// A panic start line joined with its continuation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicRecord {
    pub service: String,
    pub start_line: Vec<u8>,
    pub message: Vec<u8>,
}

impl PanicRecord {
    /// `start + " " + message`
    pub fn combined(&self) -> Vec<u8> {
        let mut text = Vec::with_capacity(self.start_line.len() + 1 + self.message.len());
        text.extend_from_slice(&self.start_line);
        text.push(b' ');
        text.extend_from_slice(&self.message);
        text
    }

    pub fn into_match(self, file: &str) -> RawErrorMatch {
        RawErrorMatch::new(self.combined(), file)
    }
}

/// Line shapes recognised by the correlator
struct LineMatcher {
    panic_start: Regex,
    service_line: Regex,
}

impl LineMatcher {
    fn new() -> Result<Self, ScanError> {
        Ok(Self {
            panic_start: Regex::new(PANIC_START_PATTERN)?,
            service_line: Regex::new(SERVICE_LINE_PATTERN)?,
        })
    }
}

/// Correlate service panics in `data`.
///
/// Fails when the same service starts a second panic before the first one
/// was completed, or when a panic is still open at the end of the buffer:
/// a truncated log must not hide a crash.
pub fn correlate_panics(
    scanner: &Scanner,
    data: &[u8],
    file: &str,
) -> Result<Vec<PanicRecord>, ScanError> {
    let matcher = LineMatcher::new()?;
    let mut open_panics: HashMap<Vec<u8>, &[u8]> = HashMap::new();
    let mut collected = Vec::new();

    for line in lines(data) {
        if let Some(caps) = matcher.panic_start.captures(line) {
            let service = caps["service"].to_vec();
            if open_panics.contains_key(&service) {
                return Err(ScanError::InterleavedPanic {
                    file: file.to_string(),
                    service: String::from_utf8_lossy(&service).into_owned(),
                    line: String::from_utf8_lossy(line).into_owned(),
                });
            }
            open_panics.insert(service, line);
            continue;
        }

        if open_panics.is_empty() {
            continue;
        }

        let Some(caps) = matcher.service_line.captures(line) else {
            continue;
        };
        // Every labeled line lands here; only services inside a panic matter
        let Some(start_line) = open_panics.remove(&caps["service"]) else {
            continue;
        };

        let record = PanicRecord {
            service: String::from_utf8_lossy(&caps["service"]).into_owned(),
            start_line: start_line.to_vec(),
            message: caps["msg"].to_vec(),
        };
        if scanner.is_ignored(&record.combined()) {
            continue;
        }
        collected.push(record);
    }

    if !open_panics.is_empty() {
        let mut services: Vec<String> = open_panics
            .keys()
            .map(|service| String::from_utf8_lossy(service).into_owned())
            .collect();
        services.sort();
        return Err(ScanError::UnterminatedPanic {
            file: file.to_string(),
            services,
        });
    }

    Ok(collected)
}

/// Non-empty physical lines without their `\n`
fn lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    data.split(|&b| b == b'\n').filter(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlate(log: &str) -> Result<Vec<String>, ScanError> {
        let scanner = Scanner::new(false).unwrap();
        correlate_panics(&scanner, log.as_bytes(), "services.log").map(|records| {
            records
                .iter()
                .map(|r| String::from_utf8_lossy(&r.combined()).into_owned())
                .collect()
        })
    }

    #[test]
    fn test_combines_start_and_continuation() {
        let log = "svcA | thread 'x' panicked at \nsvcA | out of memory\n";
        assert_eq!(
            correlate(log).unwrap(),
            vec!["svcA | thread 'x' panicked at  out of memory"]
        );
    }

    #[test]
    fn test_interleaved_services() {
        let log = "\
mz-1  | thread 'coordinator' panicked at src/coord.rs:12:5:
pg-1  | LOG: checkpoint starting
pg-1  | LOG: checkpoint complete
[pod/clusterd-0/clusterd] thread 'timely:work-0' panicked at src/render.rs:4:1:
mz-1  | global timestamp must always go up
[pod/clusterd-0/clusterd] Unknown collection identifier u2082
";
        assert_eq!(
            correlate(log).unwrap(),
            vec![
                "mz-1  | thread 'coordinator' panicked at src/coord.rs:12:5: global timestamp must always go up",
                "[pod/clusterd-0/clusterd] thread 'timely:work-0' panicked at src/render.rs:4:1: Unknown collection identifier u2082",
            ]
        );
    }

    #[test]
    fn test_pending_state_is_cleared() {
        let log = "\
svc | thread 'a' panicked at x.rs:1:
svc | first
svc | thread 'b' panicked at y.rs:2:
svc | second
";
        assert_eq!(correlate(log).unwrap().len(), 2);
    }

    #[test]
    fn test_unlabeled_and_unrelated_lines_are_skipped() {
        let log = "\
plain text without prefix
other | nothing to see
svc | thread 'a' panicked at x.rs:1:
unlabeled backtrace line
svc | boom
";
        assert_eq!(
            correlate(log).unwrap(),
            vec!["svc | thread 'a' panicked at x.rs:1: boom"]
        );
    }

    #[test]
    fn test_ignored_panic_is_dropped() {
        let log = "\
svc | thread 'main' panicked at src/lib.rs:1:
svc | forced panic
";
        assert!(correlate(log).unwrap().is_empty());
    }

    #[test]
    fn test_interleaved_panics_of_same_service_abort() {
        let log = "\
svc | thread 'a' panicked at x.rs:1:
svc | thread 'b' panicked at y.rs:2:
svc | message
";
        match correlate(log) {
            Err(ScanError::InterleavedPanic { service, line, file }) => {
                assert_eq!(service, "svc");
                assert_eq!(line, "svc | thread 'b' panicked at y.rs:2:");
                assert_eq!(file, "services.log");
            }
            other => panic!("expected InterleavedPanic, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_panic_aborts() {
        let log = "\
zeta | thread 'a' panicked at x.rs:1:
alpha | thread 'b' panicked at y.rs:2:
";
        match correlate(log) {
            Err(ScanError::UnterminatedPanic { services, .. }) => {
                assert_eq!(services, vec!["alpha".to_string(), "zeta".to_string()]);
            }
            other => panic!("expected UnterminatedPanic, got {:?}", other),
        }
    }

    #[test]
    fn test_last_line_without_newline() {
        let log = "svc | thread 'a' panicked at x.rs:1:\nsvc | done";
        assert_eq!(correlate(log).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_buffer() {
        assert!(correlate("").unwrap().is_empty());
    }
}
