// SPDX-License-Identifier: PMPL-1.0-or-later

//! JUnit XML failure extraction
//!
//! Streams the document instead of building a tree: suites may nest, the
//! root may be `<testsuites>` or a bare `<testsuite>`, and only
//! `<failure>` / `<error>` results inside a `<testcase>` are of interest.

use crate::error::ScanError;
use crate::types::TestFailure;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;
use std::path::Path;

/// Marker in a file name for JUnit reports
pub const REPORT_MARKER: &str = "junit_";
/// Testdrive reports duplicate the mzcompose ones
pub const EXCLUDED_REPORT_MARKER: &str = "junit_testdrive_";

/// Whether a file name denotes a structured report rather than plain log text
pub fn is_junit_report(file_name: &str) -> bool {
    file_name.contains(REPORT_MARKER) && !file_name.contains(EXCLUDED_REPORT_MARKER)
}

/// Extract failures from a report on disk
pub fn extract_failures_from_file(path: &Path) -> Result<Vec<TestFailure>, ScanError> {
    let reader = Reader::from_file(path).map_err(|e| report_error(path, e))?;
    extract_failures(reader).map_err(|e| report_error(path, e))
}

/// Extract failures from an in-memory report
pub fn extract_failures_from_str(xml: &str) -> Result<Vec<TestFailure>, quick_xml::Error> {
    extract_failures(Reader::from_reader(xml.as_bytes()))
}

#[derive(Default)]
struct OpenCase {
    class_name: String,
    name: String,
}

struct OpenResult {
    message: String,
    text: String,
}

fn extract_failures<R: BufRead>(mut reader: Reader<R>) -> Result<Vec<TestFailure>, quick_xml::Error> {
    let mut failures = Vec::new();
    let mut buf = Vec::new();
    let mut case: Option<OpenCase> = None;
    let mut result: Option<OpenResult> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"testcase" => case = Some(open_case(&e)?),
                b"failure" | b"error" if case.is_some() => {
                    result = Some(OpenResult {
                        message: attribute(&e, b"message")?,
                        text: String::new(),
                    });
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"failure" | b"error" => {
                    if let Some(case) = &case {
                        failures.push(failure(case, attribute(&e, b"message")?, String::new()));
                    }
                }
                _ => {}
            },
            Event::Text(t) => {
                if let Some(result) = result.as_mut() {
                    result.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(result) = result.as_mut() {
                    result.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"failure" | b"error" => {
                    if let (Some(case), Some(done)) = (&case, result.take()) {
                        failures.push(failure(case, done.message, done.text));
                    }
                }
                b"testcase" => case = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(failures)
}

fn open_case(e: &BytesStart<'_>) -> Result<OpenCase, quick_xml::Error> {
    Ok(OpenCase {
        class_name: attribute(e, b"classname")?,
        name: attribute(e, b"name")?,
    })
}

fn failure(case: &OpenCase, message: String, text: String) -> TestFailure {
    TestFailure {
        test_class: case.class_name.clone(),
        test_case: case.name.clone(),
        message,
        text,
    }
}

/// Unescaped attribute value, empty when absent
fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<String, quick_xml::Error> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(attr.unescape_value()?.into_owned());
        }
    }
    Ok(String::new())
}

fn report_error(path: &Path, error: quick_xml::Error) -> ScanError {
    ScanError::Report {
        file: path.display().to_string(),
        reason: error.to_string(),
    }
}
