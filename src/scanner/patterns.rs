// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fatal-signature and ignore pattern sets
//!
//! Both sets are byte regexes in verbose mode with unicode disabled, so
//! `.` matches any byte but `\n` and logs containing invalid UTF-8 still
//! scan. Every fatal alternative is wrapped in `^.*( ... ).*$` so a match
//! covers the whole physical line.

/// Unexpected failures, report them
pub const FATAL_PATTERN: &str = r"(?xm-u)
    ^ .*
    ( segfault\ at
    | trap\ invalid\ opcode
    | general\ protection
    | has\ overflowed\ its\ stack
    | internal\ error:
    | \*\ FATAL:
    | (^|\ )fatal:                      # frontegg-mock
    | [Oo]ut\ [Oo]f\ [Mm]emory
    | cannot\ migrate\ from\ catalog
    | halting\ process:                 # Rust unwrap
    | fatal\ runtime\ error:            # stack overflow
    | \[SQLsmith\]                      # unknown errors are logged
    | \[SQLancer\]                      # unknown errors are logged
    | environmentd:\ fatal:             # startup failure
    | clusterd:\ fatal:                 # startup failure
    | error:\ Found\ argument\ '.*'\ which\ wasn't\ expected,\ or\ isn't\ valid\ in\ this\ context
    | environmentd\ .*\ unrecognized\ configuration\ parameter
    | cannot\ load\ unknown\ system\ parameter\ from\ catalog\ storage
    | SUMMARY:\ .*Sanitizer
    | ----------\ RESULT\ COMPARISON\ ISSUE\ START\ ----------.*----------\ RESULT\ COMPARISON\ ISSUE\ END\ ------------
    | (FAIL|TIMEOUT)\s+\[\s*\d+\.\d+s\] # miri test summary
    )
    .* $
";

/// Expected failures, don't report them
pub const IGNORE_PATTERN: &str = r#"(?xm-u)
    # restart test
    ( restart-materialized-1\ \ \|\ thread\ 'coordinator'\ panicked\ at\ 'can't\ persist\ timestamp
    | restart-materialized-1\ *\|\ thread\ 'coordinator'\ panicked\ at\ 'external\ operation\ .*\ failed\ unrecoverably.*
    # cluster test
    | cluster-clusterd[12]-1\ .*\ halting\ process:\ new\ timely\ configuration\ does\ not\ match\ existing\ timely\ configuration
    # explicit mz_panic()
    | forced\ panic
    # broken_statements.slt stops panic propagation with this one
    | forced\ optimizer\ panic
    # follows a compute cluster panic, no new information
    | timely\ communication\ error:
    | aborting\ because\ propagate_crashes\ is\ enabled
    # corrupted CRDB
    | restart-materialized-1\ .*relation\ \\"fence\\"\ does\ not\ exist
    | restart-materialized-1\ .*relation\ "consensus"\ does\ not\ exist
    # the separate panic line carries the information
    | internal\ error:\ unexpected\ panic\ during\ query\ optimization
    # redpanda INFO logging
    | larger\ sizes\ prevent\ running\ out\ of\ memory
    # old versions don't know new parameters
    | (platform-checks|legacy-upgrade|upgrade-matrix|feature-benchmark)-materialized-.*\|.*cannot\ load\ unknown\ system\ parameter\ from\ catalog\ storage
    # fencing tests
    | txn-wal-fencing-mz_first-.*\|.*unexpected\ fence\ epoch
    | txn-wal-fencing-mz_first-.*\|.*fenced\ by\ new\ catalog\ upper
    | txn-wal-fencing-mz_first-.*\|.*fenced\ by\ new\ catalog\ epoch
    | platform-checks-mz_txn_tables.*\|.*unexpected\ fence\ epoch
    | platform-checks-mz_txn_tables.*\|.*fenced\ by\ new\ catalog\ upper
    | platform-checks-mz_txn_tables.*\|.*fenced\ by\ new\ catalog\ epoch
    # platform-checks upgrade tests
    | platform-checks-clusterd.*\|.*\ received\ persist\ state\ from\ the\ future
    | cannot\ load\ unknown\ system\ parameter\ from\ catalog\ storage(\ to\ set\ (default|configured)\ parameter)?
    | internal\ error:\ no\ AWS\ external\ ID\ prefix\ configured
    # purposely triggered
    | skip-version-upgrade-materialized.*\|.*\ incompatible\ persist\ version\ \d+\.\d+\.\d+(-dev)?,\ current:\ \d+\.\d+\.\d+(-dev)?,\ make\ sure\ to\ upgrade\ the\ catalog\ one\ version\ at\ a\ time
    )
"#;

/// Panic start of a service in interleaved logs.
///
/// `launchdarkly-materialized-1  | thread 'coordinator' panicked at [...]`
/// `[pod/environmentd-0/environmentd] thread 'coordinator' panicked at [...]`
pub const PANIC_START_PATTERN: &str =
    r"(?-u)^(\[)?(?P<service>[^ ]*)(\s*\||\]) thread '.*' panicked at ";

/// Any service-labeled log line.
///
/// `launchdarkly-materialized-1  | global timestamp must always go up`
/// `[pod/environmentd-0/environmentd] Unknown collection identifier u2082`
pub const SERVICE_LINE_PATTERN: &str = r"(?-u)^(\[)?(?P<service>[^ ]*)(\s*\||\]) (?P<msg>.*)$";

/// environmentd segfaults on shutdown are expected in coverage builds
pub const COVERAGE_SEGFAULT_PATTERN: &str =
    r"(?-u)environmentd.*segfault at|segfault at.*environmentd";
