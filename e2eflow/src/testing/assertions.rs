//! Test assertions for run reports.

use crate::checks::CheckReport;
use crate::pipeline::TeardownDiagnostics;

/// Asserts that the named check ran and passed.
pub fn assert_check_passed(report: &CheckReport, name: &str) {
    match report.get(name) {
        Some(outcome) => assert!(
            outcome.passed,
            "Expected check '{name}' to pass, got: {}",
            outcome.message
        ),
        None => panic!(
            "Check '{name}' did not run. Ran: {:?}",
            report.outcomes.iter().map(|o| &o.name).collect::<Vec<_>>()
        ),
    }
}

/// Asserts that the named check ran and failed.
pub fn assert_check_failed(report: &CheckReport, name: &str) {
    match report.get(name) {
        Some(outcome) => assert!(!outcome.passed, "Expected check '{name}' to fail"),
        None => panic!(
            "Check '{name}' did not run. Ran: {:?}",
            report.outcomes.iter().map(|o| &o.name).collect::<Vec<_>>()
        ),
    }
}

/// Asserts that exactly the named teardown stages failed, in order.
pub fn assert_teardown_failures(diagnostics: &TeardownDiagnostics, expected: &[&str]) {
    assert_eq!(
        diagnostics.stages(),
        expected,
        "Unexpected teardown failures: {:?}",
        diagnostics.failures
    );
}
