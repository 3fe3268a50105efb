//! Running checks and collecting their outcomes.

use super::Check;
use crate::context::E2eContext;
use crate::errors::E2eError;
use crate::observability::SpanTimer;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info};

/// Result of a single check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Check name.
    pub name: String,
    /// Whether the expectation held.
    pub passed: bool,
    /// Failure description; empty when passed.
    pub message: String,
    /// Error kind for failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: f64,
}

impl CheckOutcome {
    /// Creates a passing outcome.
    #[must_use]
    pub fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: String::new(),
            error_type: None,
            duration_ms: 0.0,
        }
    }

    /// Creates a failing outcome from an error.
    #[must_use]
    pub fn fail(name: impl Into<String>, error: &E2eError) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: error.to_string(),
            error_type: Some(error.kind().to_string()),
            duration_ms: 0.0,
        }
    }

    #[must_use]
    fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Outcomes of every check that ran, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    /// Individual outcomes.
    pub outcomes: Vec<CheckOutcome>,
}

impl CheckReport {
    /// True if every check passed. An empty report passes.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    /// Number of checks that passed.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed).count()
    }

    /// Outcomes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }

    /// Looks up an outcome by check name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}

/// Runs every check against `ctx`.
///
/// Errors and panics are converted into failed outcomes.
pub async fn run_checks(ctx: &E2eContext, checks: &[Arc<dyn Check>]) -> CheckReport {
    let mut report = CheckReport::default();

    for check in checks {
        let timer = SpanTimer::start(check.name());
        let result = AssertUnwindSafe(check.run(ctx)).catch_unwind().await;
        let outcome = match result {
            Ok(Ok(())) => CheckOutcome::pass(check.name()),
            Ok(Err(e)) => CheckOutcome::fail(check.name(), &e),
            Err(payload) => CheckOutcome::fail(check.name(), &E2eError::from_panic(payload.as_ref())),
        }
        .with_duration_ms(timer.finish());

        if outcome.passed {
            info!(check = %outcome.name, duration_ms = outcome.duration_ms, "Check passed");
        } else {
            error!(check = %outcome.name, error = %outcome.message, "Check failed");
        }
        report.outcomes.push(outcome);
    }

    info!(
        total = report.outcomes.len(),
        passed = report.passed(),
        "Checks finished"
    );
    report
}
