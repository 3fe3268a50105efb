//! Run reports.

use crate::checks::CheckReport;
use crate::pipeline::{FailureRecord, PipelineState, TeardownDiagnostics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

/// Overall verdict of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Setup succeeded and every check passed.
    Success,
    /// A setup stage failed; no checks ran.
    SetupFailed,
    /// Setup succeeded but at least one check failed.
    ChecksFailed,
}

/// Everything that happened during one run.
///
/// Test failures (`setup_failure`, failed checks) decide the outcome.
/// Teardown diagnostics are reported separately and never change it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// When setup started.
    pub started_at: DateTime<Utc>,
    /// When teardown finished.
    pub finished_at: DateTime<Utc>,
    /// Overall verdict.
    pub outcome: RunOutcome,
    /// Pipeline state at the end of the run.
    pub final_state: PipelineState,
    /// The fatal setup failure, if any.
    pub setup_failure: Option<FailureRecord>,
    /// Check outcomes; empty when setup failed.
    pub checks: CheckReport,
    /// Teardown hygiene diagnostics.
    pub teardown: TeardownDiagnostics,
}

impl RunReport {
    /// True if the run succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Success
    }

    /// Process exit status: 0 on success, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_success())
    }

    /// Wall-clock duration of the run in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Converts to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "run_id": self.run_id.to_string(),
                "error": format!("failed to serialize report: {e}"),
            })
        })
    }

    /// Renders a short human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} run {} ({}ms): {:?}",
            self.pipeline,
            self.run_id,
            self.duration_ms(),
            self.outcome
        );
        if let Some(failure) = &self.setup_failure {
            let _ = writeln!(
                out,
                "  setup failed at stage {} '{}': {}",
                failure.index, failure.stage, failure.error
            );
        }
        for check in &self.checks.outcomes {
            let verdict = if check.passed { "PASS" } else { "FAIL" };
            let _ = write!(out, "  [{verdict}] {}", check.name);
            if !check.passed {
                let _ = write!(out, ": {}", check.message);
            }
            out.push('\n');
        }
        for failure in &self.teardown.failures {
            let _ = writeln!(
                out,
                "  teardown stage {} '{}' failed: {}",
                failure.index, failure.stage, failure.error
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckOutcome;
    use crate::errors::E2eError;

    fn report(outcome: RunOutcome) -> RunReport {
        let now = Utc::now();
        RunReport {
            run_id: Uuid::new_v4(),
            pipeline: "etcd-operator".to_string(),
            started_at: now,
            finished_at: now,
            outcome,
            final_state: PipelineState::Destroyed,
            setup_failure: None,
            checks: CheckReport::default(),
            teardown: TeardownDiagnostics::default(),
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(report(RunOutcome::Success).exit_code(), 0);
        assert_eq!(report(RunOutcome::SetupFailed).exit_code(), 1);
        assert_eq!(report(RunOutcome::ChecksFailed).exit_code(), 1);
    }

    #[test]
    fn test_json_shape() {
        let mut report = report(RunOutcome::ChecksFailed);
        report.checks.outcomes.push(CheckOutcome::fail(
            "crd_installed",
            &E2eError::assertion("missing"),
        ));
        let json = report.to_json();
        assert_eq!(json["outcome"], "checks_failed");
        assert_eq!(json["final_state"], "destroyed");
        assert_eq!(json["checks"]["outcomes"][0]["name"], "crd_installed");
        assert!(json["teardown"]["failures"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_summary_lists_failures() {
        let mut report = report(RunOutcome::ChecksFailed);
        report.checks.outcomes.push(CheckOutcome::pass("first"));
        report.checks.outcomes.push(CheckOutcome::fail(
            "second",
            &E2eError::assertion("expected 3 replicas"),
        ));
        let summary = report.summary();
        assert!(summary.contains("[PASS] first"));
        assert!(summary.contains("[FAIL] second"));
        assert!(summary.contains("expected 3 replicas"));
    }
}
