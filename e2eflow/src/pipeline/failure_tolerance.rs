//! Failure handling modes for stage lists.
//!
//! Setup runs fail-fast: the first failure stops the list. Teardown runs
//! best-effort: every stage runs and every failure is collected.

use crate::errors::E2eError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How to handle stage failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Stop on the first failure (default).
    #[default]
    FailFast,
    /// Run every stage, collect all failures.
    BestEffort,
}

/// Record of a stage failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Position of the stage in its list.
    pub index: usize,
    /// Stage name.
    pub stage: String,
    /// Error message.
    pub error: String,
    /// Error kind, as returned by [`E2eError::kind`].
    pub error_type: String,
    /// Structured error fields, as returned by [`E2eError::to_json`].
    #[serde(default)]
    pub detail: serde_json::Value,
    /// When the failure was observed.
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a record for a stage that failed with `error`.
    #[must_use]
    pub fn new(index: usize, stage: impl Into<String>, error: &E2eError) -> Self {
        Self {
            index,
            stage: stage.into(),
            error: error.to_string(),
            error_type: error.kind().to_string(),
            detail: error.to_json(),
            timestamp: Utc::now(),
        }
    }
}

/// Collects failures while a stage list executes.
#[derive(Debug)]
pub struct FailureCollector {
    /// Failure mode.
    pub mode: FailureMode,
    failures: Vec<FailureRecord>,
    completed: usize,
}

impl FailureCollector {
    /// Creates a new failure collector.
    #[must_use]
    pub fn new(mode: FailureMode) -> Self {
        Self {
            mode,
            failures: Vec::new(),
            completed: 0,
        }
    }

    /// Records a stage failure.
    pub fn record_failure(&mut self, record: FailureRecord) {
        self.failures.push(record);
    }

    /// Records a stage completion.
    pub fn record_completion(&mut self) {
        self.completed += 1;
    }

    /// Returns true if execution should stop based on mode.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        match self.mode {
            FailureMode::FailFast => !self.failures.is_empty(),
            FailureMode::BestEffort => false,
        }
    }

    /// Number of stages that completed successfully.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Returns all failures.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Consumes the collector, returning the failures.
    #[must_use]
    pub fn into_failures(self) -> Vec<FailureRecord> {
        self.failures
    }
}

impl Default for FailureCollector {
    fn default() -> Self {
        Self::new(FailureMode::default())
    }
}

/// Failures collected during teardown.
///
/// These are hygiene diagnostics: they are reported but never change the
/// outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeardownDiagnostics {
    /// Failed teardown stages, in execution order.
    pub failures: Vec<FailureRecord>,
}

impl TeardownDiagnostics {
    /// Returns true if teardown was clean.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failed teardown stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Names of the failed stages.
    #[must_use]
    pub fn stages(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.stage.as_str()).collect()
    }

    pub(crate) fn extend(&mut self, failures: impl IntoIterator<Item = FailureRecord>) {
        self.failures.extend(failures);
    }
}
