//! Pipeline lifecycle: setup, checks, teardown.

use super::executor::run_stages;
use super::failure_tolerance::{FailureMode, FailureRecord, TeardownDiagnostics};
use crate::checks::{run_checks, Check, CheckReport};
use crate::context::E2eContext;
use crate::errors::{E2eError, E2eResult};
use crate::report::{RunOutcome, RunReport};
use crate::stages::Stage;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Lifecycle state of a [`Pipeline`].
///
/// `Created → SettingUp → Ready → Checking → TearingDown → Destroyed`, or on
/// a setup failure `SettingUp → FailedSetup → TearingDown → Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No stage has run yet.
    Created,
    /// Setup stages are running.
    SettingUp,
    /// Every setup stage succeeded.
    Ready,
    /// Checks are running against the ready environment.
    Checking,
    /// A setup stage failed; remaining setup stages were skipped.
    FailedSetup,
    /// Teardown stages are running.
    TearingDown,
    /// Teardown has finished.
    Destroyed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::SettingUp => "setting_up",
            Self::Ready => "ready",
            Self::Checking => "checking",
            Self::FailedSetup => "failed_setup",
            Self::TearingDown => "tearing_down",
            Self::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// An environment lifecycle: ordered setup stages, ordered teardown stages
/// and the context they share.
pub struct Pipeline {
    name: String,
    setup: Vec<Box<dyn Stage>>,
    teardown: Vec<Box<dyn Stage>>,
    context: E2eContext,
    state: PipelineState,
    setup_failure: Option<FailureRecord>,
    diagnostics: TeardownDiagnostics,
}

impl Pipeline {
    pub(crate) fn new(
        name: String,
        setup: Vec<Box<dyn Stage>>,
        teardown: Vec<Box<dyn Stage>>,
        context: E2eContext,
    ) -> Self {
        Self {
            name,
            setup,
            teardown,
            context,
            state: PipelineState::Created,
            setup_failure: None,
            diagnostics: TeardownDiagnostics::default(),
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Returns the shared context.
    #[must_use]
    pub fn context(&self) -> &E2eContext {
        &self.context
    }

    /// Returns the shared context mutably, e.g. to seed handles before a
    /// standalone teardown.
    pub fn context_mut(&mut self) -> &mut E2eContext {
        &mut self.context
    }

    /// The setup stage that failed, if any.
    #[must_use]
    pub fn setup_failure(&self) -> Option<&FailureRecord> {
        self.setup_failure.as_ref()
    }

    /// Diagnostics collected by teardown.
    #[must_use]
    pub fn diagnostics(&self) -> &TeardownDiagnostics {
        &self.diagnostics
    }

    /// Runs the setup stages in order, stopping at the first failure.
    ///
    /// Setup runs at most once; calling it again is a configuration error
    /// and re-runs nothing.
    pub async fn run_setup(&mut self) -> E2eResult<()> {
        if self.state != PipelineState::Created {
            return Err(E2eError::config(format!(
                "pipeline '{}' cannot run setup in state {}",
                self.name, self.state
            )));
        }

        self.state = PipelineState::SettingUp;
        info!(pipeline = %self.name, stages = self.setup.len(), "Starting setup");

        let outcome = run_stages(FailureMode::FailFast, "setup", &self.setup, &mut self.context).await;

        match outcome.first_error {
            None => {
                self.state = PipelineState::Ready;
                info!(pipeline = %self.name, completed = outcome.completed, "Environment ready");
                Ok(())
            }
            Some(err) => {
                self.state = PipelineState::FailedSetup;
                self.setup_failure = outcome.failures.into_iter().next();
                error!(pipeline = %self.name, error = %err, "Setup failed");
                Err(err)
            }
        }
    }

    /// Runs checks against the ready environment.
    pub async fn run_checks(&mut self, checks: &[Arc<dyn Check>]) -> E2eResult<CheckReport> {
        if self.state != PipelineState::Ready {
            return Err(E2eError::config(format!(
                "pipeline '{}' cannot run checks in state {}",
                self.name, self.state
            )));
        }
        self.state = PipelineState::Checking;
        Ok(run_checks(&self.context, checks).await)
    }

    /// Runs every teardown stage exactly once, collecting failures.
    ///
    /// Calling it again after teardown finished is a no-op.
    pub async fn run_teardown(&mut self) -> &TeardownDiagnostics {
        if self.state == PipelineState::Destroyed {
            return &self.diagnostics;
        }

        self.state = PipelineState::TearingDown;
        info!(pipeline = %self.name, stages = self.teardown.len(), "Starting teardown");

        let outcome =
            run_stages(FailureMode::BestEffort, "teardown", &self.teardown, &mut self.context).await;
        self.diagnostics.extend(outcome.failures);
        self.state = PipelineState::Destroyed;

        if self.diagnostics.is_empty() {
            info!(pipeline = %self.name, "Teardown complete");
        } else {
            warn!(
                pipeline = %self.name,
                failed = ?self.diagnostics.stages(),
                "Teardown finished with failures"
            );
        }
        &self.diagnostics
    }

    /// Runs the full lifecycle: setup, checks if setup succeeded, then
    /// teardown unconditionally.
    ///
    /// Consumes the pipeline; the context is dropped once the report is
    /// built.
    pub async fn run(mut self, checks: &[Arc<dyn Check>]) -> RunReport {
        let started_at = Utc::now();

        let check_report = match self.run_setup().await {
            Ok(()) => match self.run_checks(checks).await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!(error = %e, "Checks could not run");
                    None
                }
            },
            Err(_) => None,
        };

        self.run_teardown().await;

        let outcome = match (&self.setup_failure, &check_report) {
            (Some(_), _) | (None, None) => RunOutcome::SetupFailed,
            (None, Some(report)) if report.all_passed() => RunOutcome::Success,
            (None, Some(_)) => RunOutcome::ChecksFailed,
        };

        RunReport {
            run_id: self.context.identity().run_id,
            pipeline: self.name,
            started_at,
            finished_at: Utc::now(),
            outcome,
            final_state: self.state,
            setup_failure: self.setup_failure,
            checks: check_report.unwrap_or_default(),
            teardown: self.diagnostics,
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("setup", &self.setup.iter().map(|s| s.name()).collect::<Vec<_>>())
            .field("teardown", &self.teardown.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
