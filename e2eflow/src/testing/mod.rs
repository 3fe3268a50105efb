//! Testing utilities for e2eflow pipelines.
//!
//! This module provides:
//! - Scripted stages that record their executions
//! - In-memory command runner and environment provider doubles
//! - Assertions over run reports

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_check_failed, assert_check_passed, assert_teardown_failures};
pub use fixtures::{
    fast_config, test_context, test_context_with, FakeProvider, ScriptedCommandRunner,
};
pub use mocks::{ExecutionLog, FailingStage, PanickingStage, RecordingStage, SlowStage};
