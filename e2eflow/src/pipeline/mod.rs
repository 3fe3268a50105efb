//! Pipeline building and execution.
//!
//! This module provides:
//! - The pipeline builder with validation
//! - The lifecycle state machine (setup, checks, teardown)
//! - The stage loop and its failure modes

mod builder;
mod executor;
mod failure_tolerance;
mod lifecycle;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use executor::{run_stages, StageRunOutcome};
pub use failure_tolerance::{FailureCollector, FailureMode, FailureRecord, TeardownDiagnostics};
pub use lifecycle::{Pipeline, PipelineState};
