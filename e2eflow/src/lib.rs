//! # e2eflow
//!
//! Lifecycle orchestration for end-to-end test suites that need an
//! ephemeral Kubernetes cluster.
//!
//! A run is split into ordered phases:
//!
//! - **Setup**: fail-fast stages that provision the cluster, build and load
//!   the artifact, install addons and deploy the controller
//! - **Checks**: independent functional checks, each reported on its own
//! - **Teardown**: best-effort stages that release everything setup acquired
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use e2eflow::prelude::*;
//!
//! let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::default());
//! let provider = Arc::new(KindProvider::new(runner.clone()));
//! let suite = OperatorSuite::new(provider, runner);
//!
//! let ctx = E2eContext::new(E2eConfig::default())?;
//! let report = suite.pipeline(ctx)?.run(&suite.checks()).await;
//! std::process::exit(report.exit_code());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod checks;
pub mod command;
pub mod config;
pub mod context;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod provider;
pub mod report;
pub mod stages;
pub mod suite;
pub mod testing;
pub mod wait;
pub mod workdir;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::checks::{run_checks, Check, CheckOutcome, CheckReport, FnCheck};
    pub use crate::command::{CommandOutput, CommandRunner, ExternalCommand, SystemCommandRunner};
    pub use crate::config::E2eConfig;
    pub use crate::context::{E2eContext, RunIdentity};
    pub use crate::errors::{E2eError, E2eResult};
    pub use crate::pipeline::{FailureMode, Pipeline, PipelineBuilder, PipelineState};
    pub use crate::provider::{ClusterHandle, EnvironmentProvider, KindProvider};
    pub use crate::report::{RunOutcome, RunReport};
    pub use crate::stages::{FnStage, NoOpStage, Stage};
    pub use crate::suite::OperatorSuite;
    pub use crate::wait::{wait_for, Condition};
    pub use crate::workdir::{with_directory, with_directory_async, WorkdirGuard};
    pub use std::sync::Arc;
}
