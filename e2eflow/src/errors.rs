//! Error types for e2eflow.
//!
//! The taxonomy is closed: every failure a stage, condition or check can
//! produce maps onto one of the [`E2eError`] variants, so callers never need
//! to inspect upstream error text to decide what went wrong.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for e2eflow operations.
#[derive(Debug, Error)]
pub enum E2eError {
    /// The environment could not be created or destroyed.
    #[error("{0}")]
    Provisioning(#[from] ProvisioningError),

    /// A built artifact could not be made available in the environment.
    #[error("{0}")]
    ArtifactLoad(#[from] ArtifactLoadError),

    /// An external tool failed to spawn, exited nonzero or ran too long.
    #[error("{0}")]
    CommandExecution(#[from] CommandExecutionError),

    /// A readiness condition never held within its budget.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),

    /// A functional expectation was not met.
    #[error("Check assertion failed: {0}")]
    CheckAssertion(String),

    /// The run was cancelled or its overall deadline passed.
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// A stage or check panicked; the panic was caught.
    #[error("Panicked: {0}")]
    Panicked(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The working directory could not be entered or restored.
    #[error("Working directory error at {}: {source}", .path.display())]
    Workdir {
        /// The directory involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl E2eError {
    /// Creates a check assertion failure.
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::CheckAssertion(message.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Converts a caught panic payload into an error.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }

    /// Returns a stable, machine-readable name for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Provisioning(_) => "provisioning",
            Self::ArtifactLoad(_) => "artifact_load",
            Self::CommandExecution(_) => "command_execution",
            Self::Timeout(_) => "timeout",
            Self::CheckAssertion(_) => "check_assertion",
            Self::Cancelled(_) => "cancelled",
            Self::Panicked(_) => "panic",
            Self::Config(_) => "config",
            Self::Workdir { .. } => "workdir",
            Self::Io(_) => "io",
        }
    }

    /// Converts to a JSON representation for reports.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "type": self.kind(),
            "message": self.to_string(),
        });
        match self {
            Self::CommandExecution(err) => {
                value["command"] = serde_json::json!(err.command);
                value["failure"] = serde_json::json!(err.kind);
                value["exit_code"] = serde_json::json!(err.exit_code);
            }
            Self::Timeout(err) => {
                value["last_state"] = serde_json::json!(err.last_state);
                value["timeout_seconds"] = serde_json::json!(err.timeout.as_secs_f64());
            }
            _ => {}
        }
        value
    }
}

/// Error raised when a cluster or namespace cannot be created or destroyed.
#[derive(Debug, Clone, Error)]
#[error("Provisioning failed: could not {operation} '{target}': {reason}")]
pub struct ProvisioningError {
    /// What was being attempted (e.g. "create cluster").
    pub operation: String,
    /// The cluster or namespace name.
    pub target: String,
    /// Why it failed.
    pub reason: String,
}

impl ProvisioningError {
    /// Creates a new provisioning error.
    #[must_use]
    pub fn new(
        operation: impl Into<String>,
        target: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when an artifact cannot be loaded into a cluster.
#[derive(Debug, Clone, Error)]
#[error("Artifact load failed: '{artifact}' into cluster '{cluster}': {reason}")]
pub struct ArtifactLoadError {
    /// The artifact reference (e.g. an image tag).
    pub artifact: String,
    /// The target cluster.
    pub cluster: String,
    /// Why it failed.
    pub reason: String,
}

impl ArtifactLoadError {
    /// Creates a new artifact load error.
    #[must_use]
    pub fn new(
        artifact: impl Into<String>,
        cluster: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            cluster: cluster.into(),
            reason: reason.into(),
        }
    }
}

/// How an external command failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandFailureKind {
    /// The process could not be started at all.
    Spawn,
    /// The process ran and exited with a nonzero status.
    NonZeroExit,
    /// The process exceeded its maximum duration and was killed.
    TimedOut,
}

impl fmt::Display for CommandFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn => write!(f, "failed to spawn"),
            Self::NonZeroExit => write!(f, "exited with nonzero status"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Error raised when an external command does not succeed.
#[derive(Debug, Clone, Error)]
#[error("Command `{command}` {kind}{}: {output}", .exit_code.map(|c| format!(" ({c})")).unwrap_or_default())]
pub struct CommandExecutionError {
    /// The command line.
    pub command: String,
    /// The failure class.
    pub kind: CommandFailureKind,
    /// Exit code, when the process exited on its own.
    pub exit_code: Option<i32>,
    /// Combined output, or the spawn error text.
    pub output: String,
}

impl CommandExecutionError {
    /// Creates a spawn failure.
    #[must_use]
    pub fn spawn(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            kind: CommandFailureKind::Spawn,
            exit_code: None,
            output: reason.into(),
        }
    }

    /// Creates a nonzero exit failure.
    #[must_use]
    pub fn non_zero(command: impl Into<String>, exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            kind: CommandFailureKind::NonZeroExit,
            exit_code: Some(exit_code),
            output: output.into(),
        }
    }

    /// Creates a timeout failure.
    #[must_use]
    pub fn timed_out(command: impl Into<String>, limit: Duration, output: impl Into<String>) -> Self {
        let mut output = output.into();
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&format!("killed after {limit:?}"));
        Self {
            command: command.into(),
            kind: CommandFailureKind::TimedOut,
            exit_code: None,
            output,
        }
    }
}

/// Error raised when a readiness condition does not hold in time.
#[derive(Debug, Clone, Error)]
#[error("Timed out after {timeout:?} waiting for {description} (last state: {last_state})")]
pub struct TimeoutError {
    /// The condition being waited on.
    pub description: String,
    /// The configured ceiling.
    pub timeout: Duration,
    /// Last observed state, for diagnosis.
    pub last_state: String,
}

impl TimeoutError {
    /// Creates a new timeout error.
    #[must_use]
    pub fn new(
        description: impl Into<String>,
        timeout: Duration,
        last_state: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            timeout,
            last_state: last_state.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type E2eResult<T> = Result<T, E2eError>;
