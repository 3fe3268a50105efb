//! Scripted stages for testing pipelines.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::context::E2eContext;
use crate::errors::{CommandExecutionError, E2eResult};
use crate::provider::ClusterHandle;
use crate::stages::Stage;

/// Shared, ordered record of stage executions across a pipeline.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog(Arc<Mutex<Vec<String>>>);

impl ExecutionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    /// Returns a copy of all entries in order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Number of times `entry` was recorded.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }
}

/// A stage that records its executions and succeeds.
///
/// Optionally replaces the context's cluster handle, to observe which stage
/// touched it last.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    log: ExecutionLog,
    cluster: Option<String>,
    call_count: Mutex<usize>,
}

impl RecordingStage {
    /// Creates a new recording stage writing to `log`.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &ExecutionLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
            cluster: None,
            call_count: Mutex::new(0),
        }
    }

    /// Sets the cluster handle in the context when executed.
    #[must_use]
    pub fn setting_cluster(mut self, name: impl Into<String>) -> Self {
        self.cluster = Some(name.into());
        self
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.call_count.lock()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut E2eContext) -> E2eResult<()> {
        *self.call_count.lock() += 1;
        self.log.push(&self.name);
        if let Some(cluster) = &self.cluster {
            ctx.set_cluster(ClusterHandle::new(cluster));
        }
        Ok(())
    }
}

/// A stage that always fails with a command error.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    message: String,
    log: ExecutionLog,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>, log: &ExecutionLog) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &mut E2eContext) -> E2eResult<()> {
        self.log.push(&self.name);
        Err(CommandExecutionError::non_zero(format!("make {}", self.name), 2, &self.message).into())
    }
}

/// A stage that panics.
#[derive(Debug)]
pub struct PanickingStage {
    name: String,
    log: ExecutionLog,
}

impl PanickingStage {
    /// Creates a new panicking stage.
    #[must_use]
    pub fn new(name: impl Into<String>, log: &ExecutionLog) -> Self {
        Self {
            name: name.into(),
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Stage for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &mut E2eContext) -> E2eResult<()> {
        self.log.push(&self.name);
        panic!("stage {} panicked", self.name);
    }
}

/// A stage that takes time to execute.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
    log: ExecutionLog,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration, log: &ExecutionLog) -> Self {
        Self {
            name: name.into(),
            delay,
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &mut E2eContext) -> E2eResult<()> {
        tokio::time::sleep(self.delay).await;
        self.log.push(&self.name);
        Ok(())
    }
}
