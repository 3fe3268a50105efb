//! Stage span helpers.

use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::Span;

/// Attributes describing one stage execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageSpanAttributes {
    /// `setup` or `teardown`.
    pub phase: String,
    /// Position in the stage list.
    pub index: usize,
    /// Stage name.
    pub stage_name: String,
    /// Final status.
    pub status: Option<String>,
    /// Duration in milliseconds.
    pub duration_ms: Option<f64>,
    /// Error message if failed.
    pub error: Option<String>,
}

impl StageSpanAttributes {
    /// Creates new stage span attributes.
    #[must_use]
    pub fn new(phase: impl Into<String>, index: usize, stage_name: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            index,
            stage_name: stage_name.into(),
            ..Default::default()
        }
    }

    /// Sets the stage status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the error.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Opens an `info` span carrying the stage identity.
    #[must_use]
    pub fn span(&self) -> Span {
        tracing::info_span!(
            "stage",
            phase = %self.phase,
            index = self.index,
            stage = %self.stage_name,
        )
    }

    /// Emits the completion event for the stage.
    pub fn emit(&self) {
        match &self.error {
            Some(error) => tracing::error!(
                phase = %self.phase,
                index = self.index,
                stage = %self.stage_name,
                status = self.status.as_deref().unwrap_or("failed"),
                duration_ms = self.duration_ms.unwrap_or_default(),
                error = %error,
                "Stage failed"
            ),
            None => tracing::info!(
                phase = %self.phase,
                index = self.index,
                stage = %self.stage_name,
                status = self.status.as_deref().unwrap_or("completed"),
                duration_ms = self.duration_ms.unwrap_or_default(),
                "Stage completed"
            ),
        }
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}
