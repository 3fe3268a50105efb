//! Pipeline builder with validation.

use super::lifecycle::Pipeline;
use crate::context::E2eContext;
use crate::errors::{E2eError, E2eResult};
use crate::stages::Stage;
use std::collections::HashSet;

/// Builder for creating validated pipelines.
#[derive(Debug)]
pub struct PipelineBuilder {
    name: String,
    setup: Vec<Box<dyn Stage>>,
    teardown: Vec<Box<dyn Stage>>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            setup: Vec::new(),
            teardown: Vec::new(),
        }
    }

    /// Appends a setup stage.
    #[must_use]
    pub fn setup(mut self, stage: impl Stage + 'static) -> Self {
        self.setup.push(Box::new(stage));
        self
    }

    /// Appends a boxed setup stage.
    #[must_use]
    pub fn setup_boxed(mut self, stage: Box<dyn Stage>) -> Self {
        self.setup.push(stage);
        self
    }

    /// Appends a teardown stage.
    ///
    /// Teardown conventionally releases resources in the reverse order of
    /// acquisition; the builder does not enforce it.
    #[must_use]
    pub fn teardown(mut self, stage: impl Stage + 'static) -> Self {
        self.teardown.push(Box::new(stage));
        self
    }

    /// Appends a boxed teardown stage.
    #[must_use]
    pub fn teardown_boxed(mut self, stage: Box<dyn Stage>) -> Self {
        self.teardown.push(stage);
        self
    }

    /// Number of setup stages registered so far.
    #[must_use]
    pub fn setup_len(&self) -> usize {
        self.setup.len()
    }

    /// Number of teardown stages registered so far.
    #[must_use]
    pub fn teardown_len(&self) -> usize {
        self.teardown.len()
    }

    /// Validates the stage lists and builds the pipeline around `context`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a stage name is empty or repeated
    /// within its list.
    pub fn build(self, context: E2eContext) -> E2eResult<Pipeline> {
        if self.name.trim().is_empty() {
            return Err(E2eError::config("pipeline name must not be empty"));
        }
        validate_names("setup", &self.setup)?;
        validate_names("teardown", &self.teardown)?;
        Ok(Pipeline::new(self.name, self.setup, self.teardown, context))
    }
}

fn validate_names(phase: &str, stages: &[Box<dyn Stage>]) -> E2eResult<()> {
    let mut seen = HashSet::new();
    for (index, stage) in stages.iter().enumerate() {
        let name = stage.name();
        if name.trim().is_empty() {
            return Err(E2eError::config(format!(
                "{phase} stage at index {index} has an empty name"
            )));
        }
        if !seen.insert(name) {
            return Err(E2eError::config(format!(
                "duplicate {phase} stage '{name}' at index {index}"
            )));
        }
    }
    Ok(())
}
