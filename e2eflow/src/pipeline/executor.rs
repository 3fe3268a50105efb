//! The stage loop shared by setup and teardown.

use super::failure_tolerance::{FailureCollector, FailureMode, FailureRecord};
use crate::context::E2eContext;
use crate::errors::E2eError;
use crate::observability::{SpanTimer, StageSpanAttributes};
use crate::stages::Stage;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{warn, Instrument};

/// What happened while running a stage list.
#[derive(Debug, Default)]
pub struct StageRunOutcome {
    /// Stages that completed successfully.
    pub completed: usize,
    /// Stages that were started.
    pub executed: usize,
    /// Failure records, in execution order.
    pub failures: Vec<FailureRecord>,
    /// The first error, kept intact for fail-fast callers.
    pub first_error: Option<E2eError>,
}

impl StageRunOutcome {
    /// Returns true if no stage failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs `stages` in order against `ctx`.
///
/// In [`FailureMode::FailFast`] the first failure stops iteration and the
/// cancellation token is checked before each stage; a cancelled token fails
/// the stage that was about to start. In [`FailureMode::BestEffort`] every
/// stage runs exactly once regardless of failures or cancellation. Panics
/// are caught in both modes and recorded as failures.
pub async fn run_stages(
    mode: FailureMode,
    phase: &str,
    stages: &[Box<dyn Stage>],
    ctx: &mut E2eContext,
) -> StageRunOutcome {
    let mut collector = FailureCollector::new(mode);
    let mut first_error = None;
    let mut executed = 0;

    for (index, stage) in stages.iter().enumerate() {
        if collector.should_stop() {
            break;
        }
        let attrs = StageSpanAttributes::new(phase, index, stage.name());

        if mode == FailureMode::FailFast {
            if let Err(e) = ctx.cancellation().check() {
                warn!(phase, index, stage = stage.name(), "Run cancelled before stage");
                collector.record_failure(FailureRecord::new(index, stage.name(), &e));
                first_error.get_or_insert(e);
                continue;
            }
        }

        executed += 1;
        let timer = SpanTimer::start(stage.name());
        let span = attrs.span();
        let result = AssertUnwindSafe(stage.execute(ctx).instrument(span))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(E2eError::from_panic(payload.as_ref())));
        let attrs = attrs.with_duration_ms(timer.finish());

        match result {
            Ok(()) => {
                attrs.with_status("completed").emit();
                collector.record_completion();
            }
            Err(e) => {
                attrs.with_status("failed").with_error(e.to_string()).emit();
                collector.record_failure(FailureRecord::new(index, stage.name(), &e));
                first_error.get_or_insert(e);
            }
        }
    }

    StageRunOutcome {
        completed: collector.completed(),
        executed,
        failures: collector.into_failures(),
        first_error,
    }
}
