//! Stage trait and implementations.
//!
//! Stages are the ordered units of setup and teardown work. A stage receives
//! the shared [`E2eContext`] mutably so it can record the handles it acquires
//! for later stages and checks.

use crate::context::E2eContext;
use crate::errors::E2eResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt::Debug;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage, used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Executes the stage.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The shared run context
    async fn execute(&self, ctx: &mut E2eContext) -> E2eResult<()>;
}

/// A closure-based stage.
///
/// The closure returns a boxed future borrowing the context:
///
/// ```rust,ignore
/// let stage = FnStage::new("annotate", |ctx| {
///     Box::pin(async move {
///         ctx.annotate("phase", "setup");
///         Ok(())
///     })
/// });
/// ```
pub struct FnStage<F>
where
    F: for<'a> Fn(&'a mut E2eContext) -> BoxFuture<'a, E2eResult<()>> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: for<'a> Fn(&'a mut E2eContext) -> BoxFuture<'a, E2eResult<()>> + Send + Sync,
{
    /// Creates a new closure-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: for<'a> Fn(&'a mut E2eContext) -> BoxFuture<'a, E2eResult<()>> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: for<'a> Fn(&'a mut E2eContext) -> BoxFuture<'a, E2eResult<()>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut E2eContext) -> E2eResult<()> {
        (self.func)(ctx).await
    }
}

/// A stage that does nothing.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &mut E2eContext) -> E2eResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::E2eError;
    use crate::testing::test_context;

    #[tokio::test]
    async fn test_fn_stage_mutates_context() {
        let stage = FnStage::new("annotate", |ctx| {
            Box::pin(async move {
                ctx.annotate("phase", "setup");
                Ok(())
            })
        });

        assert_eq!(stage.name(), "annotate");

        let mut ctx = test_context();
        stage.execute(&mut ctx).await.unwrap();
        assert_eq!(ctx.annotation("phase"), Some("setup"));
    }

    #[tokio::test]
    async fn test_fn_stage_propagates_error() {
        let stage = FnStage::new("broken", |_ctx| {
            Box::pin(async { Err(E2eError::assertion("nope")) })
        });

        let mut ctx = test_context();
        let err = stage.execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.kind(), "check_assertion");
    }

    #[tokio::test]
    async fn test_noop_stage() {
        let stage = NoOpStage::new("noop");

        assert_eq!(stage.name(), "noop");

        let mut ctx = test_context();
        assert!(stage.execute(&mut ctx).await.is_ok());
    }
}
