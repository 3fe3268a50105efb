//! Functional check harness.
//!
//! Checks run against the context once setup has completed. They are
//! independent: a failing, erroring or panicking check is recorded and the
//! remaining checks still run.

mod harness;

pub use harness::{run_checks, CheckOutcome, CheckReport};

use crate::context::E2eContext;
use crate::errors::E2eResult;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt::Debug;

/// A functional assertion against the ready environment.
#[async_trait]
pub trait Check: Send + Sync + Debug {
    /// Returns the name of the check.
    fn name(&self) -> &str;

    /// Runs the check. `Ok(())` means the expectation held.
    async fn run(&self, ctx: &E2eContext) -> E2eResult<()>;
}

/// A closure-based check.
pub struct FnCheck<F>
where
    F: for<'a> Fn(&'a E2eContext) -> BoxFuture<'a, E2eResult<()>> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnCheck<F>
where
    F: for<'a> Fn(&'a E2eContext) -> BoxFuture<'a, E2eResult<()>> + Send + Sync,
{
    /// Creates a new closure-based check.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnCheck<F>
where
    F: for<'a> Fn(&'a E2eContext) -> BoxFuture<'a, E2eResult<()>> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCheck").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Check for FnCheck<F>
where
    F: for<'a> Fn(&'a E2eContext) -> BoxFuture<'a, E2eResult<()>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &E2eContext) -> E2eResult<()> {
        (self.func)(ctx).await
    }
}
