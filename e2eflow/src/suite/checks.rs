//! Functional checks for the deployed operator.

use crate::checks::Check;
use crate::context::E2eContext;
use crate::errors::{E2eError, E2eResult};
use crate::provider::EnvironmentProvider;
use async_trait::async_trait;
use std::sync::Arc;

/// Asserts that the operator's CRD is registered in the cluster.
#[derive(Debug)]
pub struct CrdInstalledCheck {
    provider: Arc<dyn EnvironmentProvider>,
}

impl CrdInstalledCheck {
    /// Creates the check.
    #[must_use]
    pub fn new(provider: Arc<dyn EnvironmentProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Check for CrdInstalledCheck {
    fn name(&self) -> &str {
        "crd_installed"
    }

    async fn run(&self, ctx: &E2eContext) -> E2eResult<()> {
        let crd = &ctx.config().crd_name;
        let exists = self
            .provider
            .resource_exists(ctx.cluster()?, "crd", crd, None)
            .await?;
        if exists {
            Ok(())
        } else {
            Err(E2eError::assertion(format!("CRD {crd} is not installed")))
        }
    }
}
