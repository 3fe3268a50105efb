//! Teardown stages.
//!
//! Each stage releases what the matching setup stage acquired and skips
//! quietly when that handle was never recorded.

use super::make_command;
use crate::command::{CommandOutput, CommandRunner};
use crate::context::E2eContext;
use crate::errors::{E2eError, E2eResult};
use crate::provider::{Addon, EnvironmentProvider};
use crate::stages::Stage;
use crate::workdir::with_directory_async;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

const UNINSTALL_TARGETS: [[&str; 2]; 2] = [
    ["uninstall", "ignore-not-found=true"],
    ["undeploy", "ignore-not-found=true"],
];

/// Removes the operator's CRDs and controller.
///
/// Failing make targets are logged as warnings only.
#[derive(Debug)]
pub struct UninstallControllerStage {
    runner: Arc<dyn CommandRunner>,
}

impl UninstallControllerStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Stage for UninstallControllerStage {
    fn name(&self) -> &str {
        "uninstall_controller"
    }

    async fn execute(&self, ctx: &mut E2eContext) -> E2eResult<()> {
        let Some(cluster) = ctx.cluster_handle() else {
            debug!("No cluster recorded, skipping controller removal");
            return Ok(());
        };
        let runner = self.runner.as_ref();
        with_directory_async(ctx.project_dir(), || async {
            for target in UNINSTALL_TARGETS {
                let command = make_command(cluster, &target);
                if let Err(e) = runner.run(&command).await.and_then(CommandOutput::check) {
                    warn!(command = %command.line, error = %e, "Uninstall step failed");
                }
            }
            Ok::<(), E2eError>(())
        })
        .await
    }
}

/// Removes addons in reverse installation order.
///
/// Every addon is attempted; the first failure is returned afterwards.
#[derive(Debug)]
pub struct RemoveAddonsStage {
    runner: Arc<dyn CommandRunner>,
    addons: Vec<Addon>,
}

impl RemoveAddonsStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, addons: Vec<Addon>) -> Self {
        Self { runner, addons }
    }
}

#[async_trait]
impl Stage for RemoveAddonsStage {
    fn name(&self) -> &str {
        "remove_addons"
    }

    async fn execute(&self, ctx: &mut E2eContext) -> E2eResult<()> {
        if !ctx.config().install_addons {
            return Ok(());
        }
        let Some(cluster) = ctx.cluster_handle() else {
            debug!("No cluster recorded, skipping addon removal");
            return Ok(());
        };

        let mut first_error = None;
        for addon in self.addons.iter().rev() {
            if let Err(e) = addon.uninstall(self.runner.as_ref(), cluster).await {
                warn!(addon = %addon.name, error = %e, "Addon removal failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Deletes the namespace recorded in the context.
#[derive(Debug)]
pub struct DeleteNamespaceStage {
    provider: Arc<dyn EnvironmentProvider>,
}

impl DeleteNamespaceStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(provider: Arc<dyn EnvironmentProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Stage for DeleteNamespaceStage {
    fn name(&self) -> &str {
        "delete_namespace"
    }

    async fn execute(&self, ctx: &mut E2eContext) -> E2eResult<()> {
        match (ctx.cluster_handle(), ctx.namespace()) {
            (Some(cluster), Some(namespace)) => {
                self.provider.delete_namespace(cluster, namespace).await
            }
            _ => {
                debug!("No namespace recorded, skipping");
                Ok(())
            }
        }
    }
}

/// Destroys the cluster recorded in the context.
///
/// A cluster that setup never recorded is left alone.
#[derive(Debug)]
pub struct DestroyClusterStage {
    provider: Arc<dyn EnvironmentProvider>,
}

impl DestroyClusterStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(provider: Arc<dyn EnvironmentProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Stage for DestroyClusterStage {
    fn name(&self) -> &str {
        "destroy_cluster"
    }

    async fn execute(&self, ctx: &mut E2eContext) -> E2eResult<()> {
        match ctx.cluster_handle() {
            Some(cluster) => self.provider.destroy_cluster(cluster).await,
            None => {
                debug!("No cluster recorded, skipping");
                Ok(())
            }
        }
    }
}
