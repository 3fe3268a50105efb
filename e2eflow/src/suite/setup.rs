//! Setup stages.

use super::make_command;
use crate::command::CommandRunner;
use crate::context::E2eContext;
use crate::errors::{E2eError, E2eResult};
use crate::provider::{Addon, EnvironmentProvider};
use crate::stages::Stage;
use crate::wait::{wait_for, Condition};
use crate::workdir::with_directory_async;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Make targets that generate and install the operator's resources.
const PREPARE_TARGETS: [&str; 4] = ["kustomize", "controller-gen", "manifests", "install"];

/// Provisions the cluster named by `config.cluster_name`.
#[derive(Debug)]
pub struct CreateClusterStage {
    provider: Arc<dyn EnvironmentProvider>,
}

impl CreateClusterStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(provider: Arc<dyn EnvironmentProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Stage for CreateClusterStage {
    fn name(&self) -> &str {
        "create_cluster"
    }

    async fn execute(&self, ctx: &mut E2eContext) -> E2eResult<()> {
        let name = ctx.config().cluster_name.clone();
        let handle = self.provider.create_cluster(&name).await?;
        ctx.set_cluster(handle);
        Ok(())
    }
}

/// Creates the namespace isolating the system under test.
#[derive(Debug)]
pub struct CreateNamespaceStage {
    provider: Arc<dyn EnvironmentProvider>,
}

impl CreateNamespaceStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(provider: Arc<dyn EnvironmentProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Stage for CreateNamespaceStage {
    fn name(&self) -> &str {
        "create_namespace"
    }

    async fn execute(&self, ctx: &mut E2eContext) -> E2eResult<()> {
        let cluster = ctx.cluster()?.clone();
        let namespace = ctx.config().namespace.clone();
        self.provider.create_namespace(&cluster, &namespace).await?;
        ctx.set_namespace(namespace);
        Ok(())
    }
}

/// Generates manifests, installs CRDs, builds the controller image and loads
/// it into the cluster.
///
/// The make targets run inside the project directory.
#[derive(Debug)]
pub struct PrepareResourcesStage {
    provider: Arc<dyn EnvironmentProvider>,
    runner: Arc<dyn CommandRunner>,
}

impl PrepareResourcesStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(provider: Arc<dyn EnvironmentProvider>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { provider, runner }
    }
}

#[async_trait]
impl Stage for PrepareResourcesStage {
    fn name(&self) -> &str {
        "prepare_resources"
    }

    async fn execute(&self, ctx: &mut E2eContext) -> E2eResult<()> {
        let cluster = ctx.cluster()?.clone();
        let artifact = ctx.config().artifact_ref.clone();
        let runner = self.runner.as_ref();

        with_directory_async(ctx.project_dir(), || async {
            for target in PREPARE_TARGETS {
                runner.run(&make_command(&cluster, &[target])).await?.check()?;
            }
            info!(artifact = %artifact, "Building controller image");
            let image = format!("IMG={artifact}");
            let build = make_command(&cluster, &["docker-build", &image]);
            runner.run(&build).await?.check()?;
            Ok::<(), E2eError>(())
        })
        .await?;

        self.provider.load_artifact(&cluster, &artifact).await?;
        ctx.record_artifact(artifact);
        Ok(())
    }
}

/// Installs the addons the operator depends on.
///
/// Addon failures are logged and recorded as context annotations; they never
/// fail setup.
#[derive(Debug)]
pub struct InstallAddonsStage {
    runner: Arc<dyn CommandRunner>,
    addons: Vec<Addon>,
}

impl InstallAddonsStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, addons: Vec<Addon>) -> Self {
        Self { runner, addons }
    }
}

#[async_trait]
impl Stage for InstallAddonsStage {
    fn name(&self) -> &str {
        "install_addons"
    }

    async fn execute(&self, ctx: &mut E2eContext) -> E2eResult<()> {
        if !ctx.config().install_addons {
            info!("Addon installation disabled");
            return Ok(());
        }
        let cluster = ctx.cluster()?.clone();

        for addon in &self.addons {
            let status = match addon.install(self.runner.as_ref(), &cluster).await {
                Ok(()) => "installed".to_string(),
                Err(e) => {
                    warn!(addon = %addon.name, error = %e, "Addon installation failed, continuing");
                    format!("failed: {e}")
                }
            };
            ctx.annotate(format!("addon.{}", addon.name), status);
        }
        Ok(())
    }
}

/// Deploys the controller and waits for its deployment to become available.
#[derive(Debug)]
pub struct DeployControllerStage {
    provider: Arc<dyn EnvironmentProvider>,
    runner: Arc<dyn CommandRunner>,
}

impl DeployControllerStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(provider: Arc<dyn EnvironmentProvider>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { provider, runner }
    }
}

#[async_trait]
impl Stage for DeployControllerStage {
    fn name(&self) -> &str {
        "deploy_controller"
    }

    async fn execute(&self, ctx: &mut E2eContext) -> E2eResult<()> {
        let cluster = ctx.cluster()?.clone();
        let config = ctx.config().clone();
        let namespace = ctx
            .namespace()
            .map_or_else(|| config.namespace.clone(), str::to_string);
        let runner = self.runner.as_ref();

        with_directory_async(ctx.project_dir(), || async {
            let image = format!("IMG={}", config.artifact_ref);
            let deploy = make_command(&cluster, &["deploy", &image]);
            runner.run(&deploy).await?.check()?;
            Ok::<(), E2eError>(())
        })
        .await?;

        let provider = self.provider.clone();
        let deployment = config.controller_deployment.clone();
        let description = format!("deployment {namespace}/{deployment} available");
        let condition = Condition::new(description, move || {
            let provider = provider.clone();
            let cluster = cluster.clone();
            let deployment = deployment.clone();
            let namespace = namespace.clone();
            async move {
                provider
                    .deployment_available(&cluster, &deployment, &namespace)
                    .await
            }
        })
        .with_timeout(config.ready_timeout())
        .with_interval(config.ready_interval());

        wait_for(&condition, ctx.cancellation()).await
    }
}
