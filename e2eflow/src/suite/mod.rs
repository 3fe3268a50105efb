//! The operator end-to-end suite.
//!
//! Setup provisions a kind cluster, builds and installs the operator from the
//! project directory, installs the addons it depends on and waits for the
//! controller deployment. Teardown undoes all of it in reverse.

mod checks;
mod setup;
mod teardown;

pub use checks::CrdInstalledCheck;
pub use setup::{
    CreateClusterStage, CreateNamespaceStage, DeployControllerStage, InstallAddonsStage,
    PrepareResourcesStage,
};
pub use teardown::{
    DeleteNamespaceStage, DestroyClusterStage, RemoveAddonsStage, UninstallControllerStage,
};

use crate::checks::Check;
use crate::command::{CommandRunner, ExternalCommand};
use crate::context::E2eContext;
use crate::errors::E2eResult;
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::provider::{Addon, ClusterHandle, EnvironmentProvider, KUBECTL};
use std::sync::Arc;

/// Name of the suite pipeline.
pub const SUITE_NAME: &str = "etcd-operator-e2e";

/// Builds a `make` invocation whose kubectl calls address `cluster`.
///
/// The Makefile picks its kubectl up from `KUBECTL ?= kubectl`, so the
/// environment value pins every target to the cluster's context instead of
/// whatever context is current.
pub(crate) fn make_command(cluster: &ClusterHandle, args: &[&str]) -> ExternalCommand {
    ExternalCommand::new("make", args.iter().copied()).with_env(
        "KUBECTL",
        format!("{KUBECTL} --context {}", cluster.kube_context()),
    )
}

/// Collaborators shared by every stage of the suite.
#[derive(Debug, Clone)]
pub struct OperatorSuite {
    provider: Arc<dyn EnvironmentProvider>,
    runner: Arc<dyn CommandRunner>,
    addons: Vec<Addon>,
}

impl OperatorSuite {
    /// Creates the suite with the default addons.
    #[must_use]
    pub fn new(provider: Arc<dyn EnvironmentProvider>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            provider,
            runner,
            addons: Addon::defaults(),
        }
    }

    /// Replaces the addon set.
    #[must_use]
    pub fn with_addons(mut self, addons: Vec<Addon>) -> Self {
        self.addons = addons;
        self
    }

    /// Registers the suite's setup and teardown stages on `builder`.
    #[must_use]
    pub fn register(&self, builder: PipelineBuilder) -> PipelineBuilder {
        let builder = builder
            .setup(CreateClusterStage::new(self.provider.clone()))
            .setup(CreateNamespaceStage::new(self.provider.clone()))
            .setup(PrepareResourcesStage::new(
                self.provider.clone(),
                self.runner.clone(),
            ))
            .setup(InstallAddonsStage::new(
                self.runner.clone(),
                self.addons.clone(),
            ))
            .setup(DeployControllerStage::new(
                self.provider.clone(),
                self.runner.clone(),
            ));
        self.register_teardown(builder)
    }

    fn register_teardown(&self, builder: PipelineBuilder) -> PipelineBuilder {
        builder
            .teardown(UninstallControllerStage::new(self.runner.clone()))
            .teardown(RemoveAddonsStage::new(
                self.runner.clone(),
                self.addons.clone(),
            ))
            .teardown(DeleteNamespaceStage::new(self.provider.clone()))
            .teardown(DestroyClusterStage::new(self.provider.clone()))
    }

    /// Builds the full suite pipeline around `context`.
    pub fn pipeline(&self, context: E2eContext) -> E2eResult<Pipeline> {
        self.register(PipelineBuilder::new(SUITE_NAME)).build(context)
    }

    /// Builds a pipeline holding only the suite's teardown stages.
    pub fn teardown_pipeline(&self, context: E2eContext) -> E2eResult<Pipeline> {
        self.register_teardown(PipelineBuilder::new(SUITE_NAME))
            .build(context)
    }

    /// The suite's functional checks.
    #[must_use]
    pub fn checks(&self) -> Vec<Arc<dyn Check>> {
        vec![Arc::new(CrdInstalledCheck::new(self.provider.clone()))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_context, FakeProvider, ScriptedCommandRunner};

    #[test]
    fn test_stage_order() {
        let suite = OperatorSuite::new(
            Arc::new(FakeProvider::new()),
            Arc::new(ScriptedCommandRunner::new()),
        );
        let pipeline = suite.pipeline(test_context()).unwrap();
        let debug = format!("{pipeline:?}");

        let setup = [
            "create_cluster",
            "create_namespace",
            "prepare_resources",
            "install_addons",
            "deploy_controller",
        ];
        let mut last = 0;
        for name in setup {
            let pos = debug.find(name).unwrap();
            assert!(pos >= last, "{name} out of order");
            last = pos;
        }
        assert!(debug.find("destroy_cluster").unwrap() > debug.find("delete_namespace").unwrap());
    }

    #[test]
    fn test_make_command_pins_kube_context() {
        let command = make_command(&ClusterHandle::new("ci"), &["deploy", "IMG=op:dev"]);
        assert_eq!(command.line, "make deploy IMG=op:dev");
        assert_eq!(
            command.env,
            vec![("KUBECTL".to_string(), "kubectl --context kind-ci".to_string())]
        );
    }

    #[test]
    fn test_default_checks() {
        let suite = OperatorSuite::new(
            Arc::new(FakeProvider::new()),
            Arc::new(ScriptedCommandRunner::new()),
        );
        let checks = suite.checks();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].name(), "crd_installed");
    }
}
