//! In-memory doubles for the command runner and environment provider.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::command::{CommandOutput, CommandRunner, ExternalCommand};
use crate::config::E2eConfig;
use crate::context::E2eContext;
use crate::errors::{
    ArtifactLoadError, CommandExecutionError, E2eError, E2eResult, ProvisioningError,
};
use crate::provider::{ClusterHandle, EnvironmentProvider};

/// Builds a context with default configuration rooted at the temp directory.
#[must_use]
pub fn test_context() -> E2eContext {
    test_context_with(E2eConfig::default())
}

/// Builds a context with the given configuration rooted at the temp directory.
#[must_use]
pub fn test_context_with(config: E2eConfig) -> E2eContext {
    E2eContext::with_parts(
        config,
        Arc::new(CancellationToken::new()),
        std::env::temp_dir(),
    )
}

/// Configuration with short readiness timings suitable for tests.
#[must_use]
pub fn fast_config() -> E2eConfig {
    E2eConfig {
        ready_timeout_secs: 2,
        ready_interval_secs: 1,
        project_dir: PathBuf::from("."),
        ..E2eConfig::default()
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Exit { code: i32, output: String },
    SpawnFailure,
}

/// A [`CommandRunner`] that records every command and replays scripted
/// outcomes.
///
/// Commands with no matching script succeed with empty output. Scripts match
/// on a command-line prefix; the most recently added match wins.
#[derive(Debug, Default)]
pub struct ScriptedCommandRunner {
    scripts: Mutex<Vec<(String, Scripted)>>,
    history: Mutex<Vec<ExternalCommand>>,
}

impl ScriptedCommandRunner {
    /// Creates a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts commands starting with `prefix` to exit with `code`.
    #[must_use]
    pub fn respond(self, prefix: impl Into<String>, code: i32, output: impl Into<String>) -> Self {
        self.scripts.lock().push((
            prefix.into(),
            Scripted::Exit {
                code,
                output: output.into(),
            },
        ));
        self
    }

    /// Scripts commands starting with `prefix` to fail to spawn.
    #[must_use]
    pub fn fail_spawn(self, prefix: impl Into<String>) -> Self {
        self.scripts.lock().push((prefix.into(), Scripted::SpawnFailure));
        self
    }

    /// Every command line run so far, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.history.lock().iter().map(|c| c.line.clone()).collect()
    }

    /// The first command starting with `prefix`, including its environment.
    #[must_use]
    pub fn command(&self, prefix: &str) -> Option<ExternalCommand> {
        self.history
            .lock()
            .iter()
            .find(|c| c.line.starts_with(prefix))
            .cloned()
    }

    /// Position of the first command starting with `prefix`.
    #[must_use]
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.history.lock().iter().position(|c| c.line.starts_with(prefix))
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(&self, command: &ExternalCommand) -> E2eResult<CommandOutput> {
        self.history.lock().push(command.clone());
        let scripted = self
            .scripts
            .lock()
            .iter()
            .rev()
            .find(|(prefix, _)| command.line.starts_with(prefix.as_str()))
            .map(|(_, s)| s.clone());

        match scripted {
            Some(Scripted::SpawnFailure) => Err(CommandExecutionError::spawn(
                &command.line,
                "No such file or directory (os error 2)",
            )
            .into()),
            Some(Scripted::Exit { code, output }) => Ok(CommandOutput {
                command: command.line.clone(),
                exit_code: code,
                output,
                duration: Duration::ZERO,
            }),
            None => Ok(CommandOutput {
                command: command.line.clone(),
                exit_code: 0,
                output: String::new(),
                duration: Duration::ZERO,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    clusters: HashSet<String>,
    namespaces: HashMap<String, BTreeSet<String>>,
    images: HashMap<String, Vec<String>>,
    local_images: HashSet<String>,
    deployments: HashMap<(String, String), usize>,
    resources: HashSet<(String, String)>,
    failures: HashMap<&'static str, String>,
    calls: Vec<String>,
}

/// An in-memory [`EnvironmentProvider`].
///
/// Clusters, namespaces and images live in memory. Deployments become
/// available after a configurable number of polls. Any operation can be
/// scripted to fail by its method name.
#[derive(Debug, Default, Clone)]
pub struct FakeProvider {
    state: Arc<Mutex<FakeState>>,
}

impl FakeProvider {
    /// Creates a provider where every local image is loadable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a locally built image; other images fail to load.
    #[must_use]
    pub fn with_local_image(self, image: impl Into<String>) -> Self {
        self.state.lock().local_images.insert(image.into());
        self
    }

    /// Pretends a cluster already exists.
    #[must_use]
    pub fn with_existing_cluster(self, name: impl Into<String>) -> Self {
        self.state.lock().clusters.insert(name.into());
        self
    }

    /// Makes `deployment` report available after `polls` unavailable polls.
    #[must_use]
    pub fn with_deployment(
        self,
        namespace: impl Into<String>,
        deployment: impl Into<String>,
        polls: usize,
    ) -> Self {
        self.state
            .lock()
            .deployments
            .insert((namespace.into(), deployment.into()), polls);
        self
    }

    /// Registers a resource for [`EnvironmentProvider::resource_exists`].
    #[must_use]
    pub fn with_resource(self, kind: impl Into<String>, name: impl Into<String>) -> Self {
        self.state.lock().resources.insert((kind.into(), name.into()));
        self
    }

    /// Makes the named operation fail with `reason`.
    #[must_use]
    pub fn failing(self, operation: &'static str, reason: impl Into<String>) -> Self {
        self.state.lock().failures.insert(operation, reason.into());
        self
    }

    /// Every operation called so far, formatted as `op(args)`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Names of clusters currently alive.
    #[must_use]
    pub fn clusters(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state.lock().clusters.iter().cloned().collect();
        names.sort();
        names
    }

    /// Namespaces alive in a cluster.
    #[must_use]
    pub fn namespaces(&self, cluster: &str) -> Vec<String> {
        self.state
            .lock()
            .namespaces
            .get(cluster)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Images loaded into a cluster.
    #[must_use]
    pub fn loaded_images(&self, cluster: &str) -> Vec<String> {
        self.state
            .lock()
            .images
            .get(cluster)
            .cloned()
            .unwrap_or_default()
    }

    fn enter(&self, operation: &'static str, args: &str) -> Option<String> {
        let mut state = self.state.lock();
        state.calls.push(format!("{operation}({args})"));
        state.failures.get(operation).cloned()
    }
}

#[async_trait]
impl EnvironmentProvider for FakeProvider {
    async fn create_cluster(&self, name: &str) -> E2eResult<ClusterHandle> {
        if let Some(reason) = self.enter("create_cluster", name) {
            return Err(ProvisioningError::new("create cluster", name, reason).into());
        }
        let mut state = self.state.lock();
        if !state.clusters.insert(name.to_string()) {
            return Err(ProvisioningError::new(
                "create cluster",
                name,
                "a cluster with this name is still running",
            )
            .into());
        }
        Ok(ClusterHandle::new(name))
    }

    async fn destroy_cluster(&self, cluster: &ClusterHandle) -> E2eResult<()> {
        if let Some(reason) = self.enter("destroy_cluster", cluster.name()) {
            return Err(ProvisioningError::new("destroy cluster", cluster.name(), reason).into());
        }
        let mut state = self.state.lock();
        state.clusters.remove(cluster.name());
        state.namespaces.remove(cluster.name());
        state.images.remove(cluster.name());
        Ok(())
    }

    async fn load_artifact(&self, cluster: &ClusterHandle, artifact: &str) -> E2eResult<()> {
        if let Some(reason) = self.enter("load_artifact", artifact) {
            return Err(ArtifactLoadError::new(artifact, cluster.name(), reason).into());
        }
        let mut state = self.state.lock();
        if !state.local_images.is_empty() && !state.local_images.contains(artifact) {
            return Err(ArtifactLoadError::new(
                artifact,
                cluster.name(),
                "image not present locally",
            )
            .into());
        }
        state
            .images
            .entry(cluster.name().to_string())
            .or_default()
            .push(artifact.to_string());
        Ok(())
    }

    async fn create_namespace(&self, cluster: &ClusterHandle, name: &str) -> E2eResult<()> {
        if let Some(reason) = self.enter("create_namespace", name) {
            return Err(ProvisioningError::new("create namespace", name, reason).into());
        }
        let mut state = self.state.lock();
        if !state.clusters.contains(cluster.name()) {
            return Err(ProvisioningError::new("create namespace", name, "no such cluster").into());
        }
        let created = state
            .namespaces
            .entry(cluster.name().to_string())
            .or_default()
            .insert(name.to_string());
        if !created {
            return Err(ProvisioningError::new("create namespace", name, "already exists").into());
        }
        Ok(())
    }

    async fn delete_namespace(&self, cluster: &ClusterHandle, name: &str) -> E2eResult<()> {
        if let Some(reason) = self.enter("delete_namespace", name) {
            return Err(ProvisioningError::new("delete namespace", name, reason).into());
        }
        if let Some(namespaces) = self.state.lock().namespaces.get_mut(cluster.name()) {
            namespaces.remove(name);
        }
        Ok(())
    }

    async fn deployment_available(
        &self,
        _cluster: &ClusterHandle,
        name: &str,
        namespace: &str,
    ) -> E2eResult<bool> {
        if let Some(reason) = self.enter("deployment_available", name) {
            return Err(E2eError::from(CommandExecutionError::non_zero(
                format!("kubectl get deployment {name}"),
                1,
                reason,
            )));
        }
        let mut state = self.state.lock();
        match state
            .deployments
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            Some(0) => Ok(true),
            Some(remaining) => {
                *remaining -= 1;
                Ok(false)
            }
            None => Err(CommandExecutionError::non_zero(
                format!("kubectl get deployment {name}"),
                1,
                format!("deployments.apps \"{name}\" not found"),
            )
            .into()),
        }
    }

    async fn resource_exists(
        &self,
        _cluster: &ClusterHandle,
        kind: &str,
        name: &str,
        _namespace: Option<&str>,
    ) -> E2eResult<bool> {
        if let Some(reason) = self.enter("resource_exists", name) {
            return Err(CommandExecutionError::non_zero(
                format!("kubectl get {kind} {name}"),
                1,
                reason,
            )
            .into());
        }
        Ok(self
            .state
            .lock()
            .resources
            .contains(&(kind.to_string(), name.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::run_line;

    #[tokio::test]
    async fn test_scripted_runner_records_and_replays() {
        let runner = ScriptedCommandRunner::new()
            .respond("make deploy", 2, "no rule")
            .fail_spawn("kind");

        let ok = run_line(&runner, "make install").await.unwrap();
        assert!(ok.success());
        let failed = run_line(&runner, "make deploy IMG=x").await.unwrap();
        assert_eq!(failed.exit_code, 2);
        assert!(run_line(&runner, "kind get clusters").await.is_err());

        assert_eq!(
            runner.commands(),
            vec!["make install", "make deploy IMG=x", "kind get clusters"]
        );
        assert_eq!(runner.position("make deploy"), Some(1));
    }

    #[tokio::test]
    async fn test_fake_provider_lifecycle() {
        let provider = FakeProvider::new();
        let cluster = provider.create_cluster("c1").await.unwrap();
        provider.create_namespace(&cluster, "ns").await.unwrap();
        assert_eq!(provider.namespaces("c1"), vec!["ns"]);

        assert!(provider.create_cluster("c1").await.is_err());

        provider.load_artifact(&cluster, "ctrl:dev").await.unwrap();
        assert_eq!(provider.loaded_images("c1"), vec!["ctrl:dev"]);

        provider.delete_namespace(&cluster, "ns").await.unwrap();
        provider.delete_namespace(&cluster, "ns").await.unwrap();
        provider.destroy_cluster(&cluster).await.unwrap();
        provider.destroy_cluster(&cluster).await.unwrap();
        assert!(provider.clusters().is_empty());
    }

    #[tokio::test]
    async fn test_fake_provider_rejects_unknown_image() {
        let provider = FakeProvider::new().with_local_image("ctrl:current");
        let cluster = provider.create_cluster("c1").await.unwrap();
        let err = provider.load_artifact(&cluster, "ctrl:typo").await.unwrap_err();
        assert_eq!(err.kind(), "artifact_load");
    }

    #[tokio::test]
    async fn test_fake_provider_deployment_polls() {
        let provider = FakeProvider::new().with_deployment("ns", "ctrl", 2);
        let cluster = ClusterHandle::new("c1");

        assert!(!provider.deployment_available(&cluster, "ctrl", "ns").await.unwrap());
        assert!(!provider.deployment_available(&cluster, "ctrl", "ns").await.unwrap());
        assert!(provider.deployment_available(&cluster, "ctrl", "ns").await.unwrap());
        assert!(provider.deployment_available(&cluster, "other", "ns").await.is_err());
    }

    #[tokio::test]
    async fn test_fake_provider_failure_injection() {
        let provider = FakeProvider::new().failing("destroy_cluster", "api server gone");
        let err = provider
            .destroy_cluster(&ClusterHandle::new("c1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "provisioning");
        assert_eq!(provider.calls(), vec!["destroy_cluster(c1)"]);
    }
}
