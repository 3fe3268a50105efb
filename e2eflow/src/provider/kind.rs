//! kind-backed environment provider.
//!
//! Clusters are kind clusters; namespaces and queries go through kubectl
//! addressing the cluster's `kind-<name>` context.

use super::{ClusterHandle, EnvironmentProvider, KUBECTL};
use crate::command::{CommandOutput, CommandRunner, ExternalCommand};
use crate::errors::{ArtifactLoadError, E2eError, E2eResult, ProvisioningError};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

const KIND: &str = "kind";

/// Provisions clusters with `kind` and manages them with `kubectl`.
#[derive(Debug, Clone)]
pub struct KindProvider {
    runner: Arc<dyn CommandRunner>,
}

impl KindProvider {
    /// Creates a provider using `kind` and `kubectl` from `PATH`.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn kind<I: IntoIterator<Item = S>, S: Into<String>>(&self, args: I) -> ExternalCommand {
        ExternalCommand::new(KIND, args)
    }

    fn kubectl(&self, cluster: &ClusterHandle, args: &[&str]) -> ExternalCommand {
        let mut full = vec!["--context", cluster.kube_context()];
        full.extend_from_slice(args);
        ExternalCommand::new(KUBECTL, full)
    }

    async fn cluster_exists(&self, name: &str) -> E2eResult<bool> {
        let output = self
            .runner
            .run(&self.kind(["get", "clusters"]))
            .await?
            .check()?;
        Ok(output.output.lines().any(|line| line.trim() == name))
    }
}

fn provisioning(operation: &str, target: &str, err: &E2eError) -> E2eError {
    ProvisioningError::new(operation, target, err.to_string()).into()
}

fn failed_output(operation: &str, target: &str, output: &CommandOutput) -> E2eError {
    ProvisioningError::new(
        operation,
        target,
        format!("exit code {}: {}", output.exit_code, output.output.trim()),
    )
    .into()
}

#[async_trait]
impl EnvironmentProvider for KindProvider {
    async fn create_cluster(&self, name: &str) -> E2eResult<ClusterHandle> {
        let exists = self
            .cluster_exists(name)
            .await
            .map_err(|e| provisioning("create cluster", name, &e))?;
        if exists {
            return Err(ProvisioningError::new(
                "create cluster",
                name,
                "a cluster with this name is still running",
            )
            .into());
        }

        info!(cluster = name, "Creating kind cluster");
        let output = self
            .runner
            .run(&self.kind(["create", "cluster", "--name", name]))
            .await
            .map_err(|e| provisioning("create cluster", name, &e))?;
        if !output.success() {
            return Err(failed_output("create cluster", name, &output));
        }
        Ok(ClusterHandle::new(name))
    }

    async fn destroy_cluster(&self, cluster: &ClusterHandle) -> E2eResult<()> {
        let name = cluster.name();
        let exists = self
            .cluster_exists(name)
            .await
            .map_err(|e| provisioning("destroy cluster", name, &e))?;
        if !exists {
            debug!(cluster = name, "Cluster already gone");
            return Ok(());
        }

        info!(cluster = name, "Deleting kind cluster");
        let output = self
            .runner
            .run(&self.kind(["delete", "cluster", "--name", name]))
            .await
            .map_err(|e| provisioning("destroy cluster", name, &e))?;
        if !output.success() {
            return Err(failed_output("destroy cluster", name, &output));
        }
        Ok(())
    }

    async fn load_artifact(&self, cluster: &ClusterHandle, artifact: &str) -> E2eResult<()> {
        info!(cluster = cluster.name(), artifact, "Loading image into cluster");
        let output = self
            .runner
            .run(&self.kind(["load", "docker-image", artifact, "--name", cluster.name()]))
            .await
            .map_err(|e| ArtifactLoadError::new(artifact, cluster.name(), e.to_string()))?;
        if !output.success() {
            return Err(
                ArtifactLoadError::new(artifact, cluster.name(), output.output.trim()).into(),
            );
        }
        Ok(())
    }

    async fn create_namespace(&self, cluster: &ClusterHandle, name: &str) -> E2eResult<()> {
        info!(cluster = cluster.name(), namespace = name, "Creating namespace");
        let output = self
            .runner
            .run(&self.kubectl(cluster, &["create", "namespace", name]))
            .await
            .map_err(|e| provisioning("create namespace", name, &e))?;
        if !output.success() {
            return Err(failed_output("create namespace", name, &output));
        }
        Ok(())
    }

    async fn delete_namespace(&self, cluster: &ClusterHandle, name: &str) -> E2eResult<()> {
        info!(cluster = cluster.name(), namespace = name, "Deleting namespace");
        let output = self
            .runner
            .run(&self.kubectl(
                cluster,
                &["delete", "namespace", name, "--ignore-not-found=true"],
            ))
            .await
            .map_err(|e| provisioning("delete namespace", name, &e))?;
        if !output.success() {
            return Err(failed_output("delete namespace", name, &output));
        }
        Ok(())
    }

    async fn deployment_available(
        &self,
        cluster: &ClusterHandle,
        name: &str,
        namespace: &str,
    ) -> E2eResult<bool> {
        let output = self
            .runner
            .run(&self.kubectl(
                cluster,
                &["get", "deployment", name, "-n", namespace, "-o", "json"],
            ))
            .await?
            .check()?;
        let deployment: Deployment = serde_json::from_str(&output.output)
            .map_err(|e| E2eError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        Ok(deployment.is_available())
    }

    async fn resource_exists(
        &self,
        cluster: &ClusterHandle,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> E2eResult<bool> {
        let mut args = vec!["get", kind, name, "--ignore-not-found=true", "-o", "name"];
        if let Some(ns) = namespace {
            args.extend_from_slice(&["-n", ns]);
        }
        let output = self
            .runner
            .run(&self.kubectl(cluster, &args))
            .await?
            .check()?;
        Ok(!output.output.trim().is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
struct Deployment {
    #[serde(default)]
    status: DeploymentStatus,
}

#[derive(Debug, Default, Deserialize)]
struct DeploymentStatus {
    #[serde(default)]
    conditions: Vec<DeploymentCondition>,
}

#[derive(Debug, Deserialize)]
struct DeploymentCondition {
    #[serde(rename = "type")]
    kind: String,
    status: String,
}

impl Deployment {
    fn is_available(&self) -> bool {
        self.status
            .conditions
            .iter()
            .any(|c| c.kind == "Available" && c.status == "True")
    }
}
