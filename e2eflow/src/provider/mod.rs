//! Ephemeral environment providers.
//!
//! A provider creates and destroys a short-lived cluster, loads locally built
//! artifacts into it, manages namespaces inside it, and answers the readiness
//! queries that conditions poll.

mod addons;
mod kind;

pub use addons::{Addon, AddonWait, ManifestVerb};
pub use kind::KindProvider;

use crate::errors::E2eResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// The kubectl executable every cluster command goes through.
pub(crate) const KUBECTL: &str = "kubectl";

/// Opaque reference to a provisioned cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterHandle {
    name: String,
    kube_context: String,
}

impl ClusterHandle {
    /// Creates a handle using the kind naming convention for the context.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let kube_context = format!("kind-{name}");
        Self { name, kube_context }
    }

    /// Creates a handle with an explicit kubeconfig context.
    #[must_use]
    pub fn with_context(name: impl Into<String>, kube_context: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kube_context: kube_context.into(),
        }
    }

    /// The cluster name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The kubeconfig context addressing the cluster.
    #[must_use]
    pub fn kube_context(&self) -> &str {
        &self.kube_context
    }
}

/// Creates, queries and destroys ephemeral environments.
///
/// Teardown operations are idempotent: destroying a cluster that no longer
/// exists, or deleting an absent namespace, succeeds as a no-op.
#[async_trait]
pub trait EnvironmentProvider: Send + Sync + Debug {
    /// Provisions an isolated cluster.
    async fn create_cluster(&self, name: &str) -> E2eResult<ClusterHandle>;

    /// Releases every resource held by the cluster.
    async fn destroy_cluster(&self, cluster: &ClusterHandle) -> E2eResult<()>;

    /// Makes a locally built artifact available inside the cluster.
    async fn load_artifact(&self, cluster: &ClusterHandle, artifact: &str) -> E2eResult<()>;

    /// Creates a namespace inside the cluster.
    async fn create_namespace(&self, cluster: &ClusterHandle, name: &str) -> E2eResult<()>;

    /// Deletes a namespace; absent namespaces are not an error.
    async fn delete_namespace(&self, cluster: &ClusterHandle, name: &str) -> E2eResult<()>;

    /// Returns true once the deployment reports the `Available` condition.
    async fn deployment_available(
        &self,
        cluster: &ClusterHandle,
        name: &str,
        namespace: &str,
    ) -> E2eResult<bool>;

    /// Returns true if the named resource exists.
    async fn resource_exists(
        &self,
        cluster: &ClusterHandle,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> E2eResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_context_naming() {
        let handle = ClusterHandle::new("c1");
        assert_eq!(handle.name(), "c1");
        assert_eq!(handle.kube_context(), "kind-c1");
    }

    #[test]
    fn test_explicit_context() {
        let handle = ClusterHandle::with_context("c1", "ci");
        assert_eq!(handle.kube_context(), "ci");
    }
}
