//! The shared, mutable context threaded through every stage.

use super::RunIdentity;
use crate::cancellation::CancellationToken;
use crate::config::E2eConfig;
use crate::errors::{E2eError, E2eResult, ProvisioningError};
use crate::provider::ClusterHandle;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Handles and settings accumulated over one run.
///
/// Stages add or replace the handles they are responsible for. There is no
/// way to remove a handle: later stages and checks may rely on anything an
/// earlier stage recorded.
#[derive(Debug)]
pub struct E2eContext {
    identity: RunIdentity,
    config: Arc<E2eConfig>,
    cancel: Arc<CancellationToken>,
    origin_dir: PathBuf,
    cluster: Option<ClusterHandle>,
    namespace: Option<String>,
    artifacts: Vec<String>,
    annotations: BTreeMap<String, String>,
}

impl E2eContext {
    /// Creates a context rooted at the current working directory.
    ///
    /// The cancellation token honours `config.run_timeout()` when set.
    pub fn new(config: E2eConfig) -> E2eResult<Self> {
        let origin_dir = std::env::current_dir().map_err(|source| E2eError::Workdir {
            path: PathBuf::from("."),
            source,
        })?;
        let cancel = match config.run_timeout() {
            Some(timeout) => CancellationToken::with_timeout(timeout),
            None => CancellationToken::new(),
        };
        Ok(Self::with_parts(config, Arc::new(cancel), origin_dir))
    }

    /// Creates a context from explicit parts.
    #[must_use]
    pub fn with_parts(
        config: E2eConfig,
        cancel: Arc<CancellationToken>,
        origin_dir: PathBuf,
    ) -> Self {
        Self {
            identity: RunIdentity::new(),
            config: Arc::new(config),
            cancel,
            origin_dir,
            cluster: None,
            namespace: None,
            artifacts: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// Returns the run identity.
    #[must_use]
    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &E2eConfig {
        &self.config
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Directory the run started in.
    #[must_use]
    pub fn origin_dir(&self) -> &PathBuf {
        &self.origin_dir
    }

    /// The project directory holding the Makefile, resolved against the
    /// starting directory rather than whatever is current.
    #[must_use]
    pub fn project_dir(&self) -> PathBuf {
        self.origin_dir.join(&self.config.project_dir)
    }

    /// Records the provisioned cluster, replacing any earlier handle.
    pub fn set_cluster(&mut self, handle: ClusterHandle) {
        self.cluster = Some(handle);
    }

    /// Returns the cluster handle, if one was provisioned.
    #[must_use]
    pub fn cluster_handle(&self) -> Option<&ClusterHandle> {
        self.cluster.as_ref()
    }

    /// Returns the cluster handle or a provisioning error.
    pub fn cluster(&self) -> E2eResult<&ClusterHandle> {
        self.cluster.as_ref().ok_or_else(|| {
            ProvisioningError::new(
                "use cluster",
                &self.config.cluster_name,
                "no cluster has been provisioned by an earlier stage",
            )
            .into()
        })
    }

    /// Records the namespace isolating the system under test.
    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.namespace = Some(namespace.into());
    }

    /// Returns the namespace, if one was created.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Records an artifact loaded into the cluster.
    pub fn record_artifact(&mut self, artifact: impl Into<String>) {
        let artifact = artifact.into();
        if !self.artifacts.contains(&artifact) {
            self.artifacts.push(artifact);
        }
    }

    /// Artifacts loaded so far, in load order.
    #[must_use]
    pub fn artifacts(&self) -> &[String] {
        &self.artifacts
    }

    /// Adds or replaces a free-form handle.
    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.annotations.insert(key.into(), value.into());
    }

    /// Returns a free-form handle.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Returns true if the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
