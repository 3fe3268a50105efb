//! Cluster addons installed from released manifests.

use super::{ClusterHandle, KUBECTL};
use crate::command::{CommandRunner, ExternalCommand};
use crate::errors::E2eResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

const PROMETHEUS_OPERATOR_VERSION: &str = "v0.72.0";
const CERT_MANAGER_VERSION: &str = "v1.14.4";

/// How a manifest is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestVerb {
    /// `kubectl create -f`
    Create,
    /// `kubectl apply -f`
    Apply,
}

impl ManifestVerb {
    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Apply => "apply",
        }
    }
}

/// Deployment that must become available after an addon is installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddonWait {
    /// Deployment name.
    pub deployment: String,
    /// Namespace of the deployment.
    pub namespace: String,
    /// Passed to `kubectl wait --timeout`.
    pub timeout: Duration,
}

/// A third-party component the system under test relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addon {
    /// Display name.
    pub name: String,
    /// Released version.
    pub version: String,
    /// Manifest bundle URL.
    pub manifest_url: String,
    /// Verb used to install the bundle.
    pub verb: ManifestVerb,
    /// Readiness wait after installation.
    pub wait: Option<AddonWait>,
}

impl Addon {
    /// The Prometheus operator bundle.
    #[must_use]
    pub fn prometheus_operator() -> Self {
        Self {
            name: "prometheus-operator".to_string(),
            version: PROMETHEUS_OPERATOR_VERSION.to_string(),
            manifest_url: format!(
                "https://github.com/prometheus-operator/prometheus-operator/releases/download/{PROMETHEUS_OPERATOR_VERSION}/bundle.yaml"
            ),
            verb: ManifestVerb::Create,
            wait: None,
        }
    }

    /// cert-manager, waited on until its webhook is available.
    #[must_use]
    pub fn cert_manager() -> Self {
        Self {
            name: "cert-manager".to_string(),
            version: CERT_MANAGER_VERSION.to_string(),
            manifest_url: format!(
                "https://github.com/jetstack/cert-manager/releases/download/{CERT_MANAGER_VERSION}/cert-manager.yaml"
            ),
            verb: ManifestVerb::Apply,
            wait: Some(AddonWait {
                deployment: "cert-manager-webhook".to_string(),
                namespace: "cert-manager".to_string(),
                timeout: Duration::from_secs(300),
            }),
        }
    }

    /// The default addon set, in installation order.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![Self::prometheus_operator(), Self::cert_manager()]
    }

    /// Installs the addon and waits for it when configured to.
    pub async fn install(&self, runner: &dyn CommandRunner, cluster: &ClusterHandle) -> E2eResult<()> {
        info!(addon = %self.name, version = %self.version, "Installing addon");
        runner
            .run(&kubectl(
                cluster,
                &[self.verb.as_str(), "-f", &self.manifest_url],
            ))
            .await?
            .check()?;

        if let Some(wait) = &self.wait {
            let target = format!("deployment.apps/{}", wait.deployment);
            let timeout = format!("{}s", wait.timeout.as_secs());
            runner
                .run(
                    &kubectl(
                        cluster,
                        &[
                            "wait",
                            &target,
                            "--for",
                            "condition=Available",
                            "--namespace",
                            &wait.namespace,
                            "--timeout",
                            &timeout,
                        ],
                    )
                    .with_timeout(wait.timeout + Duration::from_secs(30)),
                )
                .await?
                .check()?;
        }
        Ok(())
    }

    /// Removes everything the manifest created.
    pub async fn uninstall(&self, runner: &dyn CommandRunner, cluster: &ClusterHandle) -> E2eResult<()> {
        info!(addon = %self.name, "Removing addon");
        runner
            .run(&kubectl(
                cluster,
                &["delete", "--ignore-not-found=true", "-f", &self.manifest_url],
            ))
            .await?
            .check()?;
        Ok(())
    }
}

fn kubectl(cluster: &ClusterHandle, args: &[&str]) -> ExternalCommand {
    let mut full = vec!["--context", cluster.kube_context()];
    full.extend_from_slice(args);
    ExternalCommand::new(KUBECTL, full)
}
