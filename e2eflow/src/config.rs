//! Run configuration.
//!
//! [`E2eConfig`] carries every externally supplied knob of a run: which
//! artifact to load, the cluster and namespace identities, and the polling
//! parameters used by readiness conditions.
//!
//! Loading priority:
//! 1. CLI flags (applied by the binary)
//! 2. Environment variables (`E2E_CLUSTER_NAME=ci-cluster`)
//! 3. TOML file
//! 4. Defaults

use crate::errors::{E2eError, E2eResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Configuration for one orchestrated test run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    /// Built artifact (container image) to load into the cluster.
    pub artifact_ref: String,
    /// Provisioning identity of the ephemeral cluster.
    pub cluster_name: String,
    /// Namespace isolating the system under test.
    pub namespace: String,
    /// Ceiling for readiness waits, in seconds.
    pub ready_timeout_secs: u64,
    /// Poll period for readiness waits, in seconds.
    pub ready_interval_secs: u64,
    /// Maximum duration of a single external command, in seconds.
    pub command_timeout_secs: u64,
    /// Overall run deadline in seconds; zero disables it.
    pub run_timeout_secs: u64,
    /// Directory holding the Makefile, relative to the starting directory.
    pub project_dir: PathBuf,
    /// Deployment whose availability marks the controller as ready.
    pub controller_deployment: String,
    /// CRD that must exist once the controller is installed.
    pub crd_name: String,
    /// Whether to install the Prometheus operator and cert-manager.
    pub install_addons: bool,
    /// Log level filter (overridden by `RUST_LOG`).
    pub log_level: String,
    /// Log format: `pretty` or `json`.
    pub log_format: String,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            artifact_ref: "etcd-operator-controller:current".to_string(),
            cluster_name: "etcd-cluster".to_string(),
            namespace: "etcd-operator-system".to_string(),
            ready_timeout_secs: 180,
            ready_interval_secs: 10,
            command_timeout_secs: 600,
            run_timeout_secs: 0,
            project_dir: PathBuf::from("../.."),
            controller_deployment: "etcd-operator-controller-manager".to_string(),
            crd_name: "etcdclusters.operator.etcd.io".to_string(),
            install_addons: true,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl E2eConfig {
    /// Loads configuration from an optional TOML file, then applies
    /// environment overrides and validates the result.
    pub async fn load(path: Option<&Path>) -> E2eResult<Self> {
        Self::load_with(path, |_| {}).await
    }

    /// Like [`E2eConfig::load`], with `overrides` applied after the
    /// environment and before validation.
    pub async fn load_with<F>(path: Option<&Path>, overrides: F) -> E2eResult<Self>
    where
        F: FnOnce(&mut Self),
    {
        let mut config = match path {
            Some(path) => Self::from_file(path).await?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file without env overrides.
    pub async fn from_file(path: impl AsRef<Path>) -> E2eResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                E2eError::config(format!("config file not found: {}", path.display()))
            } else {
                E2eError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn parse(toml_str: &str) -> E2eResult<Self> {
        toml::from_str(toml_str).map_err(|e| E2eError::config(e.to_string()))
    }

    /// Overrides fields from `E2E_{FIELD}` environment variables.
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.artifact_ref, "E2E_ARTIFACT_REF");
        override_string(&mut self.cluster_name, "E2E_CLUSTER_NAME");
        override_string(&mut self.namespace, "E2E_NAMESPACE");
        override_u64(&mut self.ready_timeout_secs, "E2E_READY_TIMEOUT_SECS");
        override_u64(&mut self.ready_interval_secs, "E2E_READY_INTERVAL_SECS");
        override_u64(&mut self.command_timeout_secs, "E2E_COMMAND_TIMEOUT_SECS");
        override_u64(&mut self.run_timeout_secs, "E2E_RUN_TIMEOUT_SECS");
        if let Ok(val) = std::env::var("E2E_PROJECT_DIR") {
            self.project_dir = PathBuf::from(val);
        }
        override_string(&mut self.controller_deployment, "E2E_CONTROLLER_DEPLOYMENT");
        override_string(&mut self.crd_name, "E2E_CRD_NAME");
        override_bool(&mut self.install_addons, "E2E_INSTALL_ADDONS");
        override_string(&mut self.log_level, "E2E_LOG_LEVEL");
        override_string(&mut self.log_format, "E2E_LOG_FORMAT");
    }

    /// Validates the configuration.
    pub fn validate(&self) -> E2eResult<()> {
        for (field, value) in [
            ("artifact_ref", &self.artifact_ref),
            ("cluster_name", &self.cluster_name),
            ("namespace", &self.namespace),
            ("controller_deployment", &self.controller_deployment),
        ] {
            if value.trim().is_empty() {
                return Err(E2eError::config(format!("{field} must not be empty")));
            }
        }
        if self.ready_interval_secs == 0 {
            return Err(E2eError::config("ready_interval_secs must be positive"));
        }
        if self.ready_interval_secs >= self.ready_timeout_secs {
            return Err(E2eError::config(format!(
                "ready_interval_secs ({}) must be less than ready_timeout_secs ({})",
                self.ready_interval_secs, self.ready_timeout_secs
            )));
        }
        if self.command_timeout_secs == 0 {
            return Err(E2eError::config("command_timeout_secs must be positive"));
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(E2eError::config(format!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                self.log_format
            )));
        }
        Ok(())
    }

    /// Readiness wait ceiling.
    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// Readiness poll period.
    #[must_use]
    pub fn ready_interval(&self) -> Duration {
        Duration::from_secs(self.ready_interval_secs)
    }

    /// Per-command time limit.
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Overall run deadline, if enabled.
    #[must_use]
    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }
}

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
