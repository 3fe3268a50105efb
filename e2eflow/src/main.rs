use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use e2eflow::cancellation::CancellationToken;
use e2eflow::command::{CommandRunner, SystemCommandRunner};
use e2eflow::config::E2eConfig;
use e2eflow::context::E2eContext;
use e2eflow::observability::{init_tracing, LogFormat};
use e2eflow::provider::{ClusterHandle, EnvironmentProvider, KindProvider};
use e2eflow::suite::OperatorSuite;

/// Ephemeral cluster lifecycle for the operator end-to-end suite.
#[derive(Parser)]
#[command(name = "e2eflow", version, about)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Container image to build and load
    #[arg(long)]
    artifact_ref: Option<String>,

    /// Name of the kind cluster
    #[arg(long)]
    cluster_name: Option<String>,

    /// Namespace of the system under test
    #[arg(long)]
    namespace: Option<String>,

    /// Directory holding the Makefile
    #[arg(long)]
    project_dir: Option<PathBuf>,

    /// Skip installing Prometheus operator and cert-manager
    #[arg(long)]
    skip_addons: bool,

    /// Log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log format: pretty or json
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up, run checks and tear down
    Run {
        /// Write the JSON run report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Set up the environment and leave it running
    Setup,
    /// Tear down an environment left by `setup`
    Teardown,
}

impl Cli {
    fn apply_overrides(&self, config: &mut E2eConfig) {
        if let Some(v) = &self.artifact_ref {
            config.artifact_ref.clone_from(v);
        }
        if let Some(v) = &self.cluster_name {
            config.cluster_name.clone_from(v);
        }
        if let Some(v) = &self.namespace {
            config.namespace.clone_from(v);
        }
        if let Some(v) = &self.project_dir {
            config.project_dir.clone_from(v);
        }
        if self.skip_addons {
            config.install_addons = false;
        }
        if let Some(v) = &self.log_level {
            config.log_level.clone_from(v);
        }
        if let Some(v) = &self.log_format {
            config.log_format.clone_from(v);
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = E2eConfig::load_with(cli.config.as_deref(), |config| cli.apply_overrides(config))
        .await
        .context("failed to load configuration")?;

    let format: LogFormat = config.log_format.parse()?;
    init_tracing(&config.log_level, format)?;

    let runner: Arc<dyn CommandRunner> =
        Arc::new(SystemCommandRunner::new(config.command_timeout()));
    let provider: Arc<dyn EnvironmentProvider> = Arc::new(KindProvider::new(runner.clone()));
    let suite = OperatorSuite::new(provider, runner);

    let ctx = E2eContext::new(config.clone())?;
    spawn_interrupt_handler(ctx.cancellation().clone());
    tracing::info!(run_id = %ctx.identity().run_id, cluster = %config.cluster_name, "e2eflow starting");

    match cli.command {
        Commands::Run { report: report_path } => {
            let pipeline = suite.pipeline(ctx)?;
            let report = pipeline.run(&suite.checks()).await;
            print!("{}", report.summary());

            if let Some(path) = report_path {
                let json = serde_json::to_string_pretty(&report.to_json())?;
                tokio::fs::write(&path, json)
                    .await
                    .with_context(|| format!("failed to write report to {}", path.display()))?;
            }
            Ok(exit_code(report.exit_code()))
        }
        Commands::Setup => {
            let mut pipeline = suite.pipeline(ctx)?;
            if let Err(e) = pipeline.run_setup().await {
                tracing::error!(error = %e, "Setup failed, tearing down");
                pipeline.run_teardown().await;
                return Ok(ExitCode::FAILURE);
            }
            println!(
                "environment ready: cluster '{}', namespace '{}'",
                config.cluster_name, config.namespace
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Teardown => {
            let mut ctx = ctx;
            ctx.set_cluster(ClusterHandle::new(&config.cluster_name));
            ctx.set_namespace(&config.namespace);
            let mut pipeline = suite.teardown_pipeline(ctx)?;
            let diagnostics = pipeline.run_teardown().await;
            for failure in &diagnostics.failures {
                eprintln!("teardown stage '{}' failed: {}", failure.stage, failure.error);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn spawn_interrupt_handler(cancel: Arc<CancellationToken>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling run");
            cancel.cancel("interrupted");
        }
    });
}

fn exit_code(code: i32) -> ExitCode {
    if code == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
