//! End-to-end tests of the pipeline lifecycle.

use crate::checks::{Check, FnCheck};
use crate::command::CommandRunner;
use crate::config::E2eConfig;
use crate::errors::E2eError;
use crate::pipeline::{PipelineBuilder, PipelineState};
use crate::provider::{ClusterHandle, EnvironmentProvider};
use crate::report::RunOutcome;
use crate::stages::{FnStage, NoOpStage};
use crate::suite::OperatorSuite;
use crate::testing::{
    assert_check_failed, assert_check_passed, assert_teardown_failures, fast_config,
    test_context, test_context_with, ExecutionLog, FailingStage, FakeProvider, PanickingStage,
    RecordingStage, ScriptedCommandRunner,
};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn check(name: &str, pass: bool) -> Arc<dyn Check> {
    let name_owned = name.to_string();
    Arc::new(FnCheck::new(name, move |_ctx| {
        let name = name_owned.clone();
        Box::pin(async move {
            if pass {
                Ok(())
            } else {
                Err(E2eError::assertion(format!("{name} did not hold")))
            }
        })
    }))
}

#[tokio::test]
async fn test_successful_setup_reaches_ready_without_teardown() {
    let log = ExecutionLog::new();
    let mut pipeline = PipelineBuilder::new("p")
        .setup(RecordingStage::new("s1", &log).setting_cluster("first"))
        .setup(RecordingStage::new("s2", &log))
        .setup(RecordingStage::new("s3", &log).setting_cluster("last"))
        .teardown(RecordingStage::new("t1", &log))
        .build(test_context())
        .unwrap();

    pipeline.run_setup().await.unwrap();

    assert_eq!(pipeline.state(), PipelineState::Ready);
    assert_eq!(pipeline.context().cluster().unwrap().name(), "last");
    assert_eq!(log.entries(), vec!["s1", "s2", "s3"]);
    assert_eq!(log.count("t1"), 0);
}

#[tokio::test]
async fn test_setup_failure_stops_remaining_setup_but_not_teardown() {
    let log = ExecutionLog::new();
    let pipeline = PipelineBuilder::new("p")
        .setup(RecordingStage::new("s1", &log))
        .setup(RecordingStage::new("s2", &log))
        .setup(FailingStage::new("s3", "docker daemon not running", &log))
        .setup(RecordingStage::new("s4", &log))
        .setup(RecordingStage::new("s5", &log))
        .teardown(RecordingStage::new("t1", &log))
        .teardown(RecordingStage::new("t2", &log))
        .build(test_context())
        .unwrap();

    let report = pipeline.run(&[check("never", true)]).await;

    assert_eq!(log.entries(), vec!["s1", "s2", "s3", "t1", "t2"]);
    assert_eq!(report.outcome, RunOutcome::SetupFailed);
    assert_eq!(report.final_state, PipelineState::Destroyed);
    let failure = report.setup_failure.as_ref().unwrap();
    assert_eq!((failure.index, failure.stage.as_str()), (2, "s3"));
    assert!(report.checks.outcomes.is_empty());
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_teardown_failures_do_not_stop_later_stages() {
    let log = ExecutionLog::new();
    let mut pipeline = PipelineBuilder::new("p")
        .teardown(RecordingStage::new("t1", &log))
        .teardown(FailingStage::new("t2", "namespace stuck terminating", &log))
        .teardown(PanickingStage::new("t3", &log))
        .teardown(RecordingStage::new("t4", &log))
        .build(test_context())
        .unwrap();

    let diagnostics = pipeline.run_teardown().await.clone();

    assert_eq!(log.entries(), vec!["t1", "t2", "t3", "t4"]);
    assert_teardown_failures(&diagnostics, &["t2", "t3"]);
    assert_eq!(diagnostics.failures[1].error_type, "panic");
    assert_eq!(pipeline.state(), PipelineState::Destroyed);

    pipeline.run_teardown().await;
    assert_eq!(log.count("t1"), 1);
}

#[tokio::test]
async fn test_setup_never_reruns_completed_stages() {
    let log = ExecutionLog::new();
    let mut pipeline = PipelineBuilder::new("p")
        .setup(RecordingStage::new("s1", &log))
        .setup(FailingStage::new("s2", "boom", &log))
        .build(test_context())
        .unwrap();

    assert!(pipeline.run_setup().await.is_err());
    assert_eq!(pipeline.state(), PipelineState::FailedSetup);

    let err = pipeline.run_setup().await.unwrap_err();
    assert_eq!(err.kind(), "config");
    assert_eq!(log.entries(), vec!["s1", "s2"]);
}

#[tokio::test]
async fn test_checks_require_ready_state() {
    let mut pipeline = PipelineBuilder::new("p").build(test_context()).unwrap();
    let err = pipeline.run_checks(&[check("c", true)]).await.unwrap_err();
    assert_eq!(err.kind(), "config");
}

#[tokio::test]
async fn test_one_failing_check_fails_run_with_clean_teardown() {
    let log = ExecutionLog::new();
    let pipeline = PipelineBuilder::new("p")
        .setup(FnStage::new("seed", |ctx| {
            Box::pin(async move {
                ctx.set_cluster(ClusterHandle::new("c1"));
                ctx.set_namespace("ns1");
                Ok(())
            })
        }))
        .setup(NoOpStage::new("noop"))
        .teardown(RecordingStage::new("cleanup", &log))
        .build(test_context())
        .unwrap();

    let report = pipeline
        .run(&[check("first", true), check("second", false)])
        .await;

    assert_eq!(report.outcome, RunOutcome::ChecksFailed);
    assert_eq!(report.exit_code(), 1);
    assert_check_passed(&report.checks, "first");
    assert_check_failed(&report.checks, "second");
    assert!(report.teardown.is_empty());
    assert_eq!(log.count("cleanup"), 1);
}

#[tokio::test]
async fn test_teardown_failure_does_not_change_success() {
    let log = ExecutionLog::new();
    let pipeline = PipelineBuilder::new("p")
        .setup(NoOpStage::new("setup"))
        .teardown(FailingStage::new("cleanup", "already gone", &log))
        .build(test_context())
        .unwrap();

    let report = pipeline.run(&[check("ok", true)]).await;

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.teardown.len(), 1);
}

fn suite_config(project: &std::path::Path) -> E2eConfig {
    E2eConfig {
        project_dir: project.to_path_buf(),
        ..fast_config()
    }
}

fn ready_provider(config: &E2eConfig, unavailable_polls: usize) -> FakeProvider {
    FakeProvider::new()
        .with_local_image(&config.artifact_ref)
        .with_deployment(&config.namespace, &config.controller_deployment, unavailable_polls)
        .with_resource("crd", &config.crd_name)
}

fn suite(provider: &FakeProvider, runner: &Arc<ScriptedCommandRunner>) -> OperatorSuite {
    let provider: Arc<dyn EnvironmentProvider> = Arc::new(provider.clone());
    let runner: Arc<dyn CommandRunner> = runner.clone();
    OperatorSuite::new(provider, runner)
}

#[tokio::test]
#[serial]
async fn test_operator_suite_full_lifecycle() {
    let project = tempfile::tempdir().unwrap();
    let config = suite_config(project.path());
    let provider = ready_provider(&config, 1);
    let runner = Arc::new(ScriptedCommandRunner::new());
    let suite = suite(&provider, &runner);
    let before = std::env::current_dir().unwrap();

    let pipeline = suite.pipeline(test_context_with(config.clone())).unwrap();
    let report = pipeline.run(&suite.checks()).await;

    assert_eq!(report.outcome, RunOutcome::Success, "{}", report.summary());
    assert_check_passed(&report.checks, "crd_installed");
    assert!(report.teardown.is_empty());
    assert_eq!(std::env::current_dir().unwrap(), before);

    assert_eq!(
        runner.commands()[..5],
        [
            "make kustomize",
            "make controller-gen",
            "make manifests",
            "make install",
            "make docker-build IMG=etcd-operator-controller:current",
        ]
    );
    let install = runner.command("make install").unwrap();
    assert!(install
        .env
        .contains(&("KUBECTL".to_string(), "kubectl --context kind-etcd-cluster".to_string())));
    let deploy = runner.position("make deploy").unwrap();
    let cert_manager = runner.position("kubectl --context kind-etcd-cluster apply").unwrap();
    assert!(cert_manager < deploy);
    assert!(runner.position("make undeploy ignore-not-found=true").unwrap() > deploy);

    assert!(provider.clusters().is_empty());
    assert!(provider
        .calls()
        .contains(&"load_artifact(etcd-operator-controller:current)".to_string()));
}

#[tokio::test]
#[serial]
async fn test_operator_suite_build_failure_still_tears_down() {
    let project = tempfile::tempdir().unwrap();
    let config = suite_config(project.path());
    let provider = ready_provider(&config, 0);
    let runner = Arc::new(ScriptedCommandRunner::new().respond(
        "make docker-build",
        2,
        "Cannot connect to the Docker daemon",
    ));
    let suite = suite(&provider, &runner);

    let pipeline = suite.pipeline(test_context_with(config)).unwrap();
    let report = pipeline.run(&suite.checks()).await;

    assert_eq!(report.outcome, RunOutcome::SetupFailed);
    let failure = report.setup_failure.unwrap();
    assert_eq!(failure.stage, "prepare_resources");
    assert_eq!(failure.error_type, "command_execution");
    assert!(runner.position("make deploy").is_none());
    assert!(runner.position("make uninstall ignore-not-found=true").is_some());
    assert!(provider.clusters().is_empty());
    assert!(report.teardown.is_empty());
}

#[tokio::test]
#[serial]
async fn test_operator_suite_addon_failure_is_not_fatal() {
    let project = tempfile::tempdir().unwrap();
    let config = suite_config(project.path());
    let provider = ready_provider(&config, 0);
    let runner = Arc::new(ScriptedCommandRunner::new().respond(
        "kubectl --context kind-etcd-cluster create -f",
        1,
        "connection refused",
    ));
    let suite = suite(&provider, &runner);

    let pipeline = suite.pipeline(test_context_with(config)).unwrap();
    let report = pipeline.run(&suite.checks()).await;

    assert_eq!(report.outcome, RunOutcome::Success, "{}", report.summary());
}

#[tokio::test]
#[serial]
async fn test_operator_suite_existing_cluster_is_left_alone() {
    let project = tempfile::tempdir().unwrap();
    let config = suite_config(project.path());
    let provider = ready_provider(&config, 0).with_existing_cluster(&config.cluster_name);
    let runner = Arc::new(ScriptedCommandRunner::new());
    let suite = suite(&provider, &runner);

    let pipeline = suite.pipeline(test_context_with(config)).unwrap();
    let report = pipeline.run(&suite.checks()).await;

    assert_eq!(report.outcome, RunOutcome::SetupFailed);
    assert_eq!(report.setup_failure.unwrap().error_type, "provisioning");
    assert_eq!(provider.clusters(), vec!["etcd-cluster"]);
    assert!(!provider.calls().iter().any(|c| c.starts_with("destroy_cluster")));
    assert!(runner.commands().is_empty(), "{:?}", runner.commands());
}

#[tokio::test]
#[serial]
async fn test_cancellation_interrupts_readiness_wait() {
    let project = tempfile::tempdir().unwrap();
    let config = E2eConfig {
        ready_timeout_secs: 120,
        ready_interval_secs: 30,
        ..suite_config(project.path())
    };
    let provider = ready_provider(&config, usize::MAX);
    let runner = Arc::new(ScriptedCommandRunner::new());
    let suite = suite(&provider, &runner);

    let ctx = test_context_with(config);
    let token = ctx.cancellation().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel("interrupted by operator");
    });

    let start = Instant::now();
    let report = suite.pipeline(ctx).unwrap().run(&suite.checks()).await;

    assert!(start.elapsed() < Duration::from_secs(5));
    let failure = report.setup_failure.unwrap();
    assert_eq!(failure.stage, "deploy_controller");
    assert_eq!(failure.error_type, "cancelled");
    assert!(provider.clusters().is_empty());
}

#[tokio::test]
#[serial]
async fn test_readiness_timeout_reports_last_state() {
    let project = tempfile::tempdir().unwrap();
    let config = suite_config(project.path());
    let provider = ready_provider(&config, usize::MAX);
    let runner = Arc::new(ScriptedCommandRunner::new());
    let suite = suite(&provider, &runner);

    let report = suite
        .pipeline(test_context_with(config))
        .unwrap()
        .run(&suite.checks())
        .await;

    let failure = report.setup_failure.unwrap();
    assert_eq!(failure.error_type, "timeout");
    assert!(failure.error.contains("etcd-operator-controller-manager"));
}

#[tokio::test]
#[serial]
async fn test_teardown_pipeline_destroys_seeded_cluster() {
    let project = tempfile::tempdir().unwrap();
    let config = suite_config(project.path());
    let provider = FakeProvider::new().with_existing_cluster(&config.cluster_name);
    let runner = Arc::new(ScriptedCommandRunner::new());
    let suite = suite(&provider, &runner);

    let mut ctx = test_context_with(config.clone());
    ctx.set_cluster(ClusterHandle::new(&config.cluster_name));
    ctx.set_namespace(&config.namespace);
    let mut pipeline = suite.teardown_pipeline(ctx).unwrap();

    let diagnostics = pipeline.run_teardown().await;

    assert!(diagnostics.is_empty());
    assert!(provider.clusters().is_empty());
}
