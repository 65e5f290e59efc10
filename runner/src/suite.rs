//! Fixture setup and check execution for one acceptance run.
use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Args;
use k8s_openapi::api::apps::v1::Deployment;
use olly_ats_harness::{
    app::{AppDescriptor, AppFactory, ConfiguredApp, KubeAppFactory},
    namespace::ensure_namespace_exists,
    secret::{ensure_secret, SecretFixture},
    utils::Creation,
    wait::wait_for_deployments_to_run,
    Cluster, Error,
};
use opentelemetry::{global, metrics::Counter, KeyValue};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    checks::{api_working, pods_available, Check, CheckError, Marker},
    scenario::{Overrides, ScenarioOpts, ScenarioPlan},
};

/// Options to Run command
#[derive(Args, Debug)]
pub struct Opts {
    #[command(flatten)]
    scenario: ScenarioOpts,

    /// Only run checks carrying this marker. Every check runs when unset.
    #[arg(long, value_enum, env = "ATS_MARKER")]
    marker: Option<Marker>,

    /// Path to the kubeconfig of the cluster under test.
    /// Defaults to the standard kubeconfig lookup or the in-cluster config.
    #[arg(long, env = "ATS_KUBE_CONFIG")]
    kube_config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

/// Create each namespace unless it already exists.
#[tracing::instrument(skip(cluster))]
pub async fn ensure_namespaces(cluster: &Cluster, names: &[String]) -> Result<Vec<Creation>, Error> {
    let mut created = Vec::with_capacity(names.len());
    for name in names {
        created.push(ensure_namespace_exists(cluster, name).await?);
    }
    Ok(created)
}

/// Create each secret unless it already exists, reporting what happened per secret.
#[tracing::instrument(skip_all)]
pub async fn ensure_secrets(
    cluster: &Cluster,
    fixtures: &[SecretFixture],
) -> Result<Vec<(String, Creation)>, Error> {
    let mut created = Vec::with_capacity(fixtures.len());
    for fixture in fixtures {
        let creation = ensure_secret(cluster, fixture).await?;
        created.push((fixture.name.clone(), creation));
    }
    Ok(created)
}

/// Install the apps in order.
///
/// Apps left behind by an earlier run make the install conflict; those are
/// logged and skipped. Any other error aborts the remaining installs.
#[tracing::instrument(skip_all)]
pub async fn install_apps<F>(factory: &F, apps: &[AppDescriptor]) -> Result<Vec<ConfiguredApp>, Error>
where
    F: AppFactory + Send + Sync,
{
    let mut installed = Vec::with_capacity(apps.len());
    for app in apps {
        match factory.install(app).await {
            Ok(configured) => {
                info!(app = %app.name, version = %app.version, "app installed");
                installed.push(configured);
            }
            Err(err) if err.is_conflict() => {
                warn!(app = %app.name, %err, "app already exists, skipping install");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(installed)
}

/// Wait until the named deployments have all replicas ready.
#[tracing::instrument(skip(cluster))]
pub async fn wait_for_deployments(
    cluster: &Cluster,
    names: &[String],
    namespace: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<Vec<Deployment>, Error> {
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    wait_for_deployments_to_run(cluster, &names, namespace, timeout, interval).await
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Passed => "passed",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// Outcome of a check and how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub check: Check,
    pub outcome: Outcome,
    pub attempts: u32,
}

/// Outcomes of all selected checks.
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub checks: Vec<CheckReport>,
}

impl SuiteReport {
    pub fn failed(&self) -> impl Iterator<Item = &CheckReport> {
        self.checks
            .iter()
            .filter(|report| report.outcome != Outcome::Passed)
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }
}

enum Setup {
    Pending,
    Ready(Vec<Deployment>),
    Failed(String),
}

/// Runs the selected checks of a scenario against a cluster.
///
/// Setup is shared by every check needing it and runs at most once, on first use.
pub struct Suite<F> {
    cluster: Cluster,
    factory: F,
    plan: ScenarioPlan,
    setup: Setup,
    checks_counter: Counter<u64>,
}

impl<F> Suite<F>
where
    F: AppFactory + Send + Sync,
{
    pub fn new(cluster: Cluster, factory: F, plan: ScenarioPlan) -> Self {
        let meter = global::meter("olly-ats");
        let checks_counter = meter
            .u64_counter("ats_checks")
            .with_description("Number of acceptance checks run, by outcome")
            .init();
        Self {
            cluster,
            factory,
            plan,
            setup: Setup::Pending,
            checks_counter,
        }
    }

    /// Namespaces, secrets, apps, then the wait for the deployments under test.
    async fn run_setup(&self) -> Result<Vec<Deployment>, Error> {
        let plan = &self.plan;
        let namespaces = ensure_namespaces(&self.cluster, &plan.namespaces).await?;
        let secrets = ensure_secrets(&self.cluster, &plan.secrets).await?;
        let installed: Vec<String> = install_apps(&self.factory, &plan.apps)
            .await?
            .into_iter()
            .filter_map(|configured| configured.app.metadata.name)
            .collect();
        info!(?namespaces, ?secrets, ?installed, "setup created fixtures");
        info!(deployments = ?plan.deployments, "waiting for deployments");
        let deployments = wait_for_deployments(
            &self.cluster,
            &plan.deployments,
            &plan.deployment_namespace,
            plan.deployment_timeout(),
            plan.poll_interval(),
        )
        .await?;
        info!("deployments are ready");
        Ok(deployments)
    }

    async fn deployments(&mut self) -> Result<Vec<Deployment>, String> {
        if matches!(self.setup, Setup::Pending) {
            self.setup = match self.run_setup().await {
                Ok(deployments) => Setup::Ready(deployments),
                Err(err) => {
                    error!(%err, "setup failed");
                    Setup::Failed(format!("setup failed: {err}"))
                }
            };
        }
        match &self.setup {
            Setup::Ready(deployments) => Ok(deployments.clone()),
            Setup::Failed(reason) => Err(reason.clone()),
            Setup::Pending => Err("setup did not run".to_owned()),
        }
    }

    async fn run_once(&self, check: Check, deployments: &[Deployment]) -> Result<(), CheckError> {
        match check {
            Check::ApiWorking => api_working(&self.cluster).await,
            Check::PodsAvailable => {
                pods_available(
                    &self.cluster,
                    deployments,
                    &self.plan.deployment_namespace,
                    &self.plan.pod_selector,
                )
                .await
            }
        }
    }

    /// Run `check`, rerunning flaky checks as the plan allows.
    #[tracing::instrument(skip(self, check), fields(check = %check))]
    pub async fn run_check(&mut self, check: Check) -> CheckReport {
        let deployments = if check.needs_setup() {
            match self.deployments().await {
                Ok(deployments) => deployments,
                Err(reason) => {
                    return CheckReport {
                        check,
                        outcome: Outcome::Failed(reason),
                        attempts: 0,
                    }
                }
            }
        } else {
            Vec::new()
        };

        let policy = self.plan.rerun_policy();
        let attempts = if check.is_flaky() {
            policy.attempts()
        } else {
            1
        };
        let mut attempt = 1;
        loop {
            match self.run_once(check, &deployments).await {
                Ok(()) => {
                    return CheckReport {
                        check,
                        outcome: Outcome::Passed,
                        attempts: attempt,
                    }
                }
                Err(err) if attempt < attempts => {
                    warn!(attempt, attempts, %err, delay = ?policy.delay, "check failed, rerunning");
                    sleep(policy.delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return CheckReport {
                        check,
                        outcome: Outcome::Failed(err.to_string()),
                        attempts: attempt,
                    }
                }
            }
        }
    }

    /// Run every check carrying `marker`, or all checks without a marker.
    pub async fn run(&mut self, marker: Option<Marker>) -> SuiteReport {
        let mut report = SuiteReport::default();
        for check in Check::selected(marker) {
            let result = self.run_check(check).await;
            match &result.outcome {
                Outcome::Passed => info!(check = %check, attempts = result.attempts, "check passed"),
                Outcome::Failed(reason) => {
                    error!(check = %check, attempts = result.attempts, %reason, "check failed")
                }
            }
            self.checks_counter.add(
                1,
                &[
                    KeyValue::new("check", check.name()),
                    KeyValue::new("outcome", result.outcome.label()),
                ],
            );
            report.checks.push(result);
        }
        report
    }
}

/// Run the selected checks of the scenario against the cluster.
#[tracing::instrument]
pub async fn run(opts: Opts) -> Result<SuiteReport> {
    let plan = opts
        .scenario
        .scenario
        .plan(&opts.scenario.chart_version)
        .with_overrides(&opts.overrides);
    let cluster = match &opts.kube_config {
        Some(path) => Cluster::from_kubeconfig(path).await?,
        None => Cluster::try_default().await?,
    };
    let factory = KubeAppFactory::new(cluster.clone()).with_poll_interval(plan.poll_interval());
    info!(scenario = opts.scenario.scenario.name(), chart_version = %opts.scenario.chart_version, "running acceptance checks");
    let mut suite = Suite::new(cluster, factory, plan);
    Ok(suite.run(opts.marker).await)
}
