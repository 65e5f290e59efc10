//! Scenarios bundle the apps, secrets and expectations of one acceptance run.
use std::{collections::BTreeMap, time::Duration};

use anyhow::Result;
use clap::{Args, ValueEnum};
use olly_ats_harness::{app::AppDescriptor, secret::SecretFixture, wait::DEFAULT_POLL_INTERVAL};
use serde::Serialize;

use crate::{checks::RerunPolicy, fixtures};

/// Deployment scenario to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Install cert-manager and the operator only.
    #[default]
    Operator,
    /// Install cert-manager, ingress-nginx and grafana with a TLS ingress before the operator.
    GrafanaIngress,
}

/// Everything a run installs and expects, derived from a scenario and chart version.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioPlan {
    pub scenario: Scenario,
    /// Namespaces created before anything else.
    pub namespaces: Vec<String>,
    /// Secrets created before the apps are installed.
    pub secrets: Vec<SecretFixture>,
    /// Apps installed in order.
    pub apps: Vec<AppDescriptor>,
    /// Deployments that must become ready.
    pub deployments: Vec<String>,
    pub deployment_namespace: String,
    /// Labels of the pods backing the deployments.
    pub pod_selector: BTreeMap<String, String>,
    pub deployment_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub reruns: u32,
    pub rerun_delay_secs: u64,
}

impl Scenario {
    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Operator => "operator",
            Scenario::GrafanaIngress => "grafana-ingress",
        }
    }

    /// Build the plan installing the operator at `chart_version`.
    pub fn plan(&self, chart_version: &str) -> ScenarioPlan {
        let poll_interval_ms = DEFAULT_POLL_INTERVAL.as_millis() as u64;
        let secrets = vec![
            fixtures::grafana_admin_secret(),
            fixtures::grafana_tls_secret(),
        ];
        match self {
            Scenario::Operator => ScenarioPlan {
                scenario: *self,
                namespaces: vec![fixtures::MONITORING_NAMESPACE.to_owned()],
                secrets,
                apps: vec![
                    fixtures::cert_manager("3.9.0"),
                    fixtures::observability_operator(chart_version),
                ],
                deployments: vec![fixtures::OPERATOR_NAME.to_owned()],
                deployment_namespace: fixtures::MONITORING_NAMESPACE.to_owned(),
                pod_selector: fixtures::operator_selector(true),
                deployment_timeout_secs: 300,
                poll_interval_ms,
                reruns: 0,
                rerun_delay_secs: 0,
            },
            Scenario::GrafanaIngress => ScenarioPlan {
                scenario: *self,
                namespaces: vec![fixtures::MONITORING_NAMESPACE.to_owned()],
                secrets,
                apps: vec![
                    fixtures::cert_manager("3.8.1"),
                    fixtures::ingress_nginx(),
                    fixtures::grafana(),
                    fixtures::observability_operator(chart_version),
                ],
                deployments: vec![fixtures::OPERATOR_NAME.to_owned()],
                deployment_namespace: fixtures::MONITORING_NAMESPACE.to_owned(),
                pod_selector: fixtures::operator_selector(false),
                deployment_timeout_secs: 560,
                poll_interval_ms,
                reruns: 5,
                rerun_delay_secs: 10,
            },
        }
    }
}

impl ScenarioPlan {
    pub fn deployment_timeout(&self) -> Duration {
        Duration::from_secs(self.deployment_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rerun_policy(&self) -> RerunPolicy {
        RerunPolicy {
            reruns: self.reruns,
            delay: Duration::from_secs(self.rerun_delay_secs),
        }
    }

    /// Apply the overrides given on the command line.
    pub fn with_overrides(self, overrides: &Overrides) -> Self {
        Self {
            deployment_timeout_secs: overrides
                .deployment_timeout_secs
                .unwrap_or(self.deployment_timeout_secs),
            poll_interval_ms: overrides.poll_interval_ms.unwrap_or(self.poll_interval_ms),
            reruns: overrides.reruns.unwrap_or(self.reruns),
            rerun_delay_secs: overrides.rerun_delay_secs.unwrap_or(self.rerun_delay_secs),
            ..self
        }
    }
}

/// Options selecting the scenario and the operator chart version.
#[derive(Args, Debug, Clone)]
pub struct ScenarioOpts {
    /// Deployment scenario to run.
    #[arg(long, value_enum, default_value_t, env = "ATS_SCENARIO")]
    pub scenario: Scenario,

    /// Chart version of the observability operator to install.
    #[arg(long, env = "ATS_CHART_VERSION")]
    pub chart_version: String,
}

/// Overrides of the scenario defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Seconds to wait for the deployments to become ready.
    #[arg(long, env = "ATS_DEPLOYMENT_TIMEOUT_SECS")]
    pub deployment_timeout_secs: Option<u64>,

    /// Milliseconds between two readiness polls.
    #[arg(long, env = "ATS_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Reruns of flaky checks after a failure.
    #[arg(long, env = "ATS_RERUNS")]
    pub reruns: Option<u32>,

    /// Seconds to wait before rerunning a failed flaky check.
    #[arg(long, env = "ATS_RERUN_DELAY_SECS")]
    pub rerun_delay_secs: Option<u64>,
}

/// Options to Plan command
#[derive(Args, Debug)]
pub struct Opts {
    #[command(flatten)]
    scenario: ScenarioOpts,

    #[command(flatten)]
    overrides: Overrides,
}

/// Print the plan of a scenario as YAML without touching the cluster.
#[tracing::instrument]
pub fn plan(opts: Opts) -> Result<()> {
    let plan = opts
        .scenario
        .scenario
        .plan(&opts.scenario.chart_version)
        .with_overrides(&opts.overrides);
    print!("{}", serde_yaml::to_string(&plan)?);
    Ok(())
}
