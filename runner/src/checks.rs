//! Checks asserting the cluster and the operator deployment are healthy.
use std::{collections::BTreeMap, fmt, time::Duration};

use clap::ValueEnum;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, ResourceExt};
use olly_ats_harness::{labels, readiness::ReplicaCounts, Cluster};
use serde::Serialize;
use tracing::debug;

/// Minimum number of nodes a working cluster reports.
const MIN_NODES: usize = 1;

/// Labels selecting subsets of checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Marker {
    /// Quick checks run on every change.
    Smoke,
    /// Checks run after upgrading the operator.
    Upgrade,
}

/// A single acceptance check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Check {
    /// The API server answers and reports nodes.
    ApiWorking,
    /// The operator pods exist and every target deployment is fully ready.
    PodsAvailable,
}

impl Check {
    /// All checks in execution order.
    pub const ALL: [Check; 2] = [Check::ApiWorking, Check::PodsAvailable];

    pub fn name(&self) -> &'static str {
        match self {
            Check::ApiWorking => "api-working",
            Check::PodsAvailable => "pods-available",
        }
    }

    pub fn markers(&self) -> &'static [Marker] {
        match self {
            Check::ApiWorking | Check::PodsAvailable => &[Marker::Smoke, Marker::Upgrade],
        }
    }

    /// Flaky checks are rerun according to the scenario's rerun policy.
    pub fn is_flaky(&self) -> bool {
        matches!(self, Check::PodsAvailable)
    }

    /// Whether the check needs namespaces, secrets, apps and ready deployments first.
    pub fn needs_setup(&self) -> bool {
        matches!(self, Check::PodsAvailable)
    }

    /// Checks carrying `marker`, or every check without one.
    pub fn selected(marker: Option<Marker>) -> Vec<Check> {
        Check::ALL
            .into_iter()
            .filter(|check| marker.map_or(true, |marker| check.markers().contains(&marker)))
            .collect()
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How often a failed flaky check is retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RerunPolicy {
    /// Retries after the first failed attempt.
    pub reruns: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

impl RerunPolicy {
    /// Total number of attempts, including the first one.
    pub fn attempts(&self) -> u32 {
        self.reruns.saturating_add(1)
    }
}

/// An assertion about the cluster state that did not hold.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AssertionError {
    #[error("expected at least {expected} node(s), found {actual}")]
    NotEnoughNodes { actual: usize, expected: usize },
    #[error("no pods in namespace {namespace} match selector {selector}")]
    NoPods { namespace: String, selector: String },
    #[error("deployment {namespace}/{name} has {actual} ready replicas, expected {expected}")]
    ReplicasNotReady {
        name: String,
        namespace: String,
        actual: i32,
        expected: i32,
    },
}

/// Why a check failed.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("assertion failed: {0}")]
    Assertion(#[from] AssertionError),
    #[error(transparent)]
    Harness(#[from] olly_ats_harness::Error),
}

/// The API server answers and lists at least one node.
#[tracing::instrument(skip(cluster))]
pub async fn api_working(cluster: &Cluster) -> Result<(), CheckError> {
    let nodes = cluster.nodes().await?;
    debug!(nodes = nodes.len(), "listed nodes");
    if nodes.len() < MIN_NODES {
        return Err(AssertionError::NotEnoughNodes {
            actual: nodes.len(),
            expected: MIN_NODES,
        }
        .into());
    }
    Ok(())
}

/// Pods matching `selector` exist in `namespace` and every deployment has all
/// desired replicas ready.
///
/// The deployments are read again so the check sees their current state rather
/// than the state observed when setup finished.
#[tracing::instrument(skip(cluster, deployments))]
pub async fn pods_available(
    cluster: &Cluster,
    deployments: &[Deployment],
    namespace: &str,
    selector: &BTreeMap<String, String>,
) -> Result<(), CheckError> {
    let pods = cluster.pods(namespace, selector).await?;
    if pods.is_empty() {
        return Err(AssertionError::NoPods {
            namespace: namespace.to_owned(),
            selector: labels::selector(selector),
        }
        .into());
    }
    debug!(pods = pods.len(), "found pods");

    for deployment in deployments {
        let ns = deployment.namespace().unwrap_or_else(|| namespace.to_owned());
        let name = deployment.name_any();
        let api: Api<Deployment> = Api::namespaced(cluster.client(), &ns);
        let current = api
            .get(&name)
            .await
            .map_err(olly_ats_harness::Error::from)?;
        let counts = ReplicaCounts::of(&current);
        if !counts.all_ready() {
            return Err(AssertionError::ReplicasNotReady {
                name,
                namespace: ns,
                actual: counts.ready,
                expected: counts.desired,
            }
            .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::{
        apps::v1::{DeploymentSpec, DeploymentStatus},
        core::v1::{Node, Pod},
    };
    use kube::core::ObjectMeta;
    use olly_ats_harness::utils::test::{mock_client, timeout_after_1s};

    use super::*;
    use crate::fixtures::operator_selector;

    const DEPLOYMENT_PATH: &str =
        "/apis/apps/v1/namespaces/monitoring/deployments/observability-operator";
    const PODS_PATH: &str = "/api/v1/namespaces/monitoring/pods";

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some("monitoring".to_owned()),
            ..ObjectMeta::default()
        }
    }

    fn deployment(replicas: i32, ready: Option<i32>) -> Deployment {
        Deployment {
            metadata: meta("observability-operator"),
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: ready,
                ..Default::default()
            }),
        }
    }

    fn pod() -> Pod {
        Pod {
            metadata: meta("observability-operator-5c9f"),
            ..Default::default()
        }
    }

    #[test]
    fn every_check_runs_under_smoke_and_upgrade() {
        assert_eq!(Check::selected(None), Check::ALL);
        assert_eq!(Check::selected(Some(Marker::Smoke)), Check::ALL);
        assert_eq!(Check::selected(Some(Marker::Upgrade)), Check::ALL);
    }

    #[test]
    fn only_pod_availability_is_flaky() {
        assert!(!Check::ApiWorking.is_flaky());
        assert!(!Check::ApiWorking.needs_setup());
        assert!(Check::PodsAvailable.is_flaky());
        assert!(Check::PodsAvailable.needs_setup());
    }

    #[tokio::test]
    async fn api_working_with_nodes() {
        let (client, mut fakeserver) = mock_client();
        let mocksrv = tokio::spawn(async move {
            let node = Node {
                metadata: meta("kind-control-plane"),
                ..Default::default()
            };
            fakeserver.list("/api/v1/nodes", "NodeList", &[node]).await;
        });
        api_working(&Cluster::new(client)).await.expect("api works");
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn api_working_fails_without_nodes() {
        let (client, mut fakeserver) = mock_client();
        let mocksrv = tokio::spawn(async move {
            fakeserver
                .list::<Node>("/api/v1/nodes", "NodeList", &[])
                .await;
        });
        let err = api_working(&Cluster::new(client))
            .await
            .expect_err("no nodes");
        timeout_after_1s(mocksrv).await;
        assert!(matches!(
            err,
            CheckError::Assertion(AssertionError::NotEnoughNodes {
                actual: 0,
                expected: 1
            })
        ));
    }

    #[tokio::test]
    async fn pods_available_when_replicas_ready() {
        let (client, mut fakeserver) = mock_client();
        let mocksrv = tokio::spawn(async move {
            fakeserver.list(PODS_PATH, "PodList", &[pod()]).await;
            fakeserver
                .get(DEPLOYMENT_PATH, Some(&deployment(1, Some(1))))
                .await;
        });
        pods_available(
            &Cluster::new(client),
            &[deployment(1, Some(1))],
            "monitoring",
            &operator_selector(false),
        )
        .await
        .expect("pods available");
        timeout_after_1s(mocksrv).await;
    }

    #[tokio::test]
    async fn missing_pods_fail() {
        let (client, mut fakeserver) = mock_client();
        let mocksrv = tokio::spawn(async move {
            fakeserver.list::<Pod>(PODS_PATH, "PodList", &[]).await;
        });
        let err = pods_available(
            &Cluster::new(client),
            &[deployment(1, Some(1))],
            "monitoring",
            &operator_selector(false),
        )
        .await
        .expect_err("no pods");
        timeout_after_1s(mocksrv).await;
        assert_eq!(
            err.to_string(),
            "assertion failed: no pods in namespace monitoring match selector app.kubernetes.io/name=observability-operator"
        );
    }

    #[tokio::test]
    async fn degraded_deployment_reports_actual_and_expected() {
        let (client, mut fakeserver) = mock_client();
        let mocksrv = tokio::spawn(async move {
            fakeserver.list(PODS_PATH, "PodList", &[pod()]).await;
            fakeserver
                .get(DEPLOYMENT_PATH, Some(&deployment(2, Some(1))))
                .await;
        });
        let err = pods_available(
            &Cluster::new(client),
            &[deployment(2, Some(2))],
            "monitoring",
            &operator_selector(false),
        )
        .await
        .expect_err("degraded");
        timeout_after_1s(mocksrv).await;
        let CheckError::Assertion(assertion) = err else {
            panic!("expected an assertion failure, got {err:?}");
        };
        assert_eq!(
            assertion,
            AssertionError::ReplicasNotReady {
                name: "observability-operator".to_owned(),
                namespace: "monitoring".to_owned(),
                actual: 1,
                expected: 2,
            }
        );
        assert_eq!(
            assertion.to_string(),
            "deployment monitoring/observability-operator has 1 ready replicas, expected 2"
        );
    }
}
