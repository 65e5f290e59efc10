//! Polling waiters that block until resources are ready or a timeout elapses.
use std::{fmt, fmt::Debug, time::Duration};

use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::{app::App, readiness::Readiness, Cluster, Error};

/// Default delay between two polls of the API server.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Error context for a wait that timed out.
#[derive(Debug, Clone)]
pub struct WaitError {
    /// Resources waited on, e.g. `Deployment observability-operator in namespace monitoring`.
    pub resource: String,
    /// Last observed state of the resources that were not ready.
    pub last_state: String,
    /// How long we waited before giving up.
    pub elapsed: Duration,
    /// The configured timeout.
    pub timeout: Duration,
}

impl WaitError {
    /// Create a new WaitError
    pub fn new(resource: impl Into<String>, timeout: Duration, elapsed: Duration) -> Self {
        Self {
            resource: resource.into(),
            last_state: "not observed".to_owned(),
            elapsed,
            timeout,
        }
    }

    /// Set the last observed state
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.last_state = state.into();
        self
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timed out waiting for {} after {:?} (timeout {:?}), last state: {}",
            self.resource, self.elapsed, self.timeout, self.last_state
        )
    }
}

impl std::error::Error for WaitError {}

/// Poll `names` through `api` until all of them are ready.
///
/// Missing objects count as not ready yet. Returns the ready objects in the
/// order of `names`.
pub async fn wait_for_ready<K>(
    api: &Api<K>,
    names: &[&str],
    timeout: Duration,
    interval: Duration,
) -> Result<Vec<K>, Error>
where
    K: Resource + Readiness + Clone + DeserializeOwned + Debug,
    <K as Resource>::DynamicType: Default,
{
    let kind = K::kind(&K::DynamicType::default()).into_owned();
    let start = Instant::now();
    let mut last_state = String::from("not observed");

    let polled = tokio::time::timeout(timeout, async {
        loop {
            let mut ready = Vec::with_capacity(names.len());
            let mut pending = Vec::new();
            for name in names {
                match api.get_opt(name).await? {
                    Some(obj) if obj.is_ready() => ready.push(obj),
                    Some(obj) => pending.push(format!("{name}: {}", obj.state_description())),
                    None => pending.push(format!("{name}: missing")),
                }
            }
            if pending.is_empty() {
                return Ok::<_, kube::Error>(ready);
            }
            last_state = pending.join(", ");
            debug!(%kind, state = %last_state, "not ready yet");
            sleep(interval).await;
        }
    })
    .await;

    match polled {
        Ok(ready) => Ok(ready?),
        Err(_) => Err(WaitError::new(
            format!("{kind} {}", names.join(", ")),
            timeout,
            start.elapsed(),
        )
        .with_state(last_state)
        .into()),
    }
}

/// Wait until every named deployment in `ns` has all replicas ready.
#[tracing::instrument(skip(cluster))]
pub async fn wait_for_deployments_to_run(
    cluster: &Cluster,
    names: &[&str],
    ns: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<Vec<Deployment>, Error> {
    let deployments: Api<Deployment> = Api::namespaced(cluster.client(), ns);
    let ready = wait_for_ready(&deployments, names, timeout, interval)
        .await
        .map_err(|err| in_namespace(err, ns))?;
    info!("deployments ready");
    Ok(ready)
}

/// Wait until every named app in `ns` reports a deployed release.
#[tracing::instrument(skip(cluster))]
pub async fn wait_for_apps_to_run(
    cluster: &Cluster,
    names: &[&str],
    ns: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<Vec<App>, Error> {
    let apps: Api<App> = Api::namespaced(cluster.client(), ns);
    let deployed = wait_for_ready(&apps, names, timeout, interval)
        .await
        .map_err(|err| in_namespace(err, ns))?;
    info!("apps deployed");
    Ok(deployed)
}

fn in_namespace(err: Error, ns: &str) -> Error {
    match err {
        Error::Wait(wait) => Error::Wait(WaitError {
            resource: format!("{} in namespace {ns}", wait.resource),
            ..wait
        }),
        other => other,
    }
}
