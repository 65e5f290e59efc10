use k8s_openapi::api::apps::v1::Deployment;

use crate::app::{App, DEPLOYED_STATUS};

/// Describes when a resource counts as running.
pub trait Readiness {
    /// Whether the resource reached its desired state.
    fn is_ready(&self) -> bool;
    /// Human readable description of the current state, used in timeout errors.
    fn state_description(&self) -> String;
}

/// Desired and ready replica counts of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaCounts {
    /// `spec.replicas`, which defaults to 1.
    pub desired: i32,
    /// `status.readyReplicas`, which is absent while nothing is ready.
    pub ready: i32,
}

impl ReplicaCounts {
    /// Read the counts from a deployment.
    pub fn of(deployment: &Deployment) -> Self {
        Self {
            desired: deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(1),
            ready: deployment
                .status
                .as_ref()
                .and_then(|status| status.ready_replicas)
                .unwrap_or_default(),
        }
    }

    /// Whether every desired replica is ready.
    pub fn all_ready(&self) -> bool {
        self.ready == self.desired
    }
}

// The deployment controller must have seen the latest spec, otherwise the
// replica counts describe an older rollout.
fn generation_observed(deployment: &Deployment) -> bool {
    let observed = deployment
        .status
        .as_ref()
        .and_then(|status| status.observed_generation);
    match (deployment.metadata.generation, observed) {
        (Some(generation), Some(observed)) => observed >= generation,
        (Some(_), None) => false,
        (None, _) => true,
    }
}

impl Readiness for Deployment {
    fn is_ready(&self) -> bool {
        generation_observed(self) && ReplicaCounts::of(self).all_ready()
    }

    fn state_description(&self) -> String {
        let counts = ReplicaCounts::of(self);
        if generation_observed(self) {
            format!("{}/{} ready", counts.ready, counts.desired)
        } else {
            format!(
                "{}/{} ready, generation not observed",
                counts.ready, counts.desired
            )
        }
    }
}

impl Readiness for App {
    fn is_ready(&self) -> bool {
        release_status(self).as_deref() == Some(DEPLOYED_STATUS)
    }

    fn state_description(&self) -> String {
        let release = self.status.as_ref().and_then(|status| status.release.as_ref());
        match (release_status(self), release.and_then(|r| r.reason.as_deref())) {
            (Some(status), Some(reason)) if !reason.is_empty() => {
                format!("release {status}: {reason}")
            }
            (Some(status), _) => format!("release {status}"),
            (None, _) => "no release status".to_owned(),
        }
    }
}

fn release_status(app: &App) -> Option<String> {
    app.status
        .as_ref()
        .and_then(|status| status.release.as_ref())
        .and_then(|release| release.status.as_ref())
        .map(|status| status.to_lowercase())
}
