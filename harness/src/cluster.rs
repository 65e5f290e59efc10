use std::{collections::BTreeMap, path::Path};

use k8s_openapi::api::core::v1::{Node, Pod};
use kube::{
    api::ListParams,
    config::{KubeConfigOptions, Kubeconfig},
    Api, Client, Config,
};
use tracing::debug;

use crate::{labels, Error};

/// Connection to the Kubernetes cluster under test.
///
/// The cluster outlives the test run; the handle only talks to it.
#[derive(Clone)]
pub struct Cluster {
    client: Client,
}

impl Cluster {
    /// Wrap an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using the default kubeconfig or the in-cluster service account.
    pub async fn try_default() -> Result<Self, Error> {
        Ok(Self::new(Client::try_default().await?))
    }

    /// Connect using the current context of the kubeconfig at `path`.
    pub async fn from_kubeconfig(path: impl AsRef<Path>) -> Result<Self, Error> {
        let kubeconfig = Kubeconfig::read_from(path)?;
        let config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        Ok(Self::new(Client::try_from(config)?))
    }

    /// The underlying kube client.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// List all nodes of the cluster.
    pub async fn nodes(&self) -> Result<Vec<Node>, Error> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        Ok(nodes.list(&ListParams::default()).await?.items)
    }

    /// List pods in `ns` matching every label in `selector`.
    pub async fn pods(
        &self,
        ns: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, Error> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), ns);
        let selector = labels::selector(selector);
        debug!(ns, selector, "listing pods");
        Ok(pods
            .list(&ListParams::default().labels(&selector))
            .await?
            .items)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::{Node, Pod};
    use kube::core::ObjectMeta;

    use super::Cluster;
    use crate::utils::test::{mock_client, timeout_after_1s};

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_owned()),
            ..ObjectMeta::default()
        }
    }

    #[tokio::test]
    async fn nodes_are_listed_cluster_wide() {
        let (client, mut fakeserver) = mock_client();
        let mocksrv = tokio::spawn(async move {
            let node = Node {
                metadata: meta("kind-control-plane"),
                ..Default::default()
            };
            fakeserver.list("/api/v1/nodes", "NodeList", &[node]).await;
        });
        let nodes = Cluster::new(client).nodes().await.expect("nodes");
        timeout_after_1s(mocksrv).await;
        assert_eq!(nodes.len(), 1);
        assert_eq!(
            nodes[0].metadata.name.as_deref(),
            Some("kind-control-plane")
        );
    }

    #[tokio::test]
    async fn pods_are_filtered_by_label_selector() {
        let (client, mut fakeserver) = mock_client();
        let mocksrv = tokio::spawn(async move {
            let pod = Pod {
                metadata: meta("observability-operator-7d9c"),
                ..Default::default()
            };
            let request = fakeserver
                .list("/api/v1/namespaces/monitoring/pods", "PodList", &[pod])
                .await;
            let query = request.query.expect("query");
            assert!(
                query.contains("labelSelector=app.kubernetes.io%2Fname%3Dobservability-operator"),
                "{query}"
            );
        });
        let selector = BTreeMap::from_iter([(
            "app.kubernetes.io/name".to_owned(),
            "observability-operator".to_owned(),
        )]);
        let pods = Cluster::new(client)
            .pods("monitoring", &selector)
            .await
            .expect("pods");
        timeout_after_1s(mocksrv).await;
        assert_eq!(pods.len(), 1);
    }
}
