use k8s_openapi::api::core::v1::Namespace;
use kube::{core::ObjectMeta, Api};
use tracing::info;

use crate::{
    utils::{create_if_missing, Creation},
    Cluster, Error,
};

/// Make sure the namespace `name` exists, creating it when missing.
#[tracing::instrument(skip(cluster))]
pub async fn ensure_namespace_exists(cluster: &Cluster, name: &str) -> Result<Creation, Error> {
    let namespaces: Api<Namespace> = Api::all(cluster.client());
    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            ..ObjectMeta::default()
        },
        ..Default::default()
    };
    let creation = create_if_missing(&namespaces, &namespace).await?;
    info!(?creation, "namespace ensured");
    Ok(creation)
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::Namespace;
    use kube::core::ObjectMeta;
    use serde_json::json;

    use super::ensure_namespace_exists;
    use crate::{
        utils::{
            test::{mock_client, timeout_after_1s},
            Creation,
        },
        Cluster,
    };

    #[tokio::test]
    async fn missing_namespace_is_created() {
        let (client, mut fakeserver) = mock_client();
        let mocksrv = tokio::spawn(async move {
            fakeserver
                .get::<Namespace>("/api/v1/namespaces/monitoring", None)
                .await;
            let request = fakeserver.create("/api/v1/namespaces").await;
            assert_eq!(request.body["metadata"], json!({ "name": "monitoring" }));
            assert!(request
                .query
                .unwrap_or_default()
                .contains("fieldManager=olly-ats"));
        });
        let creation = ensure_namespace_exists(&Cluster::new(client), "monitoring")
            .await
            .expect("namespace");
        timeout_after_1s(mocksrv).await;
        assert_eq!(creation, Creation::Created);
    }

    #[tokio::test]
    async fn existing_namespace_is_left_alone() {
        let (client, mut fakeserver) = mock_client();
        let mocksrv = tokio::spawn(async move {
            let existing = Namespace {
                metadata: ObjectMeta {
                    name: Some("monitoring".to_owned()),
                    ..ObjectMeta::default()
                },
                ..Default::default()
            };
            fakeserver
                .get("/api/v1/namespaces/monitoring", Some(&existing))
                .await;
        });
        let creation = ensure_namespace_exists(&Cluster::new(client), "monitoring")
            .await
            .expect("namespace");
        timeout_after_1s(mocksrv).await;
        assert_eq!(creation, Creation::AlreadyPresent);
    }

    #[tokio::test]
    async fn namespace_created_concurrently_is_accepted() {
        let (client, mut fakeserver) = mock_client();
        let mocksrv = tokio::spawn(async move {
            fakeserver
                .get::<Namespace>("/api/v1/namespaces/monitoring", None)
                .await;
            fakeserver.conflict("/api/v1/namespaces").await;
        });
        let creation = ensure_namespace_exists(&Cluster::new(client), "monitoring")
            .await
            .expect("namespace");
        timeout_after_1s(mocksrv).await;
        assert_eq!(creation, Creation::AlreadyPresent);
    }
}
