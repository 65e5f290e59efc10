use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{api::Patch, core::ObjectMeta, Api};
use serde_json::json;
use tracing::{debug, info};

use super::{
    App, AppDescriptor, AppKubeConfig, AppSpec, AppUserConfig, Catalog, CatalogRepository,
    CatalogSpec, ConfigMapReference, ConfiguredApp,
};
use crate::{
    labels::{app_labels, catalog_labels},
    utils::{create_or_keep, patch_params, post_params},
    wait::{wait_for_apps_to_run, DEFAULT_POLL_INTERVAL},
    Cluster, Error,
};

/// Installs apps described by an [`AppDescriptor`] and waits until they are deployed.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait AppFactory {
    /// Install the app, returning once its release is deployed.
    ///
    /// An App that already exists is reported as a conflict error.
    async fn install(&self, app: &AppDescriptor) -> Result<ConfiguredApp, Error>;
}

/// Installs apps through the app platform of a live cluster.
#[derive(Clone)]
pub struct KubeAppFactory {
    cluster: Cluster,
    poll_interval: Duration,
}

impl KubeAppFactory {
    /// Create a factory installing into `cluster`.
    pub fn new(cluster: Cluster) -> Self {
        Self {
            cluster,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Poll the App status every `interval` while waiting for deployment.
    pub fn with_poll_interval(self, interval: Duration) -> Self {
        Self {
            poll_interval: interval,
            ..self
        }
    }

    async fn ensure_catalog(&self, app: &AppDescriptor) -> Result<(), Error> {
        let catalogs: Api<Catalog> =
            Api::namespaced(self.cluster.client(), &app.catalog_namespace);
        let repository = CatalogRepository {
            type_: "helm".to_owned(),
            url: app.catalog_url.clone(),
        };
        let mut catalog = Catalog::new(
            &app.catalog_name,
            CatalogSpec {
                title: app.catalog_name.clone(),
                description: "Catalog for Apps created for testing purposes.".to_owned(),
                storage: repository.clone(),
                repositories: vec![repository],
                logo_url: None,
            },
        );
        catalog.metadata.namespace = Some(app.catalog_namespace.clone());
        catalog.metadata.labels = catalog_labels();
        // Several apps share a catalog.
        let creation = create_or_keep(&catalogs, &catalog).await?;
        debug!(catalog = %app.catalog_name, ?creation, "catalog ensured");
        Ok(())
    }

    async fn create_user_config(&self, app: &AppDescriptor) -> Result<Option<ConfigMap>, Error> {
        let Some(values) = &app.config_values else {
            return Ok(None);
        };
        let rendered = serde_yaml::to_string(values).map_err(|source| Error::Values {
            app: app.name.clone(),
            source,
        })?;
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(app.user_config_name()),
                namespace: Some(app.namespace.clone()),
                ..ObjectMeta::default()
            },
            data: Some(std::iter::once(("values".to_owned(), rendered.clone())).collect()),
            ..Default::default()
        };
        let config_maps: Api<ConfigMap> = Api::namespaced(self.cluster.client(), &app.namespace);
        match config_maps.create(&post_params(), &config_map).await {
            Ok(created) => Ok(Some(created)),
            // Left over from an earlier run; its values may be stale.
            Err(kube::Error::Api(err)) if err.code == 409 => {
                debug!(config_map = %app.user_config_name(), "user config exists, refreshing values");
                let patch = Patch::Merge(json!({ "data": { "values": rendered } }));
                let refreshed = config_maps
                    .patch(&app.user_config_name(), &patch_params(), &patch)
                    .await?;
                Ok(Some(refreshed))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn create_app(&self, app: &AppDescriptor, has_user_config: bool) -> Result<App, Error> {
        let mut resource = App::new(
            &app.name,
            AppSpec {
                catalog: app.catalog_name.clone(),
                catalog_namespace: app.catalog_namespace.clone(),
                name: app.name.clone(),
                namespace: app.deployment_namespace.clone(),
                version: app.version.clone(),
                kube_config: AppKubeConfig { in_cluster: true },
                user_config: has_user_config.then(|| AppUserConfig {
                    config_map: ConfigMapReference {
                        name: app.user_config_name(),
                        namespace: app.namespace.clone(),
                    },
                }),
            },
        );
        resource.metadata.namespace = Some(app.namespace.clone());
        resource.metadata.labels = app_labels(&app.name);
        let apps: Api<App> = Api::namespaced(self.cluster.client(), &app.namespace);
        Ok(apps.create(&post_params(), &resource).await?)
    }
}

#[async_trait]
impl AppFactory for KubeAppFactory {
    #[tracing::instrument(skip_all, fields(app.name = %app.name, app.version = %app.version))]
    async fn install(&self, app: &AppDescriptor) -> Result<ConfiguredApp, Error> {
        self.ensure_catalog(app).await?;
        let config_map = self.create_user_config(app).await?;
        let created = self.create_app(app, config_map.is_some()).await?;
        info!(namespace = %app.namespace, "app created, waiting for release");
        let mut deployed = wait_for_apps_to_run(
            &self.cluster,
            &[app.name.as_str()],
            &app.namespace,
            app.timeout,
            self.poll_interval,
        )
        .await?;
        Ok(ConfiguredApp {
            app: deployed.pop().unwrap_or(created),
            config_map,
        })
    }
}
