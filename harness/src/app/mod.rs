//! App and Catalog are the app platform resources used to install charts.
//!
//! The CRDs are owned by app-operator; these types only cover the fields the
//! harness reads and writes.
pub mod factory;

pub use factory::{AppFactory, KubeAppFactory};
#[cfg(any(test, feature = "mock"))]
pub use factory::MockAppFactory;

use std::time::Duration;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Release status reported once app-operator installed the chart.
pub const DEPLOYED_STATUS: &str = "deployed";

/// Default time to wait for an installed app to be deployed.
pub const DEFAULT_APP_TIMEOUT: Duration = Duration::from_secs(60);

/// Request to install a chart from a catalog.
#[derive(CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "application.giantswarm.io",
    version = "v1alpha1",
    kind = "App",
    plural = "apps",
    status = "AppStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Name of the catalog holding the chart.
    pub catalog: String,
    /// Namespace of the catalog.
    pub catalog_namespace: String,
    /// Chart name.
    pub name: String,
    /// Namespace the chart is deployed into.
    pub namespace: String,
    /// Chart version.
    pub version: String,
    /// Cluster the chart is deployed to.
    pub kube_config: AppKubeConfig,
    /// Values supplied by the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_config: Option<AppUserConfig>,
}

/// Target cluster of an App.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppKubeConfig {
    /// Deploy into the cluster the App lives in.
    pub in_cluster: bool,
}

/// User supplied values of an App.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppUserConfig {
    /// ConfigMap holding the values under the `values` key.
    pub config_map: ConfigMapReference,
}

/// Reference to a ConfigMap in any namespace.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
pub struct ConfigMapReference {
    /// ConfigMap name.
    pub name: String,
    /// ConfigMap namespace.
    pub namespace: String,
}

/// Current status of an App as reported by app-operator.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    /// Version of the application in the chart.
    pub app_version: Option<String>,
    /// Chart version that is deployed.
    pub version: Option<String>,
    /// Helm release state.
    pub release: Option<AppRelease>,
}

/// Helm release state of an App.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppRelease {
    /// Release status, `deployed` once installed.
    pub status: Option<String>,
    /// Reason for the current status, set on failures.
    pub reason: Option<String>,
}

/// A chart repository apps can be installed from.
#[derive(CustomResource, Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "application.giantswarm.io",
    version = "v1alpha1",
    kind = "Catalog",
    plural = "catalogs",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSpec {
    /// Display title.
    pub title: String,
    /// Display description.
    pub description: String,
    /// Primary chart storage.
    pub storage: CatalogRepository,
    /// All repositories serving the catalog.
    pub repositories: Vec<CatalogRepository>,
    /// Logo shown for the catalog.
    #[serde(rename = "logoURL", skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

/// Location of a chart repository.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Clone, JsonSchema)]
pub struct CatalogRepository {
    /// Repository type, `helm` for chart repositories.
    #[serde(rename = "type")]
    pub type_: String,
    /// Repository URL.
    #[serde(rename = "URL")]
    pub url: String,
}

/// Everything needed to install one app through the app platform.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AppDescriptor {
    /// App and chart name.
    pub name: String,
    /// Chart version.
    pub version: String,
    /// Name of the catalog serving the chart.
    pub catalog_name: String,
    /// Namespace the catalog is created in.
    pub catalog_namespace: String,
    /// URL of the catalog's chart repository.
    pub catalog_url: String,
    /// Namespace the App resource is created in.
    pub namespace: String,
    /// Namespace the chart is deployed into.
    pub deployment_namespace: String,
    /// Values passed to the chart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_values: Option<serde_json::Value>,
    /// Time to wait for the app to be deployed.
    #[serde(with = "seconds")]
    pub timeout: Duration,
}

impl AppDescriptor {
    /// Describe an app installed from the chart repository at `catalog_url`.
    pub fn new(
        name: &str,
        version: &str,
        catalog_name: &str,
        catalog_namespace: &str,
        catalog_url: &str,
    ) -> Self {
        Self {
            name: name.to_owned(),
            version: version.to_owned(),
            catalog_name: catalog_name.to_owned(),
            catalog_namespace: catalog_namespace.to_owned(),
            catalog_url: catalog_url.to_owned(),
            namespace: "default".to_owned(),
            deployment_namespace: "default".to_owned(),
            config_values: None,
            timeout: DEFAULT_APP_TIMEOUT,
        }
    }

    /// Create the App resource in `namespace`.
    pub fn namespace(self, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            ..self
        }
    }

    /// Deploy the chart into `namespace`.
    pub fn deployment_namespace(self, namespace: &str) -> Self {
        Self {
            deployment_namespace: namespace.to_owned(),
            ..self
        }
    }

    /// Pass `values` to the chart.
    pub fn config_values(self, values: serde_json::Value) -> Self {
        Self {
            config_values: Some(values),
            ..self
        }
    }

    /// Wait up to `timeout` for the app to be deployed.
    pub fn timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    /// Name of the ConfigMap holding the user values.
    pub fn user_config_name(&self) -> String {
        format!("{}-testing-user-config", self.name)
    }
}

/// An installed app and the ConfigMap carrying its values.
#[derive(Debug, Clone)]
pub struct ConfiguredApp {
    /// The App as returned by the API server.
    pub app: App,
    /// The user values, when the app has any.
    pub config_map: Option<ConfigMap>,
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::{AppDescriptor, DEFAULT_APP_TIMEOUT};

    #[test]
    fn descriptor_defaults_to_default_namespaces() {
        let app = AppDescriptor::new(
            "cert-manager-app",
            "3.9.0",
            "giantswarm-catalog",
            "giantswarm",
            "https://giantswarm.github.io/giantswarm-catalog/",
        );
        assert_eq!(app.namespace, "default");
        assert_eq!(app.deployment_namespace, "default");
        assert_eq!(app.config_values, None);
        assert_eq!(app.timeout, DEFAULT_APP_TIMEOUT);
    }

    #[test]
    fn descriptor_serializes_timeout_in_seconds() {
        let app = AppDescriptor::new("grafana", "2.16.3", "c", "giantswarm", "https://c")
            .namespace("giantswarm")
            .deployment_namespace("monitoring")
            .config_values(json!({ "ingress": { "enabled": true } }))
            .timeout(Duration::from_secs(120));
        let value = serde_json::to_value(&app).expect("serialize");
        assert_eq!(value["timeout"], json!(120));
        assert_eq!(value["deploymentNamespace"], json!("monitoring"));
        assert_eq!(app.user_config_name(), "grafana-testing-user-config");
    }
}
