use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::{core::ObjectMeta, Api};
use serde::Serialize;
use tracing::info;

use crate::{
    utils::{create_if_missing, Creation},
    Cluster, Error,
};

/// A secret that must exist before dependent apps are installed.
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretFixture {
    /// Name of the secret.
    pub name: String,
    /// Namespace of the secret.
    pub namespace: String,
    /// Secret type, i.e. `Opaque`.
    #[serde(rename = "type")]
    pub type_: String,
    /// Plain text data, stored base64 encoded by the API server.
    #[serde(skip)]
    pub string_data: BTreeMap<String, String>,
}

// Never print secret data.
impl std::fmt::Debug for SecretFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretFixture")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("type_", &self.type_)
            .field("keys", &self.string_data.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SecretFixture {
    /// An `Opaque` secret with the given plain text data.
    pub fn opaque(
        name: &str,
        namespace: &str,
        string_data: impl IntoIterator<Item = (&'static str, String)>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            namespace: namespace.to_owned(),
            type_: "Opaque".to_owned(),
            string_data: string_data
                .into_iter()
                .map(|(key, value)| (key.to_owned(), value))
                .collect(),
        }
    }

    fn to_secret(&self) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                ..ObjectMeta::default()
            },
            type_: Some(self.type_.clone()),
            string_data: Some(self.string_data.clone()),
            ..Default::default()
        }
    }
}

/// Create the secret unless it already exists.
///
/// Existing secrets are never updated, so re-running setup against a prepared
/// cluster is a no-op.
#[tracing::instrument(skip_all, fields(secret.name = %fixture.name, secret.namespace = %fixture.namespace))]
pub async fn ensure_secret(cluster: &Cluster, fixture: &SecretFixture) -> Result<Creation, Error> {
    let secrets: Api<Secret> = Api::namespaced(cluster.client(), &fixture.namespace);
    let creation = create_if_missing(&secrets, &fixture.to_secret()).await?;
    info!(?creation, "secret ensured");
    Ok(creation)
}
