//! Utils is shared functions for creating fixtures.

use std::fmt::Debug;

use kube::{
    api::{PatchParams, PostParams},
    Api, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::FIELD_MANAGER;

/// Outcome of creating an object that other runs may have created already.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creation {
    /// The object was created by this call.
    Created,
    /// An object with the same name was already present and left untouched.
    AlreadyPresent,
}

/// Post params that record the harness as the field manager.
pub fn post_params() -> PostParams {
    PostParams {
        field_manager: Some(FIELD_MANAGER.to_owned()),
        ..Default::default()
    }
}

/// Patch params that record the harness as the field manager.
pub fn patch_params() -> PatchParams {
    PatchParams {
        field_manager: Some(FIELD_MANAGER.to_owned()),
        ..Default::default()
    }
}

/// Create an object, treating a conflict with an existing object as success.
pub async fn create_or_keep<K>(api: &Api<K>, obj: &K) -> Result<Creation, kube::Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    match api.create(&post_params(), obj).await {
        Ok(_) => Ok(Creation::Created),
        Err(kube::Error::Api(err)) if err.code == 409 => {
            debug!(name = obj.name_any(), "already exists");
            Ok(Creation::AlreadyPresent)
        }
        Err(e) => Err(e),
    }
}

/// Create an object only when no object with its name exists yet.
///
/// Existing objects are never modified.
pub async fn create_if_missing<K>(api: &Api<K>, obj: &K) -> Result<Creation, kube::Error>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    if api.get_opt(&obj.name_any()).await?.is_some() {
        return Ok(Creation::AlreadyPresent);
    }
    // Another run may create it between the lookup and the create.
    create_or_keep(api, obj).await
}
