use std::fmt;

use async_trait::async_trait;
use kube::api::{
    ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use crate::error::{AddonOperatorError, AddonOperatorResult};

/// Identity of a single object: its kind, namespace (absent for cluster-scoped kinds) and name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectKey {
    pub resource: ApiResource,
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(resource: ApiResource, namespace: &str, name: &str) -> Self {
        Self {
            resource,
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    pub fn cluster(resource: ApiResource, name: &str) -> Self {
        Self {
            resource,
            namespace: None,
            name: name.to_string(),
        }
    }

    /// Key of a typed object, read from its metadata.
    pub fn of<K>(object: &K) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self {
            resource: ApiResource::erase::<K>(&()),
            namespace: object.namespace(),
            name: object.name_any(),
        }
    }

    /// Key of an object that came back from a list call on `resource`.
    pub fn of_dynamic(resource: &ApiResource, object: &DynamicObject) -> Self {
        Self {
            resource: resource.clone(),
            namespace: object.namespace(),
            name: object.name_any(),
        }
    }

    /// The zero value for this key: identity and type information, nothing else.
    pub fn empty_object(&self) -> DynamicObject {
        let object = DynamicObject::new(&self.name, &self.resource);
        match &self.namespace {
            Some(namespace) => object.within(namespace),
            None => object,
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{} {}/{}", self.resource.kind, namespace, self.name),
            None => write!(f, "{} {}", self.resource.kind, self.name),
        }
    }
}

/// What a delete call observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The object existed and its deletion was accepted.
    Requested,
    /// The object was already absent.
    AlreadyGone,
}

impl DeleteOutcome {
    pub fn is_gone(self) -> bool {
        self == Self::AlreadyGone
    }
}

/// Generic access to the cluster object store.
///
/// Absence is a value on reads (`None`) and on deletes (`AlreadyGone`); every
/// other failure is an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> AddonOperatorResult<Option<DynamicObject>>;

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
    ) -> AddonOperatorResult<Vec<DynamicObject>>;

    async fn create(
        &self,
        key: &ObjectKey,
        object: &DynamicObject,
    ) -> AddonOperatorResult<DynamicObject>;

    /// Full update. The object's `resourceVersion` makes the write conditional.
    async fn replace(
        &self,
        key: &ObjectKey,
        object: &DynamicObject,
    ) -> AddonOperatorResult<DynamicObject>;

    /// JSON merge patch of the main resource.
    async fn patch(&self, key: &ObjectKey, patch: &Value) -> AddonOperatorResult<DynamicObject>;

    /// JSON merge patch of the status subresource.
    async fn patch_status(
        &self,
        key: &ObjectKey,
        patch: &Value,
    ) -> AddonOperatorResult<DynamicObject>;

    async fn delete(&self, key: &ObjectKey) -> AddonOperatorResult<DeleteOutcome>;
}

/// `ObjectStore` backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }

    fn api_for(&self, key: &ObjectKey) -> Api<DynamicObject> {
        self.api(&key.resource, key.namespace.as_deref())
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get(&self, key: &ObjectKey) -> AddonOperatorResult<Option<DynamicObject>> {
        Ok(self.api_for(key).get_opt(&key.name).await?)
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
    ) -> AddonOperatorResult<Vec<DynamicObject>> {
        let list = self
            .api(resource, Some(namespace))
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    async fn create(
        &self,
        key: &ObjectKey,
        object: &DynamicObject,
    ) -> AddonOperatorResult<DynamicObject> {
        Ok(self
            .api_for(key)
            .create(&PostParams::default(), object)
            .await?)
    }

    async fn replace(
        &self,
        key: &ObjectKey,
        object: &DynamicObject,
    ) -> AddonOperatorResult<DynamicObject> {
        Ok(self
            .api_for(key)
            .replace(&key.name, &PostParams::default(), object)
            .await?)
    }

    async fn patch(&self, key: &ObjectKey, patch: &Value) -> AddonOperatorResult<DynamicObject> {
        Ok(self
            .api_for(key)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        patch: &Value,
    ) -> AddonOperatorResult<DynamicObject> {
        Ok(self
            .api_for(key)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn delete(&self, key: &ObjectKey) -> AddonOperatorResult<DeleteOutcome> {
        match self
            .api_for(key)
            .delete(&key.name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(DeleteOutcome::Requested),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                Ok(DeleteOutcome::AlreadyGone)
            }
            Err(source) => Err(AddonOperatorError::Kube { source }),
        }
    }
}

/// Converts a typed object into its dynamic form.
pub fn to_dynamic<K: Serialize>(object: &K) -> AddonOperatorResult<DynamicObject> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Reads a dynamic object back as a typed one.
pub fn from_dynamic<K: DeserializeOwned>(object: &DynamicObject) -> AddonOperatorResult<K> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}
