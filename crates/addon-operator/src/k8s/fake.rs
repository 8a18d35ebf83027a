//! In-memory `ObjectStore` for tests.
//!
//! Emulates the API server behaviour the reconcilers depend on: uids and
//! resource versions, conflicts on stale writes, merge patches, the status
//! subresource and finalizer-gated deletion.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{ApiResource, DynamicObject, TypeMeta};
use kube::error::ErrorResponse;
use kube::ResourceExt;
use serde_json::{Map, Value};

use crate::error::{AddonOperatorError, AddonOperatorResult};

use super::store::{DeleteOutcome, ObjectKey, ObjectStore};

type StoreKey = (String, String, Option<String>, String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Replace,
    Patch,
    PatchStatus,
    Delete,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<StoreKey, DynamicObject>,
    next_version: u64,
    writes: usize,
    failures: HashSet<(Verb, String)>,
}

#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

fn store_key(resource: &ApiResource, namespace: Option<String>, name: &str) -> StoreKey {
    (
        resource.api_version.clone(),
        resource.kind.clone(),
        namespace,
        name.to_string(),
    )
}

fn key_of(key: &ObjectKey) -> StoreKey {
    store_key(&key.resource, key.namespace.clone(), &key.name)
}

fn api_error(code: u16, reason: &str, message: String) -> AddonOperatorError {
    AddonOperatorError::from(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

fn not_found(key: &ObjectKey) -> AddonOperatorError {
    api_error(404, "NotFound", format!("{key} not found"))
}

/// RFC 7386 JSON merge patch.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

impl FakeStore {
    /// Stores `object` as if it had been created earlier.
    pub fn seed(&self, resource: &ApiResource, mut object: DynamicObject) {
        let mut state = self.lock();
        state.next_version += 1;
        object.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
        object.metadata.resource_version = Some(state.next_version.to_string());
        if object.metadata.uid.is_none() {
            object.metadata.uid = Some(format!("uid-{}", state.next_version));
        }
        let key = store_key(resource, object.namespace(), &object.name_any());
        state.objects.insert(key, object);
    }

    /// Makes every `verb` call on `kind` fail with a server error.
    pub fn fail(&self, verb: Verb, kind: &str) {
        self.lock().failures.insert((verb, kind.to_string()));
    }

    pub fn heal(&self) {
        self.lock().failures.clear();
    }

    /// Number of successful create, replace, patch and delete calls.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    pub fn count(&self, resource: &ApiResource) -> usize {
        self.lock()
            .objects
            .keys()
            .filter(|(api_version, kind, _, _)| {
                *api_version == resource.api_version && *kind == resource.kind
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn object(&self, key: &ObjectKey) -> Option<DynamicObject> {
        self.lock().objects.get(&key_of(key)).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check(&self, state: &State, verb: Verb, kind: &str) -> AddonOperatorResult {
        if state.failures.contains(&(verb, kind.to_string())) {
            return Err(api_error(
                500,
                "InternalError",
                format!("injected {verb:?} failure for {kind}"),
            ));
        }
        Ok(())
    }

    /// Stores `object`, or drops it when it is deleting and has no finalizers left.
    fn commit(state: &mut State, key: StoreKey, mut object: DynamicObject) -> DynamicObject {
        state.next_version += 1;
        state.writes += 1;
        object.metadata.resource_version = Some(state.next_version.to_string());
        let released = object.metadata.deletion_timestamp.is_some()
            && object.finalizers().is_empty();
        if released {
            state.objects.remove(&key);
        } else {
            state.objects.insert(key, object.clone());
        }
        object
    }

    fn apply_patch(
        &self,
        key: &ObjectKey,
        patch: &Value,
        status_only: bool,
    ) -> AddonOperatorResult<DynamicObject> {
        let mut state = self.lock();
        let verb = if status_only {
            Verb::PatchStatus
        } else {
            Verb::Patch
        };
        self.check(&state, verb, &key.resource.kind)?;
        let store_key = key_of(key);
        let current = state
            .objects
            .get(&store_key)
            .cloned()
            .ok_or_else(|| not_found(key))?;

        if let Some(expected) = patch
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
        {
            if Some(expected) != current.metadata.resource_version.as_deref() {
                return Err(api_error(409, "Conflict", format!("{key} has changed")));
            }
        }

        let mut value = serde_json::to_value(&current)?;
        if status_only {
            if let Some(status) = patch.get("status") {
                merge_patch(
                    value
                        .as_object_mut()
                        .map(|o| o.entry("status").or_insert(Value::Null))
                        .ok_or_else(|| not_found(key))?,
                    status,
                );
            }
        } else {
            let mut patch = patch.clone();
            if let Some(o) = patch.as_object_mut() {
                o.remove("status");
            }
            merge_patch(&mut value, &patch);
        }
        let patched: DynamicObject = serde_json::from_value(value)?;
        Ok(Self::commit(&mut state, store_key, patched))
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get(&self, key: &ObjectKey) -> AddonOperatorResult<Option<DynamicObject>> {
        let state = self.lock();
        self.check(&state, Verb::Get, &key.resource.kind)?;
        Ok(state.objects.get(&key_of(key)).cloned())
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: &str,
    ) -> AddonOperatorResult<Vec<DynamicObject>> {
        let state = self.lock();
        self.check(&state, Verb::List, &resource.kind)?;
        Ok(state
            .objects
            .iter()
            .filter(|((api_version, kind, ns, _), _)| {
                *api_version == resource.api_version
                    && *kind == resource.kind
                    && ns.as_deref() == Some(namespace)
            })
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn create(
        &self,
        key: &ObjectKey,
        object: &DynamicObject,
    ) -> AddonOperatorResult<DynamicObject> {
        let mut state = self.lock();
        self.check(&state, Verb::Create, &key.resource.kind)?;
        let store_key = key_of(key);
        if state.objects.contains_key(&store_key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{key} already exists"),
            ));
        }
        let mut object = object.clone();
        object.types = Some(TypeMeta {
            api_version: key.resource.api_version.clone(),
            kind: key.resource.kind.clone(),
        });
        object.metadata.namespace = key.namespace.clone();
        object.metadata.uid = Some(format!("uid-{}", state.next_version + 1));
        Ok(Self::commit(&mut state, store_key, object))
    }

    async fn replace(
        &self,
        key: &ObjectKey,
        object: &DynamicObject,
    ) -> AddonOperatorResult<DynamicObject> {
        let mut state = self.lock();
        self.check(&state, Verb::Replace, &key.resource.kind)?;
        let store_key = key_of(key);
        let current = state
            .objects
            .get(&store_key)
            .cloned()
            .ok_or_else(|| not_found(key))?;
        if object.metadata.resource_version.is_some()
            && object.metadata.resource_version != current.metadata.resource_version
        {
            return Err(api_error(409, "Conflict", format!("{key} has changed")));
        }

        let mut object = object.clone();
        object.metadata.uid = current.metadata.uid.clone();
        object.metadata.deletion_timestamp = current.metadata.deletion_timestamp.clone();
        if let Value::Object(data) = &mut object.data {
            match current.data.get("status") {
                Some(status) => data.insert("status".to_string(), status.clone()),
                None => data.remove("status"),
            };
        }
        Ok(Self::commit(&mut state, store_key, object))
    }

    async fn patch(&self, key: &ObjectKey, patch: &Value) -> AddonOperatorResult<DynamicObject> {
        self.apply_patch(key, patch, false)
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        patch: &Value,
    ) -> AddonOperatorResult<DynamicObject> {
        self.apply_patch(key, patch, true)
    }

    async fn delete(&self, key: &ObjectKey) -> AddonOperatorResult<DeleteOutcome> {
        let mut state = self.lock();
        self.check(&state, Verb::Delete, &key.resource.kind)?;
        let store_key = key_of(key);
        let Some(mut object) = state.objects.get(&store_key).cloned() else {
            return Ok(DeleteOutcome::AlreadyGone);
        };
        if object.metadata.deletion_timestamp.is_none() {
            object.metadata.deletion_timestamp = Some(Time(Utc::now()));
        }
        Self::commit(&mut state, store_key, object);
        Ok(DeleteOutcome::Requested)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::k8s::kinds;

    #[test]
    fn test_merge_patch() {
        let mut target = json!({ "a": 1, "b": { "c": 2, "d": 3 } });
        merge_patch(&mut target, &json!({ "b": { "c": null, "e": 4 }, "f": [1] }));
        assert_eq!(target, json!({ "a": 1, "b": { "d": 3, "e": 4 }, "f": [1] }));
    }

    #[tokio::test]
    async fn test_finalizers_gate_deletion() {
        let store = FakeStore::default();
        let key = ObjectKey::namespaced(kinds::gpu_addon(), "gpu", "addon");
        let mut object = key.empty_object();
        object.metadata.finalizers = Some(vec!["nvidia-gpu-addon".to_string()]);
        store.create(&key, &object).await.unwrap();

        assert_eq!(store.delete(&key).await.unwrap(), DeleteOutcome::Requested);
        let deleting = store.get(&key).await.unwrap().unwrap();
        assert!(deleting.metadata.deletion_timestamp.is_some());

        store
            .patch(&key, &json!({ "metadata": { "finalizers": null } }))
            .await
            .unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
        assert_eq!(store.delete(&key).await.unwrap(), DeleteOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn test_status_is_a_subresource() {
        let store = FakeStore::default();
        let key = ObjectKey::namespaced(kinds::monitoring(), "gpu", "monitoring");
        store.create(&key, &key.empty_object()).await.unwrap();

        store
            .patch(&key, &json!({ "status": { "phase": "Ready" } }))
            .await
            .unwrap();
        let object = store.get(&key).await.unwrap().unwrap();
        assert!(object.data.get("status").is_none());

        store
            .patch_status(&key, &json!({ "status": { "phase": "Ready" } }))
            .await
            .unwrap();
        let object = store.get(&key).await.unwrap().unwrap();
        assert_eq!(object.data["status"]["phase"], "Ready");
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = FakeStore::default();
        store.fail(Verb::Get, "Subscription");
        let key = ObjectKey::namespaced(kinds::subscription(), "gpu", "sub");
        assert!(store.get(&key).await.is_err());
        store.heal();
        assert!(store.get(&key).await.unwrap().is_none());
    }
}
