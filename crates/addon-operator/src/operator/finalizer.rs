use kube::api::{DynamicObject, ObjectMeta};
use serde_json::{json, Value};

use crate::error::AddonOperatorResult;
use crate::k8s::{ObjectKey, ObjectStore};

pub fn has(meta: &ObjectMeta, token: &str) -> bool {
    meta.finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == token))
}

/// Adds `token` to the object's finalizers. The patch is conditional on the
/// resource version the caller read.
pub async fn add(
    store: &dyn ObjectStore,
    key: &ObjectKey,
    meta: &ObjectMeta,
    token: &str,
) -> AddonOperatorResult<DynamicObject> {
    let mut finalizers = meta.finalizers.clone().unwrap_or_default();
    finalizers.push(token.to_string());
    let finalizer: Value = json!({
      "metadata": {
        "finalizers": finalizers,
        "resourceVersion": meta.resource_version,
      }
    });
    store.patch(key, &finalizer).await
}

/// Removes `token` from the object's finalizers, leaving any others in place.
pub async fn delete(
    store: &dyn ObjectStore,
    key: &ObjectKey,
    meta: &ObjectMeta,
    token: &str,
) -> AddonOperatorResult<DynamicObject> {
    let remaining: Vec<String> = meta
        .finalizers
        .iter()
        .flatten()
        .filter(|f| *f != token)
        .cloned()
        .collect();
    let finalizers = if remaining.is_empty() {
        Value::Null
    } else {
        json!(remaining)
    };
    let finalizer: Value = json!({
      "metadata": {
        "finalizers": finalizers,
        "resourceVersion": meta.resource_version,
      }
    });
    store.patch(key, &finalizer).await
}
