//! Idempotent create-or-update of dependent objects.

use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};
use serde_json::{json, Value};

use crate::error::{AddonOperatorError, AddonOperatorResult};

use super::store::{ObjectKey, ObjectStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationResult {
    Created,
    Updated,
    Unchanged,
}

/// Brings the object at `key` to the state produced by `mutate`.
///
/// `existing` is the result of a previous read of `key`. An absent object is
/// created from its zero value. A present one is only written when `mutate`
/// actually changed it, and the write carries the read `resourceVersion`.
pub async fn create_or_patch<F>(
    store: &dyn ObjectStore,
    key: &ObjectKey,
    existing: Option<DynamicObject>,
    mutate: F,
) -> AddonOperatorResult<(OperationResult, DynamicObject)>
where
    F: FnOnce(&mut DynamicObject) -> AddonOperatorResult<()> + Send,
{
    match existing {
        None => {
            let mut object = key.empty_object();
            mutate(&mut object)?;
            let created = store.create(key, &object).await?;
            Ok((OperationResult::Created, created))
        }
        Some(current) => {
            let mut desired = current.clone();
            mutate(&mut desired)?;
            if serde_json::to_value(&current)? == serde_json::to_value(&desired)? {
                return Ok((OperationResult::Unchanged, current));
            }
            let updated = store.replace(key, &desired).await?;
            Ok((OperationResult::Updated, updated))
        }
    }
}

/// Sets a top-level field (such as `spec` or `data`) of a dynamic object.
pub fn set_field(object: &mut DynamicObject, field: &str, value: Value) {
    match &mut object.data {
        Value::Object(map) => {
            map.insert(field.to_string(), value);
        }
        data => *data = json!({ field: value }),
    }
}

/// Overlays the keys of `desired` onto a top-level object field, keeping keys it does not name.
pub fn merge_field(object: &mut DynamicObject, field: &str, desired: Value) {
    let Value::Object(desired) = desired else {
        set_field(object, field, desired);
        return;
    };
    match object.data.get_mut(field) {
        Some(Value::Object(current)) => {
            for (key, value) in desired {
                current.insert(key, value);
            }
        }
        _ => set_field(object, field, Value::Object(desired)),
    }
}

/// True when every value in `desired` is already present in `current`.
///
/// Keys that only `current` has, such as server-side defaults, are ignored.
/// Arrays must have the same length and match element by element.
pub fn contains(current: &Value, desired: &Value) -> bool {
    match (current, desired) {
        (Value::Object(current), Value::Object(desired)) => desired
            .iter()
            .all(|(key, value)| current.get(key).is_some_and(|c| contains(c, value))),
        (Value::Array(current), Value::Array(desired)) => {
            current.len() == desired.len()
                && current.iter().zip(desired).all(|(c, d)| contains(c, d))
        }
        _ => current == desired,
    }
}

/// Sets a top-level field unless the stored value already carries everything in `desired`.
pub fn set_field_if_drifted(object: &mut DynamicObject, field: &str, desired: Value) {
    let drifted = object
        .data
        .get(field)
        .map_or(true, |current| !contains(current, &desired));
    if drifted {
        set_field(object, field, desired);
    }
}

/// Marks `owner` as the controlling owner of `object`.
///
/// Fails when a different controller already owns the object.
pub fn set_controller_reference<K>(owner: &K, object: &mut DynamicObject) -> AddonOperatorResult
where
    K: Resource<DynamicType = ()>,
{
    let owner_ref = owner
        .controller_owner_ref(&())
        .ok_or_else(|| AddonOperatorError::MissingMetadata(owner.name_any(), "uid"))?;
    let object_name = object.name_any();
    let refs = object.metadata.owner_references.get_or_insert_with(Vec::new);

    if let Some(current) = refs.iter().find(|r| r.controller == Some(true)) {
        if current.uid == owner_ref.uid {
            return Ok(());
        }
        return Err(AddonOperatorError::AlreadyOwned {
            object: object_name,
            owner: format!("{} {}", current.kind, current.name),
        });
    }
    refs.retain(|r| r.uid != owner_ref.uid);
    refs.push(owner_ref);
    Ok(())
}
