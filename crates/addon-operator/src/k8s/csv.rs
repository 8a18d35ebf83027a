//! Lookup of installed operator packages (ClusterServiceVersions) and their example manifests.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::Value;

use crate::error::{AddonOperatorError, AddonOperatorResult};

use super::kinds;
use super::store::{ObjectKey, ObjectStore};

const ALM_EXAMPLES: &str = "alm-examples";

/// First CSV in `namespace` whose name starts with `prefix`.
pub async fn csv_with_prefix(
    store: &dyn ObjectStore,
    namespace: &str,
    prefix: &str,
) -> AddonOperatorResult<Option<DynamicObject>> {
    let csvs = store
        .list(&kinds::cluster_service_version(), namespace)
        .await?;
    Ok(csvs
        .into_iter()
        .find(|csv| csv.name_any().starts_with(prefix)))
}

/// Key of a CSV returned by `csv_with_prefix`.
pub fn csv_key(csv: &DynamicObject) -> ObjectKey {
    ObjectKey::of_dynamic(&kinds::cluster_service_version(), csv)
}

/// Raw `alm-examples` annotation of a CSV.
pub fn alm_examples(csv: &DynamicObject) -> AddonOperatorResult<&str> {
    csv.annotations()
        .get(ALM_EXAMPLES)
        .map(String::as_str)
        .ok_or_else(|| {
            AddonOperatorError::Template(format!(
                "{ALM_EXAMPLES} not found in CSV {}",
                csv.name_any()
            ))
        })
}

/// First manifest of an `alm-examples` list.
pub fn first_example(alm_examples: &str) -> AddonOperatorResult<Value> {
    let examples: Vec<Value> = serde_json::from_str(alm_examples)
        .map_err(|e| AddonOperatorError::Template(format!("not a JSON list of manifests: {e}")))?;
    examples.into_iter().next().ok_or_else(|| {
        AddonOperatorError::Template(format!("manifest list is empty: {alm_examples}"))
    })
}

/// Spec of the first example manifest shipped by the CSV whose name starts with `prefix`.
pub async fn template_spec(
    store: &dyn ObjectStore,
    namespace: &str,
    prefix: &str,
) -> AddonOperatorResult<Value> {
    let csv = csv_with_prefix(store, namespace, prefix)
        .await?
        .ok_or_else(|| {
            AddonOperatorError::Precondition(format!("no CSV named {namespace}/{prefix}*"))
        })?;
    let example = first_example(alm_examples(&csv)?)?;
    example
        .get("spec")
        .cloned()
        .ok_or_else(|| AddonOperatorError::Template(format!("example in {} has no spec", csv.name_any())))
}
