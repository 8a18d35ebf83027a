//! Start-up bootstrap of the GPUAddon and Monitoring objects.
//!
//! Missing objects are created with their default spec. Existing ones only get
//! their version label refreshed, so user edits to the spec survive restarts.

use std::collections::BTreeMap;

use addon_common::info;
use addon_common::settings::Settings;
use kube::api::ObjectMeta;
use kube::Resource;
use serde::Serialize;
use serde_json::json;

use crate::error::AddonOperatorResult;
use crate::k8s::{to_dynamic, ObjectKey, ObjectStore};
use crate::version::version;

use super::crd::{GpuAddon, GpuAddonSpec, Monitoring, MonitoringSpec};

/// Ensures both add-on objects exist and carry the running operator's version.
pub async fn jumpstart(store: &dyn ObjectStore, settings: &Settings) -> AddonOperatorResult {
    let meta = ObjectMeta {
        name: Some(settings.addon_id.clone()),
        namespace: Some(settings.addon_namespace.clone()),
        labels: Some(BTreeMap::from([(
            settings.version_label(),
            version().to_string(),
        )])),
        ..Default::default()
    };

    let mut addon = GpuAddon::new(&settings.addon_id, GpuAddonSpec::default());
    addon.metadata = meta.clone();
    ensure(store, settings, &addon).await?;

    let mut monitoring = Monitoring::new(&settings.addon_id, MonitoringSpec::default());
    monitoring.metadata = meta;
    ensure(store, settings, &monitoring).await
}

async fn ensure<K>(store: &dyn ObjectStore, settings: &Settings, object: &K) -> AddonOperatorResult
where
    K: Resource<DynamicType = ()> + Serialize,
{
    let key = ObjectKey::of(object);
    match store.get(&key).await? {
        None => {
            store.create(&key, &to_dynamic(object)?).await?;
            info!(%key, "created");
        }
        Some(_) => {
            let label = json!({
                "metadata": { "labels": { (settings.version_label()): version() } }
            });
            store.patch(&key, &label).await?;
            info!(%key, version = version(), "version label updated");
        }
    }
    Ok(())
}
