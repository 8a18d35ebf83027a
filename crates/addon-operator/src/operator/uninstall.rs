//! Uninstall trigger: the add-on's ConfigMap carries a delete label set by the
//! installer when the add-on is being removed from the cluster.

use std::sync::Arc;

use addon_common::{debug, error, info, warn};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::instrument;

use crate::error::{AddonOperatorError, AddonOperatorResult};
use crate::k8s::{kinds, ObjectKey};

use super::reconcile::{requeue_after, ContextData};

/// Boolean label value, accepting the same spellings as the installer.
fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[instrument(skip_all, fields(name = %config_map.name_any()))]
pub async fn reconcile(
    config_map: Arc<ConfigMap>,
    context: Arc<ContextData>,
) -> AddonOperatorResult<Action> {
    let key = ObjectKey::of(config_map.as_ref());
    reconcile_config_map(&context, &key).await?;
    Ok(Action::await_change())
}

pub async fn reconcile_config_map(context: &ContextData, key: &ObjectKey) -> AddonOperatorResult {
    let settings = context.settings();
    let addon_config_map = key.name == settings.addon_id
        && key.namespace.as_deref() == Some(settings.addon_namespace.as_str());
    if !addon_config_map {
        return Ok(());
    }

    let Some(config_map) = context.store().get(key).await? else {
        debug!(%key, "add-on ConfigMap not found");
        return Ok(());
    };

    let delete_label = settings.delete_label();
    let Some(value) = config_map.labels().get(&delete_label) else {
        debug!(%key, "no delete label, nothing to do");
        return Ok(());
    };

    match parse_flag(value) {
        Some(true) => delete_addons(context).await,
        Some(false) => Ok(()),
        None => {
            warn!(%key, label = %delete_label, %value, "invalid value in add-on delete label");
            Ok(())
        }
    }
}

/// Deletes every GPUAddon in the add-on namespace, which starts their teardown.
async fn delete_addons(context: &ContextData) -> AddonOperatorResult {
    let namespace = &context.settings().addon_namespace;
    let resource = kinds::gpu_addon();
    let addons = context.store().list(&resource, namespace).await?;
    if addons.len() > 1 {
        info!(count = addons.len(), %namespace, "multiple GPUAddon objects found");
    }

    for addon in &addons {
        let key = ObjectKey::of_dynamic(&resource, addon);
        let outcome = context.store().delete(&key).await?;
        info!(%key, ?outcome, "GPUAddon deletion requested by uninstall label");
    }
    Ok(())
}

pub fn on_error(
    config_map: Arc<ConfigMap>,
    error: &AddonOperatorError,
    _context: Arc<ContextData>,
) -> Action {
    error!(name = %config_map.name_any(), %error, "uninstall trigger failed");
    Action::requeue(requeue_after(error))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::k8s::fake::FakeStore;
    use crate::k8s::{to_dynamic, ObjectStore};
    use crate::operator::reconcile::tests::context_data;
    use crate::resources::tests::{gpu_addon, NAMESPACE};

    const DELETE_LABEL: &str = "api.openshift.com/addon-nvidia-gpu-addon-delete";

    fn seed_config_map(store: &FakeStore, name: &str, label: Option<&str>) -> ObjectKey {
        let mut config_map = ConfigMap::default();
        config_map.metadata.name = Some(name.to_string());
        config_map.metadata.namespace = Some(NAMESPACE.to_string());
        config_map.metadata.labels = label.map(|value| {
            BTreeMap::from([(DELETE_LABEL.to_string(), value.to_string())])
        });
        store.seed(&kinds::config_map(), to_dynamic(&config_map).unwrap());
        ObjectKey::namespaced(kinds::config_map(), NAMESPACE, name)
    }

    fn seeded_store() -> Arc<FakeStore> {
        let store = Arc::new(FakeStore::default());
        store.seed(&kinds::gpu_addon(), to_dynamic(&gpu_addon(true)).unwrap());
        store
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Some(true));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("False"), Some(false));
        assert_eq!(parse_flag("yes"), None);
    }

    #[tokio::test]
    async fn test_delete_label_removes_addons() {
        let store = seeded_store();
        let key = seed_config_map(&store, "nvidia-gpu-addon", Some("true"));
        let context = context_data(store.clone());

        reconcile_config_map(&context, &key).await.unwrap();
        assert_eq!(store.count(&kinds::gpu_addon()), 0);
    }

    #[tokio::test]
    async fn test_false_or_invalid_label_is_ignored() {
        for value in [Some("false"), Some("maybe"), None] {
            let store = seeded_store();
            let key = seed_config_map(&store, "nvidia-gpu-addon", value);
            let context = context_data(store.clone());

            reconcile_config_map(&context, &key).await.unwrap();
            assert_eq!(store.count(&kinds::gpu_addon()), 1, "{value:?}");
        }
    }

    #[tokio::test]
    async fn test_other_config_maps_are_ignored() {
        let store = seeded_store();
        let key = seed_config_map(&store, "unrelated", Some("true"));
        let context = context_data(store.clone());

        reconcile_config_map(&context, &key).await.unwrap();
        assert_eq!(store.count(&kinds::gpu_addon()), 1);
    }

    #[tokio::test]
    async fn test_missing_config_map() {
        let store = seeded_store();
        let context = context_data(store.clone());
        let key = ObjectKey::namespaced(kinds::config_map(), NAMESPACE, "nvidia-gpu-addon");

        reconcile_config_map(&context, &key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }
}
