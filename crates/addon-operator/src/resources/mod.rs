//! Resource reconcilers: one per managed child resource, driven in a fixed order by the orchestrators.

pub mod cluster_policy;
pub mod console_plugin;
pub mod monitoring;
pub mod nfd;
pub mod subscription;

use std::sync::Arc;

use addon_common::settings::Settings;
use addon_common::debug;
use async_trait::async_trait;
use kube::api::DynamicObject;

use crate::error::{AddonOperatorError, AddonOperatorResult};
use crate::k8s::{create_or_patch, ObjectKey, ObjectStore, OperationResult};
use crate::metrics::SharedMetrics;
use crate::operator::condition::{reason, Condition};
use crate::operator::crd::{GpuAddon, Monitoring};

/// Everything a resource reconciler may use: the object store, the settings
/// snapshot and the operator metrics.
#[derive(Clone)]
pub struct ReconcileContext {
    pub store: Arc<dyn ObjectStore>,
    pub settings: Arc<Settings>,
    pub metrics: SharedMetrics,
}

impl ReconcileContext {
    pub fn new(store: Arc<dyn ObjectStore>, settings: Arc<Settings>, metrics: SharedMetrics) -> Self {
        Self {
            store,
            settings,
            metrics,
        }
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }
}

/// A failed reconcile step: the conditions describing the failure plus the error itself.
#[derive(Debug)]
pub struct ReconcileFailure {
    pub conditions: Vec<Condition>,
    pub error: AddonOperatorError,
}

impl ReconcileFailure {
    pub fn new(condition: Condition, error: AddonOperatorError) -> Self {
        Self {
            conditions: vec![condition],
            error,
        }
    }

    pub fn fetch(condition_type: &str, error: AddonOperatorError) -> Self {
        let message = format!("failed to fetch: {error}");
        Self::new(
            Condition::failure(condition_type, reason::FETCH_FAILED, message),
            error,
        )
    }

    pub fn create(condition_type: &str, error: AddonOperatorError) -> Self {
        let message = format!("failed to create or update: {error}");
        Self::new(
            Condition::failure(condition_type, reason::CREATE_FAILED, message),
            error,
        )
    }

    pub fn precondition(condition_type: &str, error: AddonOperatorError) -> Self {
        let message = error.to_string();
        Self::new(
            Condition::failure(condition_type, reason::PRECONDITION_FAILED, message),
            error,
        )
    }

    /// Failure of a lookup the desired state depends on. API errors are fetch
    /// failures, anything else is a precondition failure.
    pub fn lookup(condition_type: &str, error: AddonOperatorError) -> Self {
        match error {
            AddonOperatorError::Kube { .. } => Self::fetch(condition_type, error),
            _ => Self::precondition(condition_type, error),
        }
    }
}

pub type ReconcileOutcome = Result<Vec<Condition>, ReconcileFailure>;

/// One managed child resource of an owner of type `K`.
#[async_trait]
pub trait ResourceReconciler<K: Send + Sync>: Send + Sync {
    /// Short name used in logs and error context.
    fn name(&self) -> &'static str;

    /// Condition types this reconciler reports, one per pass.
    fn condition_type(&self) -> &'static str;

    /// Converges the child resource towards the state derived from `owner`.
    async fn reconcile(&self, ctx: &ReconcileContext, owner: &K) -> ReconcileOutcome;

    /// Deletes the child resource. Returns `true` once it is confirmed absent.
    ///
    /// Safe to call repeatedly and without a prior `reconcile`.
    async fn delete(&self, ctx: &ReconcileContext) -> AddonOperatorResult<bool>;
}

pub type AddonReconcilers = Vec<Box<dyn ResourceReconciler<GpuAddon>>>;
pub type MonitoringReconcilers = Vec<Box<dyn ResourceReconciler<Monitoring>>>;

/// Creation order of the GPU add-on children. Teardown walks it backwards.
pub fn addon_reconcilers() -> AddonReconcilers {
    vec![
        Box::new(nfd::NfdReconciler),
        Box::new(subscription::SubscriptionReconciler),
        Box::new(cluster_policy::ClusterPolicyReconciler),
        Box::new(console_plugin::ConsolePluginReconciler),
    ]
}

/// Creation order of the monitoring stack. Teardown walks it backwards.
pub fn monitoring_reconcilers() -> MonitoringReconcilers {
    vec![
        Box::new(monitoring::rbac_proxy_config_map::RbacProxyConfigMapReconciler),
        Box::new(monitoring::prometheus_service::PrometheusServiceReconciler),
        Box::new(monitoring::prometheus::PrometheusReconciler),
        Box::new(monitoring::alertmanager::AlertmanagerReconciler),
        Box::new(monitoring::alertmanager_config::AlertmanagerConfigReconciler),
    ]
}

/// Fetch-or-zero then create-or-patch, reporting failures against `condition_type`.
/// Returns the object as stored after the call.
pub(crate) async fn upsert<F>(
    ctx: &ReconcileContext,
    condition_type: &str,
    key: &ObjectKey,
    mutate: F,
) -> Result<(OperationResult, DynamicObject), ReconcileFailure>
where
    F: FnOnce(&mut DynamicObject) -> AddonOperatorResult + Send,
{
    let existing = ctx
        .store
        .get(key)
        .await
        .map_err(|e| ReconcileFailure::fetch(condition_type, e))?;
    let (result, object) = create_or_patch(ctx.store(), key, existing, mutate)
        .await
        .map_err(|e| ReconcileFailure::create(condition_type, e))?;
    debug!(%key, ?result, "child resource reconciled");
    Ok((result, object))
}

/// Deletes a single object; `true` when it was already absent.
pub(crate) async fn delete_object(ctx: &ReconcileContext, key: &ObjectKey) -> AddonOperatorResult<bool> {
    let outcome = ctx.store.delete(key).await?;
    debug!(%key, ?outcome, "child resource delete");
    Ok(outcome.is_gone())
}

#[cfg(test)]
pub(crate) mod tests {
    use kube::api::ObjectMeta;

    use super::*;
    use crate::k8s::fake::FakeStore;
    use crate::metrics::Metrics;
    use crate::operator::crd::{GpuAddonSpec, MonitoringSpec};

    pub(crate) const NAMESPACE: &str = "redhat-nvidia-gpu-addon";

    pub(crate) fn context(store: Arc<FakeStore>) -> ReconcileContext {
        context_with(store, Settings::default())
    }

    pub(crate) fn context_with(store: Arc<FakeStore>, settings: Settings) -> ReconcileContext {
        ReconcileContext::new(store, Arc::new(settings), Arc::new(Metrics::new().unwrap()))
    }

    pub(crate) fn gpu_addon(console_plugin_enabled: bool) -> GpuAddon {
        let mut addon = GpuAddon::new(
            "nvidia-gpu-addon",
            GpuAddonSpec {
                console_plugin_enabled,
                nvaie_pullsecret: None,
            },
        );
        addon.metadata = ObjectMeta {
            name: Some("nvidia-gpu-addon".to_string()),
            namespace: Some(NAMESPACE.to_string()),
            uid: Some("addon-uid".to_string()),
            ..Default::default()
        };
        addon
    }

    pub(crate) fn monitoring() -> Monitoring {
        let mut monitoring = Monitoring::new("nvidia-gpu-addon", MonitoringSpec::default());
        monitoring.metadata = ObjectMeta {
            name: Some("nvidia-gpu-addon".to_string()),
            namespace: Some(NAMESPACE.to_string()),
            uid: Some("monitoring-uid".to_string()),
            ..Default::default()
        };
        monitoring
    }

    #[test]
    fn test_registries_are_ordered() {
        let names: Vec<_> = addon_reconcilers().iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            ["NodeFeatureDiscovery", "Subscription", "ClusterPolicy", "ConsolePlugin"]
        );

        let names: Vec<_> = monitoring_reconcilers().iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            [
                "PrometheusKubeRbacProxyConfigMap",
                "PrometheusService",
                "Prometheus",
                "Alertmanager",
                "AlertmanagerConfig"
            ]
        );
    }

    #[test]
    fn test_condition_types_are_unique() {
        let mut types: Vec<_> = addon_reconcilers()
            .iter()
            .map(|r| r.condition_type())
            .chain(monitoring_reconcilers().iter().map(|r| r.condition_type()))
            .collect();
        let total = types.len();
        types.sort();
        types.dedup();
        assert_eq!(types.len(), total);
    }

    #[tokio::test]
    async fn test_every_delete_is_idempotent_on_empty_store() {
        let store = Arc::new(FakeStore::default());
        let ctx = context(store.clone());
        for reconciler in addon_reconcilers() {
            assert!(reconciler.delete(&ctx).await.unwrap(), "{}", reconciler.name());
            assert!(reconciler.delete(&ctx).await.unwrap(), "{}", reconciler.name());
        }
        for reconciler in monitoring_reconcilers() {
            assert!(reconciler.delete(&ctx).await.unwrap(), "{}", reconciler.name());
        }
        assert_eq!(store.writes(), 0);
    }
}
