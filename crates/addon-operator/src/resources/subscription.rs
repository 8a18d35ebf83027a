use addon_common::settings::Settings;
use addon_common::info;
use async_trait::async_trait;
use kube::api::DynamicObject;
use serde_json::{json, Value};

use crate::error::{AddonOperatorError, AddonOperatorResult};
use crate::k8s::platform::{platform_version, PlatformVersion};
use crate::k8s::{csv, kinds, set_controller_reference, set_field, ObjectKey};
use crate::operator::condition::Condition;
use crate::operator::crd::GpuAddon;

use super::{delete_object, upsert, ReconcileContext, ReconcileFailure, ReconcileOutcome, ResourceReconciler};

pub const CONDITION_TYPE: &str = "SubscriptionDeployed";

const PACKAGE_NAME: &str = "gpu-operator-certified";
const SUBSCRIPTION_NAME: &str = "gpu-operator-certified";
const CATALOG_SOURCE: &str = "addon-nvidia-gpu-addon-catalog";

/// GPU operator channels known to work on each platform release, oldest first.
const COMPATIBILITY_MATRIX: &[((u64, u64), &[&str])] = &[
    ((4, 8), &["v1.9.0", "v1.10"]),
    ((4, 9), &["v1.9.0", "v1.10", "v1.11"]),
    ((4, 10), &["v1.10", "v1.11", "v22.9"]),
    ((4, 11), &["v22.9"]),
    ((4, 12), &["v22.9", "v23.3"]),
];

/// Preferred channel for a platform release: the newest compatible one.
pub fn channel_for(version: PlatformVersion) -> AddonOperatorResult<&'static str> {
    COMPATIBILITY_MATRIX
        .iter()
        .find(|((major, minor), _)| PlatformVersion::new(*major, *minor) == version)
        .and_then(|(_, channels)| channels.last().copied())
        .ok_or_else(|| AddonOperatorError::NoCompatibleChannel(version.to_string()))
}

/// CSV that OLM reports as installed for the subscription, if any.
fn installed_csv(subscription: &DynamicObject) -> Option<&str> {
    subscription
        .data
        .pointer("/status/installedCSV")
        .and_then(Value::as_str)
        .filter(|csv| !csv.is_empty())
}

/// OLM subscription for the certified GPU operator.
pub struct SubscriptionReconciler;

fn key(settings: &Settings) -> ObjectKey {
    ObjectKey::namespaced(
        kinds::subscription(),
        &settings.addon_namespace,
        SUBSCRIPTION_NAME,
    )
}

pub fn desired_spec(settings: &Settings, channel: &str) -> Value {
    json!({
        "source": CATALOG_SOURCE,
        "sourceNamespace": settings.addon_namespace,
        "channel": channel,
        "name": PACKAGE_NAME,
        "installPlanApproval": "Automatic",
    })
}

#[async_trait]
impl ResourceReconciler<GpuAddon> for SubscriptionReconciler {
    fn name(&self) -> &'static str {
        "Subscription"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE
    }

    async fn reconcile(&self, ctx: &ReconcileContext, owner: &GpuAddon) -> ReconcileOutcome {
        let channel = platform_version(ctx.store())
            .await
            .and_then(channel_for)
            .map_err(|e| ReconcileFailure::lookup(CONDITION_TYPE, e))?;
        let spec = desired_spec(&ctx.settings, channel);

        let (result, subscription) = upsert(ctx, CONDITION_TYPE, &key(&ctx.settings), |object| {
            set_controller_reference(owner, object)?;
            set_field(object, "spec", spec);
            Ok(())
        })
        .await?;
        let installed = installed_csv(&subscription).is_some();
        ctx.metrics.set_subscription_installed(installed);
        info!(channel, ?result, installed, "Subscription reconciled");

        Ok(vec![Condition::success(
            CONDITION_TYPE,
            "Subscription deployed successfully",
        )])
    }

    /// Removes the subscription and the GPU operator CSV it installed.
    async fn delete(&self, ctx: &ReconcileContext) -> AddonOperatorResult<bool> {
        let settings = &ctx.settings;
        let subscription_gone = delete_object(ctx, &key(settings)).await?;

        let csv_gone = match csv::csv_with_prefix(
            ctx.store(),
            &settings.gpu_csv_namespace,
            &settings.gpu_csv_prefix,
        )
        .await?
        {
            Some(csv) => delete_object(ctx, &csv::csv_key(&csv)).await?,
            None => true,
        };

        Ok(subscription_gone && csv_gone)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::k8s::csv::tests::seed_csv;
    use crate::k8s::fake::FakeStore;
    use crate::k8s::ObjectStore;
    use crate::k8s::platform::tests::seed_platform;
    use crate::operator::condition::reason;
    use crate::resources::tests::{context, gpu_addon, NAMESPACE};

    #[test]
    fn test_channel_is_last_compatible_entry() {
        assert_eq!(channel_for(PlatformVersion::new(4, 9)).unwrap(), "v1.11");
        assert_eq!(channel_for(PlatformVersion::new(4, 10)).unwrap(), "v22.9");
        assert_eq!(channel_for(PlatformVersion::new(4, 12)).unwrap(), "v23.3");
        assert!(matches!(
            channel_for(PlatformVersion::new(3, 11)),
            Err(AddonOperatorError::NoCompatibleChannel(_))
        ));
    }

    #[tokio::test]
    async fn test_creates_subscription() {
        let store = Arc::new(FakeStore::default());
        seed_platform(&store, "4.10.1");
        let ctx = context(store.clone());

        let conditions = SubscriptionReconciler
            .reconcile(&ctx, &gpu_addon(true))
            .await
            .unwrap();
        assert!(conditions[0].is_true());

        let object = store.object(&key(&ctx.settings)).unwrap();
        let spec = &object.data["spec"];
        assert_eq!(spec["channel"], "v22.9");
        assert_eq!(spec["name"], "gpu-operator-certified");
        assert_eq!(spec["source"], "addon-nvidia-gpu-addon-catalog");
        assert_eq!(spec["sourceNamespace"], NAMESPACE);
        assert_eq!(spec["installPlanApproval"], "Automatic");
    }

    #[tokio::test]
    async fn test_installed_gauge_follows_installed_csv() {
        let store = Arc::new(FakeStore::default());
        seed_platform(&store, "4.10.1");
        let ctx = context(store.clone());
        let addon = gpu_addon(true);

        SubscriptionReconciler.reconcile(&ctx, &addon).await.unwrap();
        assert_eq!(ctx.metrics.subscription_installed(), 0);

        store
            .patch_status(
                &key(&ctx.settings),
                &json!({ "status": { "installedCSV": "gpu-operator-certified.v22.9.0" } }),
            )
            .await
            .unwrap();
        SubscriptionReconciler.reconcile(&ctx, &addon).await.unwrap();
        assert_eq!(ctx.metrics.subscription_installed(), 1);

        store
            .patch_status(&key(&ctx.settings), &json!({ "status": { "installedCSV": "" } }))
            .await
            .unwrap();
        SubscriptionReconciler.reconcile(&ctx, &addon).await.unwrap();
        assert_eq!(ctx.metrics.subscription_installed(), 0);
    }

    #[tokio::test]
    async fn test_unknown_platform_reports_precondition_failure() {
        let store = Arc::new(FakeStore::default());
        seed_platform(&store, "4.99.0");
        let ctx = context(store.clone());

        let failure = SubscriptionReconciler
            .reconcile(&ctx, &gpu_addon(true))
            .await
            .unwrap_err();
        assert_eq!(failure.conditions[0].reason, reason::PRECONDITION_FAILED);
        assert!(matches!(failure.error, AddonOperatorError::NoCompatibleChannel(_)));
        assert!(store.object(&key(&ctx.settings)).is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_gpu_operator_csv() {
        let store = Arc::new(FakeStore::default());
        seed_platform(&store, "4.10.1");
        seed_csv(&store, NAMESPACE, "gpu-operator-certified.v22.9.0", None);
        let ctx = context(store.clone());
        SubscriptionReconciler
            .reconcile(&ctx, &gpu_addon(true))
            .await
            .unwrap();

        assert!(!SubscriptionReconciler.delete(&ctx).await.unwrap());
        assert_eq!(store.count(&kinds::cluster_service_version()), 0);
        assert!(SubscriptionReconciler.delete(&ctx).await.unwrap());
    }
}
