use std::sync::Arc;
use std::time::Duration;

use addon_common::settings::Settings;
use addon_common::{debug, error, info};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::error::{AddonOperatorError, AddonOperatorResult};
use crate::k8s::{csv, from_dynamic, ObjectKey, ObjectStore};
use crate::metrics::SharedMetrics;
use crate::resources::{
    addon_reconcilers, monitoring_reconcilers, AddonReconcilers, MonitoringReconcilers,
    ReconcileContext,
};

use super::crd::{AddonPhase, GpuAddon};
use super::{finalizer, pipeline, status};

/// Shared by every controller: the store, the settings snapshot, the metrics,
/// the process-wide cancellation token and both reconciler registries.
pub struct ContextData {
    pub(crate) resources: ReconcileContext,
    pub(crate) cancel: CancellationToken,
    pub(crate) addon: AddonReconcilers,
    pub(crate) monitoring: MonitoringReconcilers,
}

impl ContextData {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        settings: Arc<Settings>,
        metrics: SharedMetrics,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            resources: ReconcileContext::new(store, settings, metrics),
            cancel,
            addon: addon_reconcilers(),
            monitoring: monitoring_reconcilers(),
        }
    }

    pub(crate) fn store(&self) -> &dyn ObjectStore {
        self.resources.store()
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.resources.settings
    }

    /// Finalizer token guarding the GPUAddon object.
    pub(crate) fn finalizer(&self) -> &str {
        &self.resources.settings.addon_id
    }
}

enum AddonAction {
    Install,
    Uninstall,
    NoOp,
}

fn determine_action(addon: &GpuAddon, finalizer: &str) -> AddonAction {
    if addon.meta().deletion_timestamp.is_none() {
        AddonAction::Install
    } else if finalizer::has(addon.meta(), finalizer) {
        AddonAction::Uninstall
    } else {
        AddonAction::NoOp
    }
}

#[instrument(skip_all, fields(name = %addon.name_any(), namespace = ?addon.namespace()))]
pub async fn reconcile(
    addon: Arc<GpuAddon>,
    context: Arc<ContextData>,
) -> AddonOperatorResult<Action> {
    let key = ObjectKey::of(addon.as_ref());
    reconcile_addon(&context, &key).await?;
    Ok(Action::await_change())
}

/// One pass over the GPUAddon stored under `key`, always working from a fresh read.
pub async fn reconcile_addon(context: &ContextData, key: &ObjectKey) -> AddonOperatorResult {
    let Some(object) = context.store().get(key).await? else {
        debug!(%key, "GPUAddon is gone, nothing to do");
        return Ok(());
    };
    let addon: GpuAddon = from_dynamic(&object)?;

    match determine_action(&addon, context.finalizer()) {
        AddonAction::Install => install(context, key, addon).await,
        AddonAction::Uninstall => uninstall(context, key, &addon).await,
        AddonAction::NoOp => {
            debug!(%key, "GPUAddon is being deleted without our finalizer");
            Ok(())
        }
    }
}

async fn install(context: &ContextData, key: &ObjectKey, mut addon: GpuAddon) -> AddonOperatorResult {
    let store = context.store();
    let previous = addon.status.clone();

    if !finalizer::has(addon.meta(), context.finalizer()) {
        match finalizer::add(store, key, addon.meta(), context.finalizer()).await {
            Ok(updated) => {
                debug!(%key, "finalizer added");
                addon = from_dynamic(&updated)?;
            }
            Err(e) => {
                return status::finish_pass(store, key, previous.as_ref(), Vec::new(), Err(e))
                    .await;
            }
        }
    }

    let outcome = pipeline::run(&context.addon, &context.resources, &context.cancel, &addon).await;
    // A cancelled pass skips the status write: its conditions are partial, and
    // the previous status stays in place until the next full pass replaces it.
    if matches!(outcome.error, Some(AddonOperatorError::Cancelled)) {
        info!(%key, "reconcile cancelled");
        return Err(AddonOperatorError::Cancelled);
    }

    let (conditions, result) = outcome.into_result();
    status::finish_pass(store, key, previous.as_ref(), conditions, result).await
}

/// Finalizer-gated teardown: children in reverse order, then the operator's own
/// CSV, then the finalizer.
async fn uninstall(context: &ContextData, key: &ObjectKey, addon: &GpuAddon) -> AddonOperatorResult {
    let store = context.store();
    let previous = addon.status.as_ref();

    let mut teardown = pipeline::teardown(&context.addon, &context.resources, &context.cancel).await;
    if teardown.is_cancelled() {
        info!(%key, "teardown cancelled");
        return Err(AddonOperatorError::Cancelled);
    }

    let conditions = teardown.conditions();
    if let Some(e) = teardown.take_error() {
        return status::finish_pass(store, key, previous, conditions, Err(e)).await;
    }

    if !teardown.complete() {
        let status = status::next_status(previous, conditions, AddonPhase::Uninstalling);
        status::patch_status(store, key, &status).await?;
        info!(%key, "waiting for managed resources to be deleted");
        return Err(AddonOperatorError::TeardownIncomplete);
    }

    if let Err(e) = delete_own_csv(context).await {
        return status::finish_pass(store, key, previous, conditions, Err(e)).await;
    }

    let status = status::next_status(previous, conditions, AddonPhase::Uninstalling);
    let updated = status::patch_status(store, key, &status).await?;
    finalizer::delete(store, key, &updated.metadata, context.finalizer()).await?;
    info!(%key, "teardown complete, finalizer removed");
    Ok(())
}

/// Removes the operator's own CSV so the lifecycle manager can finish uninstalling it.
async fn delete_own_csv(context: &ContextData) -> AddonOperatorResult {
    let settings = context.settings();
    let own = csv::csv_with_prefix(context.store(), &settings.addon_namespace, &settings.addon_id)
        .await?;
    match own {
        Some(own) => {
            let key = csv::csv_key(&own);
            let outcome = context.store().delete(&key).await?;
            info!(%key, ?outcome, "deleted add-on CSV");
        }
        None => debug!("add-on CSV already gone"),
    }
    Ok(())
}

/// Requeue delay after a failed pass. Conflicts retry quickly from a fresh read.
pub(crate) fn requeue_after(error: &AddonOperatorError) -> Duration {
    if error.is_conflict() {
        Duration::from_secs(1)
    } else {
        Duration::from_secs(5)
    }
}

pub fn on_error(addon: Arc<GpuAddon>, error: &AddonOperatorError, _context: Arc<ContextData>) -> Action {
    match error {
        AddonOperatorError::TeardownIncomplete | AddonOperatorError::Cancelled => {
            info!(name = %addon.name_any(), %error, "GPUAddon requeued")
        }
        _ => error!(name = %addon.name_any(), %error, "GPUAddon reconcile failed"),
    }
    Action::requeue(requeue_after(error))
}
