//! Orchestrator for the Monitoring object and its observability stack.
//!
//! Same pass structure as the GPUAddon orchestrator. There is no finalizer:
//! children are owned by the Monitoring object, and a deletion timestamp seen
//! during a pass only triggers the reverse-order deletes.

use std::sync::Arc;

use addon_common::{debug, error, info};
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::instrument;

use crate::error::{AddonOperatorError, AddonOperatorResult};
use crate::k8s::{from_dynamic, ObjectKey};

use super::crd::{AddonPhase, Monitoring};
use super::reconcile::{requeue_after, ContextData};
use super::{pipeline, status};

#[instrument(skip_all, fields(name = %monitoring.name_any(), namespace = ?monitoring.namespace()))]
pub async fn reconcile(
    monitoring: Arc<Monitoring>,
    context: Arc<ContextData>,
) -> AddonOperatorResult<Action> {
    let key = ObjectKey::of(monitoring.as_ref());
    reconcile_monitoring(&context, &key).await?;
    Ok(Action::await_change())
}

pub async fn reconcile_monitoring(context: &ContextData, key: &ObjectKey) -> AddonOperatorResult {
    let store = context.store();
    let Some(object) = store.get(key).await? else {
        debug!(%key, "Monitoring is gone, nothing to do");
        return Ok(());
    };
    let monitoring: Monitoring = from_dynamic(&object)?;
    let previous = monitoring.status.as_ref();

    if monitoring.meta().deletion_timestamp.is_some() {
        let mut teardown =
            pipeline::teardown(&context.monitoring, &context.resources, &context.cancel).await;
        if teardown.is_cancelled() {
            return Err(AddonOperatorError::Cancelled);
        }

        let conditions = teardown.conditions();
        if let Some(e) = teardown.take_error() {
            return status::finish_pass(store, key, previous, conditions, Err(e)).await;
        }
        let complete = teardown.complete();
        let status = status::next_status(previous, conditions, AddonPhase::Uninstalling);
        match status::patch_status(store, key, &status).await {
            Err(e) if e.is_not_found() => debug!(%key, "Monitoring removed during teardown"),
            written => {
                written?;
            }
        }
        return if complete {
            info!(%key, "monitoring stack removed");
            Ok(())
        } else {
            Err(AddonOperatorError::TeardownIncomplete)
        };
    }

    let outcome =
        pipeline::run(&context.monitoring, &context.resources, &context.cancel, &monitoring).await;
    // A cancelled pass skips the status write: its conditions are partial, and
    // the previous status stays in place until the next full pass replaces it.
    if matches!(outcome.error, Some(AddonOperatorError::Cancelled)) {
        info!(%key, "reconcile cancelled");
        return Err(AddonOperatorError::Cancelled);
    }

    let (conditions, result) = outcome.into_result();
    status::finish_pass(store, key, previous, conditions, result).await
}

pub fn on_error(
    monitoring: Arc<Monitoring>,
    error: &AddonOperatorError,
    _context: Arc<ContextData>,
) -> Action {
    match error {
        AddonOperatorError::TeardownIncomplete | AddonOperatorError::Cancelled => {
            info!(name = %monitoring.name_any(), %error, "Monitoring requeued")
        }
        _ => error!(name = %monitoring.name_any(), %error, "Monitoring reconcile failed"),
    }
    Action::requeue(requeue_after(error))
}
