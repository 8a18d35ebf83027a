use addon_common::warn;
use kube::api::DynamicObject;
use serde_json::json;

use crate::error::{AddonOperatorError, AddonOperatorResult};
use crate::k8s::{ObjectKey, ObjectStore};

use super::condition::{carry_transition_times, Condition};
use super::crd::{AddonPhase, AddonStatus};

/// Condition types ending with this marker describe an in-progress update.
const UPDATE_MARKER: &str = "Update";

/// Phase of a pass that finished without error.
pub fn phase_for(conditions: &[Condition]) -> AddonPhase {
    if conditions.is_empty() {
        AddonPhase::Idle
    } else if conditions.iter().any(|c| c.type_.ends_with(UPDATE_MARKER)) {
        AddonPhase::Updating
    } else if conditions.iter().any(|c| !c.is_true()) {
        AddonPhase::Installing
    } else {
        AddonPhase::Ready
    }
}

/// Builds the status written at the end of a pass.
pub fn next_status(
    previous: Option<&AddonStatus>,
    conditions: Vec<Condition>,
    phase: AddonPhase,
) -> AddonStatus {
    let previous = previous.map(|s| s.conditions.as_slice()).unwrap_or_default();
    AddonStatus {
        phase,
        conditions: carry_transition_times(previous, conditions),
    }
}

/// Writes `status` with a merge patch of the status subresource.
///
/// Only the fields owned by the operator are sent, so other status writers are left alone.
pub async fn patch_status(
    store: &dyn ObjectStore,
    key: &ObjectKey,
    status: &AddonStatus,
) -> AddonOperatorResult<DynamicObject> {
    store.patch_status(key, &json!({ "status": status })).await
}

/// Ends a pass: writes the status for `result` and hands the pass error back.
///
/// A failed status write is reported only when the pass itself succeeded.
pub async fn finish_pass(
    store: &dyn ObjectStore,
    key: &ObjectKey,
    previous: Option<&AddonStatus>,
    conditions: Vec<Condition>,
    result: Result<(), AddonOperatorError>,
) -> AddonOperatorResult {
    let phase = match &result {
        Ok(()) => phase_for(&conditions),
        Err(_) => AddonPhase::Failed,
    };
    let status = next_status(previous, conditions, phase);
    let written = patch_status(store, key, &status).await.map(|_| ());

    match (result, written) {
        (Err(error), Err(status_error)) => {
            warn!(%key, error = %status_error, "failed to record failed status");
            Err(error)
        }
        (Err(error), Ok(())) => Err(error),
        (Ok(()), written) => written,
    }
}
