//! Drives an ordered list of resource reconcilers for one owner.

use addon_common::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::error::{AddonOperatorError, StepPhase};
use crate::resources::{ReconcileContext, ResourceReconciler};

use super::condition::{reason, Condition};

/// Result of one forward pass: every condition gathered before the pass ended, and the error that ended it early.
#[derive(Debug, Default)]
pub struct PassOutcome {
    pub conditions: Vec<Condition>,
    pub error: Option<AddonOperatorError>,
}

impl PassOutcome {
    pub fn into_result(self) -> (Vec<Condition>, Result<(), AddonOperatorError>) {
        let result = match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        };
        (self.conditions, result)
    }
}

/// Runs `reconcilers` in order. The first failure stops the pass.
pub async fn run<K: Send + Sync>(
    reconcilers: &[Box<dyn ResourceReconciler<K>>],
    ctx: &ReconcileContext,
    cancel: &CancellationToken,
    owner: &K,
) -> PassOutcome {
    let mut outcome = PassOutcome::default();

    for reconciler in reconcilers {
        if cancel.is_cancelled() {
            outcome.error = Some(AddonOperatorError::Cancelled);
            break;
        }

        let step = reconciler.name();
        match reconciler.reconcile(ctx, owner).await {
            Ok(conditions) => {
                debug!(step, "resource reconciled");
                outcome.conditions.extend(conditions);
            }
            Err(failure) => {
                warn!(step, error = %failure.error, "resource reconcile failed");
                outcome.conditions.extend(failure.conditions);
                outcome.error = Some(failure.error.in_step(step, StepPhase::Reconcile));
                break;
            }
        }
    }

    outcome
}

/// Per-resource result of a teardown pass, in teardown order.
#[derive(Debug, Default)]
pub struct Teardown {
    pub removed: Vec<(&'static str, bool)>,
    /// The step whose delete failed, which ended the pass.
    pub failed: Option<(&'static str, AddonOperatorError)>,
}

impl Teardown {
    pub fn complete(&self) -> bool {
        self.failed.is_none() && self.removed.iter().all(|(_, gone)| *gone)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.failed, Some((_, AddonOperatorError::Cancelled)))
    }

    /// One condition per visited resource: `Deleted` when gone, `DeletionPending`
    /// when still present, `DeleteFailed` for the step that errored.
    pub fn conditions(&self) -> Vec<Condition> {
        let removed = self.removed.iter().map(|(condition_type, gone)| {
            if *gone {
                Condition::success(condition_type, "resource deleted").with_reason(reason::DELETED)
            } else {
                Condition::failure(
                    condition_type,
                    reason::DELETION_PENDING,
                    "waiting for resource to be deleted",
                )
            }
        });
        let failed = self
            .failed
            .iter()
            .filter(|(_, error)| !matches!(error, AddonOperatorError::Cancelled))
            .map(|(condition_type, error)| {
                Condition::failure(
                    condition_type,
                    reason::DELETE_FAILED,
                    format!("failed to delete: {error}"),
                )
            });
        removed.chain(failed).collect()
    }

    /// Splits off the error that ended the pass, if any.
    pub fn take_error(&mut self) -> Option<AddonOperatorError> {
        self.failed.take().map(|(_, error)| error)
    }
}

/// Deletes the resources of `reconcilers` in reverse order. The first delete error ends the pass.
pub async fn teardown<K: Send + Sync>(
    reconcilers: &[Box<dyn ResourceReconciler<K>>],
    ctx: &ReconcileContext,
    cancel: &CancellationToken,
) -> Teardown {
    let mut teardown = Teardown::default();

    for reconciler in reconcilers.iter().rev() {
        let condition_type = reconciler.condition_type();
        if cancel.is_cancelled() {
            teardown.failed = Some((condition_type, AddonOperatorError::Cancelled));
            break;
        }

        let step = reconciler.name();
        match reconciler.delete(ctx).await {
            Ok(gone) => {
                debug!(step, gone, "resource delete");
                teardown.removed.push((condition_type, gone));
            }
            Err(error) => {
                warn!(step, %error, "resource delete failed");
                teardown.failed = Some((condition_type, error.in_step(step, StepPhase::Delete)));
                break;
            }
        }
    }

    teardown
}
