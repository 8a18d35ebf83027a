use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::AddonOperatorResult;
use crate::k8s::{kinds, set_controller_reference, set_field, ObjectKey};
use crate::operator::condition::Condition;
use crate::operator::crd::Monitoring;
use crate::resources::{delete_object, upsert, ReconcileContext, ReconcileOutcome, ResourceReconciler};

use super::child_key;

pub const CONDITION_TYPE: &str = "AlertmanagerDeployed";

const ALERTMANAGER_NAME: &str = "gpuaddon-alertmanager";

pub struct AlertmanagerReconciler;

fn key(ctx: &ReconcileContext) -> ObjectKey {
    child_key(kinds::alertmanager(), &ctx.settings, ALERTMANAGER_NAME)
}

/// Three replicas spread across nodes.
pub fn desired_spec() -> Value {
    let resources = json!({ "cpu": "100m", "memory": "200Mi" });
    json!({
        "replicas": 3,
        "resources": { "limits": resources, "requests": resources },
        "topologySpreadConstraints": [{
            "maxSkew": 1,
            "labelSelector": { "matchLabels": { "app": "alertmanager" } },
            "whenUnsatisfiable": "ScheduleAnyway",
            "topologyKey": "kubernetes.io/hostname",
        }],
    })
}

#[async_trait]
impl ResourceReconciler<Monitoring> for AlertmanagerReconciler {
    fn name(&self) -> &'static str {
        "Alertmanager"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE
    }

    async fn reconcile(&self, ctx: &ReconcileContext, owner: &Monitoring) -> ReconcileOutcome {
        upsert(ctx, CONDITION_TYPE, &key(ctx), |object| {
            set_controller_reference(owner, object)?;
            set_field(object, "spec", desired_spec());
            Ok(())
        })
        .await?;

        Ok(vec![Condition::success(
            CONDITION_TYPE,
            "Alertmanager deployed successfully",
        )])
    }

    async fn delete(&self, ctx: &ReconcileContext) -> AddonOperatorResult<bool> {
        delete_object(ctx, &key(ctx)).await
    }
}
