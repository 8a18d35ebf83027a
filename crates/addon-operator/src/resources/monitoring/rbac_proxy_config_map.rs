use async_trait::async_trait;
use serde_json::json;

use crate::error::AddonOperatorResult;
use crate::k8s::{kinds, set_controller_reference, set_field, ObjectKey};
use crate::operator::condition::Condition;
use crate::operator::crd::Monitoring;
use crate::resources::{delete_object, upsert, ReconcileContext, ReconcileOutcome, ResourceReconciler};

use super::{child_key, KUBE_RBAC_PROXY_CONFIG};

pub const CONDITION_TYPE: &str = "PrometheusKubeRbacProxyConfigMapDeployed";

const CONFIG_FILE: &str = "config-file.json";

/// kube-rbac-proxy authorization config: only GETs of the metrics and federation endpoints.
pub struct RbacProxyConfigMapReconciler;

fn key(ctx: &ReconcileContext) -> ObjectKey {
    child_key(kinds::config_map(), &ctx.settings, KUBE_RBAC_PROXY_CONFIG)
}

pub fn config_file() -> String {
    json!({
        "authorization": {
            "static": [
                { "path": "/metrics", "resourceRequest": false, "verb": "get" },
                { "path": "/federate", "resourceRequest": false, "verb": "get" },
            ],
        },
    })
    .to_string()
}

#[async_trait]
impl ResourceReconciler<Monitoring> for RbacProxyConfigMapReconciler {
    fn name(&self) -> &'static str {
        "PrometheusKubeRbacProxyConfigMap"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE
    }

    async fn reconcile(&self, ctx: &ReconcileContext, owner: &Monitoring) -> ReconcileOutcome {
        upsert(ctx, CONDITION_TYPE, &key(ctx), |object| {
            set_controller_reference(owner, object)?;
            set_field(object, "data", json!({ CONFIG_FILE: config_file() }));
            Ok(())
        })
        .await?;

        Ok(vec![Condition::success(
            CONDITION_TYPE,
            "Prometheus kube-rbac-proxy ConfigMap deployed successfully",
        )])
    }

    async fn delete(&self, ctx: &ReconcileContext) -> AddonOperatorResult<bool> {
        delete_object(ctx, &key(ctx)).await
    }
}
