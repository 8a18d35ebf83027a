use addon_common::settings::{Settings, SpecSource};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::AddonOperatorResult;
use crate::k8s::{csv, kinds, set_field, ObjectKey};
use crate::operator::condition::Condition;
use crate::operator::crd::GpuAddon;

use super::{delete_object, upsert, ReconcileContext, ReconcileFailure, ReconcileOutcome, ResourceReconciler};

pub const CONDITION_TYPE: &str = "ClusterPolicyDeployed";

/// The GPU operator's ClusterPolicy.
///
/// Cluster-scoped, so it carries no owner reference and is only ever removed
/// by an explicit delete.
pub struct ClusterPolicyReconciler;

fn key(settings: &Settings) -> ObjectKey {
    ObjectKey::cluster(kinds::cluster_policy(), &settings.cluster_policy_name)
}

pub fn desired_spec() -> Value {
    let enabled = json!({ "enabled": true });
    json!({
        "operator": { "defaultRuntime": "crio" },
        "psp": { "enabled": false },
        "toolkit": enabled,
        "dcgm": enabled,
        "dcgmExporter": enabled,
        "devicePlugin": enabled,
        "gfd": enabled,
        "migManager": enabled,
        "nodeStatusExporter": enabled,
        "mig": { "strategy": "single" },
        "validator": {
            "env": [{ "name": "WITH_WORKLOAD", "value": "true" }],
        },
        "driver": {
            "enabled": true,
            "use_ocp_driver_toolkit": true,
            "rdma": { "enabled": false },
            "licensingConfig": { "nlsEnabled": false },
        },
    })
}

#[async_trait]
impl ResourceReconciler<GpuAddon> for ClusterPolicyReconciler {
    fn name(&self) -> &'static str {
        "ClusterPolicy"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE
    }

    async fn reconcile(&self, ctx: &ReconcileContext, _owner: &GpuAddon) -> ReconcileOutcome {
        let settings = &ctx.settings;
        let spec = match settings.cluster_policy_spec_source {
            SpecSource::Direct => desired_spec(),
            SpecSource::CsvTemplate => csv::template_spec(
                ctx.store(),
                &settings.gpu_csv_namespace,
                &settings.gpu_csv_prefix,
            )
            .await
            .map_err(|e| ReconcileFailure::lookup(CONDITION_TYPE, e))?,
        };

        upsert(ctx, CONDITION_TYPE, &key(settings), |object| {
            set_field(object, "spec", spec);
            Ok(())
        })
        .await?;

        Ok(vec![Condition::success(
            CONDITION_TYPE,
            "ClusterPolicy deployed successfully",
        )])
    }

    async fn delete(&self, ctx: &ReconcileContext) -> AddonOperatorResult<bool> {
        delete_object(ctx, &key(&ctx.settings)).await
    }
}
