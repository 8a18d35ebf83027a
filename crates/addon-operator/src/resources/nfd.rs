use addon_common::settings::{Settings, SpecSource};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::AddonOperatorResult;
use crate::k8s::platform::{platform_version, PlatformVersion};
use crate::k8s::{csv, kinds, set_controller_reference, set_field, ObjectKey};
use crate::operator::condition::Condition;
use crate::operator::crd::GpuAddon;

use super::{delete_object, upsert, ReconcileContext, ReconcileFailure, ReconcileOutcome, ResourceReconciler};

pub const CONDITION_TYPE: &str = "NodeFeatureDiscoveryDeployed";

const OPERAND_IMAGE: &str = "quay.io/openshift/origin-node-feature-discovery";
const SERVICE_PORT: u16 = 12000;
const WORKER_CONFIG: &str = "core:
  sleepInterval: 60s
sources:
  pci:
    deviceClassWhitelist:
    - \"0200\"
    - \"03\"
    - \"12\"
    deviceLabelFields:
    - \"vendor\"
";

/// The NodeFeatureDiscovery instance that labels GPU nodes.
pub struct NfdReconciler;

fn key(settings: &Settings) -> ObjectKey {
    ObjectKey::namespaced(
        kinds::node_feature_discovery(),
        &settings.addon_namespace,
        &settings.nfd_cr_name,
    )
}

/// NFD spec with the operand pinned to the platform release.
pub fn desired_spec(version: PlatformVersion) -> Value {
    json!({
        "operand": {
            "image": format!("{OPERAND_IMAGE}:{version}"),
            "imagePullPolicy": "Always",
            "servicePort": SERVICE_PORT,
        },
        "workerConfig": {
            "configData": WORKER_CONFIG,
        },
    })
}

#[async_trait]
impl ResourceReconciler<GpuAddon> for NfdReconciler {
    fn name(&self) -> &'static str {
        "NodeFeatureDiscovery"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE
    }

    async fn reconcile(&self, ctx: &ReconcileContext, owner: &GpuAddon) -> ReconcileOutcome {
        let settings = &ctx.settings;
        let spec = match settings.nfd_spec_source {
            SpecSource::Direct => platform_version(ctx.store()).await.map(desired_spec),
            SpecSource::CsvTemplate => {
                csv::template_spec(
                    ctx.store(),
                    &settings.nfd_csv_namespace,
                    &settings.nfd_csv_prefix,
                )
                .await
            }
        }
        .map_err(|e| ReconcileFailure::lookup(CONDITION_TYPE, e))?;

        upsert(ctx, CONDITION_TYPE, &key(settings), |object| {
            set_controller_reference(owner, object)?;
            set_field(object, "spec", spec);
            Ok(())
        })
        .await?;

        Ok(vec![Condition::success(
            CONDITION_TYPE,
            "NodeFeatureDiscovery deployed successfully",
        )])
    }

    async fn delete(&self, ctx: &ReconcileContext) -> AddonOperatorResult<bool> {
        delete_object(ctx, &key(&ctx.settings)).await
    }
}
