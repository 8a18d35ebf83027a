use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::error::AddonOperatorResult;
use crate::k8s::{kinds, merge_field, set_controller_reference, ObjectKey};
use crate::operator::condition::Condition;
use crate::operator::crd::Monitoring;
use crate::resources::{
    delete_object, upsert, ReconcileContext, ReconcileFailure, ReconcileOutcome, ResourceReconciler,
};

use super::{child_key, KUBE_RBAC_PROXY_PORT, PROMETHEUS_SERVING_CERT};

pub const CONDITION_TYPE: &str = "PrometheusServiceDeployed";

const SERVICE_NAME: &str = "gpuaddon-prometheus-service";
const SERVING_CERT_ANNOTATIONS: [&str; 2] = [
    "service.beta.openshift.io/serving-cert-secret-name",
    "service.alpha.openshift.io/serving-cert-secret-name",
];

/// TLS front of the Prometheus kube-rbac-proxy sidecar.
pub struct PrometheusServiceReconciler;

fn key(ctx: &ReconcileContext) -> ObjectKey {
    child_key(kinds::service(), &ctx.settings, SERVICE_NAME)
}

pub fn service_spec() -> ServiceSpec {
    ServiceSpec {
        ports: Some(vec![ServicePort {
            name: Some("https".to_string()),
            protocol: Some("TCP".to_string()),
            port: KUBE_RBAC_PROXY_PORT,
            target_port: Some(IntOrString::String("https".to_string())),
            ..Default::default()
        }]),
        selector: Some(BTreeMap::from([(
            "app.kubernetes.io/name".to_string(),
            "prometheus".to_string(),
        )])),
        ..Default::default()
    }
}

#[async_trait]
impl ResourceReconciler<Monitoring> for PrometheusServiceReconciler {
    fn name(&self) -> &'static str {
        "PrometheusService"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE
    }

    async fn reconcile(&self, ctx: &ReconcileContext, owner: &Monitoring) -> ReconcileOutcome {
        let spec = serde_json::to_value(service_spec())
            .map_err(|e| ReconcileFailure::create(CONDITION_TYPE, e.into()))?;

        upsert(ctx, CONDITION_TYPE, &key(ctx), |object| {
            set_controller_reference(owner, object)?;
            let annotations = object.metadata.annotations.get_or_insert_with(BTreeMap::new);
            for annotation in SERVING_CERT_ANNOTATIONS {
                annotations.insert(annotation.to_string(), PROMETHEUS_SERVING_CERT.to_string());
            }
            merge_field(object, "spec", spec);
            Ok(())
        })
        .await?;

        Ok(vec![Condition::success(
            CONDITION_TYPE,
            "Prometheus Service deployed successfully",
        )])
    }

    async fn delete(&self, ctx: &ReconcileContext) -> AddonOperatorResult<bool> {
        delete_object(ctx, &key(ctx)).await
    }
}
