use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, ContainerPort, VolumeMount};
use serde_json::{json, Value};

use crate::error::AddonOperatorResult;
use crate::k8s::{kinds, set_controller_reference, set_field, ObjectKey};
use crate::operator::condition::Condition;
use crate::operator::crd::Monitoring;
use crate::resources::{
    delete_object, upsert, ReconcileContext, ReconcileFailure, ReconcileOutcome, ResourceReconciler,
};

use super::{child_key, KUBE_RBAC_PROXY_CONFIG, KUBE_RBAC_PROXY_PORT, PROMETHEUS_SERVING_CERT};

pub const CONDITION_TYPE: &str = "PrometheusDeployed";

const PROMETHEUS_NAME: &str = "gpuaddon-prometheus";
const KUBE_RBAC_PROXY_IMAGE: &str = "quay.io/openshift/origin-kube-rbac-proxy:4.10.0";

pub struct PrometheusReconciler;

fn key(ctx: &ReconcileContext) -> ObjectKey {
    child_key(kinds::prometheus(), &ctx.settings, PROMETHEUS_NAME)
}

fn kube_rbac_proxy() -> Container {
    let mount = |name: &str, path: &str| VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    };
    let mut args = vec![format!(
        "--secure-listen-address=0.0.0.0:{KUBE_RBAC_PROXY_PORT}"
    )];
    args.extend(
        [
            "--upstream=http://127.0.0.1:9090/",
            "--logtostderr=true",
            "--v=10",
            "--tls-cert-file=/etc/tls-secret/tls.crt",
            "--tls-private-key-file=/etc/tls-secret/tls.key",
            "--client-ca-file=/var/run/secrets/kubernetes.io/serviceaccount/service-ca.crt",
            "--config-file=/etc/kube-rbac-config/config-file.json",
        ]
        .map(String::from),
    );

    Container {
        name: "kube-rbac-proxy".to_string(),
        image: Some(KUBE_RBAC_PROXY_IMAGE.to_string()),
        args: Some(args),
        ports: Some(vec![ContainerPort {
            name: Some("https".to_string()),
            container_port: KUBE_RBAC_PROXY_PORT,
            ..Default::default()
        }]),
        volume_mounts: Some(vec![
            mount("serving-cert", "/etc/tls-secret"),
            mount("kube-rbac-config", "/etc/kube-rbac-config"),
        ]),
        ..Default::default()
    }
}

/// Prometheus listening on localhost only, reachable through the kube-rbac-proxy sidecar.
pub fn desired_spec(namespace: &str) -> AddonOperatorResult<Value> {
    let app_selector = json!({
        "matchExpressions": [{ "key": "app", "operator": "Exists" }],
    });
    let resources = json!({ "cpu": "1", "memory": "250Mi" });

    Ok(json!({
        "serviceAccountName": "prometheus-k8s",
        "serviceMonitorSelector": app_selector,
        "podMonitorSelector": app_selector,
        "ruleNamespaceSelector": app_selector,
        "enableAdminAPI": false,
        "listenLocal": true,
        "alerting": {
            "alertmanagers": [{
                "namespace": namespace,
                "name": "alertmanager-operated",
                "port": "web",
            }],
        },
        "resources": { "limits": resources, "requests": resources },
        "containers": [serde_json::to_value(kube_rbac_proxy())?],
        "volumes": [
            { "name": "serving-cert", "secret": { "secretName": PROMETHEUS_SERVING_CERT } },
            { "name": "kube-rbac-config", "configMap": { "name": KUBE_RBAC_PROXY_CONFIG } },
        ],
    }))
}

#[async_trait]
impl ResourceReconciler<Monitoring> for PrometheusReconciler {
    fn name(&self) -> &'static str {
        "Prometheus"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE
    }

    async fn reconcile(&self, ctx: &ReconcileContext, owner: &Monitoring) -> ReconcileOutcome {
        let spec = desired_spec(&ctx.settings.addon_namespace)
            .map_err(|e| ReconcileFailure::create(CONDITION_TYPE, e))?;

        upsert(ctx, CONDITION_TYPE, &key(ctx), |object| {
            set_controller_reference(owner, object)?;
            set_field(object, "spec", spec);
            Ok(())
        })
        .await?;

        Ok(vec![Condition::success(
            CONDITION_TYPE,
            "Prometheus deployed successfully",
        )])
    }

    async fn delete(&self, ctx: &ReconcileContext) -> AddonOperatorResult<bool> {
        delete_object(ctx, &key(ctx)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desired_spec() {
        let spec = desired_spec("gpu").unwrap();
        assert_eq!(spec["listenLocal"], true);
        assert_eq!(spec["alerting"]["alertmanagers"][0]["namespace"], "gpu");
        assert_eq!(
            spec["serviceMonitorSelector"]["matchExpressions"][0]["operator"],
            "Exists"
        );

        let proxy = &spec["containers"][0];
        assert_eq!(proxy["name"], "kube-rbac-proxy");
        assert_eq!(proxy["ports"][0]["containerPort"], 9339);
        assert_eq!(proxy["args"][0], "--secure-listen-address=0.0.0.0:9339");
        assert_eq!(proxy["volumeMounts"][1]["mountPath"], "/etc/kube-rbac-config");
        assert_eq!(
            spec["volumes"][1]["configMap"]["name"],
            "prometheus-kube-rbac-proxy-config"
        );
    }
}
