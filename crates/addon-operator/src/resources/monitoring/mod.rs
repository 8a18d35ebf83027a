//! Children of the Monitoring object, created in this order:
//! RBAC-proxy ConfigMap, Service, Prometheus, Alertmanager, AlertmanagerConfig.

pub mod alertmanager;
pub mod alertmanager_config;
pub mod prometheus;
pub mod prometheus_service;
pub mod rbac_proxy_config_map;

use addon_common::settings::Settings;
use kube::api::ApiResource;

use crate::k8s::ObjectKey;

/// Serving certificate secret shared by the Prometheus service and its proxy sidecar.
pub const PROMETHEUS_SERVING_CERT: &str = "prometheus-serving-cert-secret";
pub const KUBE_RBAC_PROXY_CONFIG: &str = "prometheus-kube-rbac-proxy-config";
pub const KUBE_RBAC_PROXY_PORT: i32 = 9339;

/// Monitoring children live next to the add-on, in the watch namespace.
fn child_key(resource: ApiResource, settings: &Settings, name: &str) -> ObjectKey {
    ObjectKey::namespaced(resource, &settings.addon_namespace, name)
}
