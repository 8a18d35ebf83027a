//! API resources for every kind the operator reads or writes.
//!
//! Vendor kinds have no typed bindings, so they are addressed through their
//! group/version/kind and handled as `DynamicObject`s.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::api::{ApiResource, GroupVersionKind};

use crate::operator::crd::{GpuAddon, Monitoring};

fn vendor(group: &str, version: &str, kind: &str, plural: &str) -> ApiResource {
    ApiResource::from_gvk_with_plural(&GroupVersionKind::gvk(group, version, kind), plural)
}

pub fn gpu_addon() -> ApiResource {
    ApiResource::erase::<GpuAddon>(&())
}

pub fn monitoring() -> ApiResource {
    ApiResource::erase::<Monitoring>(&())
}

pub fn deployment() -> ApiResource {
    ApiResource::erase::<Deployment>(&())
}

pub fn service() -> ApiResource {
    ApiResource::erase::<Service>(&())
}

pub fn config_map() -> ApiResource {
    ApiResource::erase::<ConfigMap>(&())
}

pub fn secret() -> ApiResource {
    ApiResource::erase::<Secret>(&())
}

pub fn node_feature_discovery() -> ApiResource {
    vendor(
        "nfd.openshift.io",
        "v1",
        "NodeFeatureDiscovery",
        "nodefeaturediscoveries",
    )
}

pub fn subscription() -> ApiResource {
    vendor("operators.coreos.com", "v1alpha1", "Subscription", "subscriptions")
}

pub fn cluster_service_version() -> ApiResource {
    vendor(
        "operators.coreos.com",
        "v1alpha1",
        "ClusterServiceVersion",
        "clusterserviceversions",
    )
}

/// Cluster-scoped.
pub fn cluster_policy() -> ApiResource {
    vendor("nvidia.com", "v1", "ClusterPolicy", "clusterpolicies")
}

/// Cluster-scoped.
pub fn console_plugin() -> ApiResource {
    vendor("console.openshift.io", "v1alpha1", "ConsolePlugin", "consoleplugins")
}

/// Cluster-scoped.
pub fn console() -> ApiResource {
    vendor("operator.openshift.io", "v1", "Console", "consoles")
}

/// Cluster-scoped.
pub fn cluster_version() -> ApiResource {
    vendor("config.openshift.io", "v1", "ClusterVersion", "clusterversions")
}

pub fn prometheus() -> ApiResource {
    vendor("monitoring.coreos.com", "v1", "Prometheus", "prometheuses")
}

pub fn alertmanager() -> ApiResource {
    vendor("monitoring.coreos.com", "v1", "Alertmanager", "alertmanagers")
}

pub fn alertmanager_config() -> ApiResource {
    vendor(
        "monitoring.coreos.com",
        "v1alpha1",
        "AlertmanagerConfig",
        "alertmanagerconfigs",
    )
}
