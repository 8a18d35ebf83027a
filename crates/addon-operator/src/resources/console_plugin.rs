//! The NVIDIA GPU console plugin: Deployment, Service, ConsolePlugin CR and
//! its registration with the cluster console.

use std::collections::BTreeMap;

use addon_common::settings::Settings;
use addon_common::info;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, PodSpec, PodTemplateSpec,
    ResourceRequirements, SecretVolumeSource, SecurityContext, ServicePort, ServiceSpec, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use serde_json::{json, Value};

use crate::error::{AddonOperatorError, AddonOperatorResult};
use crate::k8s::platform::version_at_least;
use crate::k8s::upsert::contains;
use crate::k8s::{
    kinds, merge_field, set_controller_reference, set_field, set_field_if_drifted, ObjectKey,
};
use crate::operator::condition::{reason, Condition, ConditionStatus};
use crate::operator::crd::GpuAddon;

use super::{delete_object, upsert, ReconcileContext, ReconcileFailure, ReconcileOutcome, ResourceReconciler};

pub const CONDITION_TYPE: &str = "ConsolePluginDeployed";

pub const PLUGIN_NAME: &str = "console-plugin-nvidia-gpu";
const MINIMUM_PLATFORM: &str = "4.10";
const CONSOLE_NAME: &str = "cluster";
const SERVING_CERT: &str = "plugin-serving-cert";
const SERVING_CERT_ANNOTATION: &str = "service.alpha.openshift.io/serving-cert-secret-name";
const NGINX_CONF: &str = "nginx-conf";
const PORT: i32 = 9443;
const DEFAULT_MODE: i32 = 420;

pub struct ConsolePluginReconciler;

fn deployment_key(settings: &Settings) -> ObjectKey {
    ObjectKey::namespaced(kinds::deployment(), &settings.addon_namespace, PLUGIN_NAME)
}

fn service_key(settings: &Settings) -> ObjectKey {
    ObjectKey::namespaced(kinds::service(), &settings.addon_namespace, PLUGIN_NAME)
}

fn plugin_key() -> ObjectKey {
    ObjectKey::cluster(kinds::console_plugin(), PLUGIN_NAME)
}

fn console_key() -> ObjectKey {
    ObjectKey::cluster(kinds::console(), CONSOLE_NAME)
}

fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), PLUGIN_NAME.to_string())])
}

fn quantities(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ])
}

pub fn deployment_spec(image: &str) -> DeploymentSpec {
    let quarter = IntOrString::String("25%".to_string());
    let container = Container {
        name: PLUGIN_NAME.to_string(),
        image: Some(image.to_string()),
        image_pull_policy: Some("Always".to_string()),
        ports: Some(vec![ContainerPort {
            container_port: PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: Some(ResourceRequirements {
            requests: Some(quantities("10m", "100Mi")),
            limits: Some(quantities("20m", "200Mi")),
            ..Default::default()
        }),
        security_context: Some(SecurityContext {
            allow_privilege_escalation: Some(true),
            run_as_non_root: Some(true),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: SERVING_CERT.to_string(),
            read_only: Some(true),
            mount_path: "/var/serving-cert".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    DeploymentSpec {
        selector: LabelSelector {
            match_labels: Some(labels()),
            ..Default::default()
        },
        strategy: Some(DeploymentStrategy {
            type_: Some("RollingUpdate".to_string()),
            rolling_update: Some(RollingUpdateDeployment {
                max_unavailable: Some(quarter.clone()),
                max_surge: Some(quarter),
            }),
        }),
        template: PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(labels()),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: vec![container],
                volumes: Some(vec![
                    Volume {
                        name: SERVING_CERT.to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: Some(SERVING_CERT.to_string()),
                            default_mode: Some(DEFAULT_MODE),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    Volume {
                        name: NGINX_CONF.to_string(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: NGINX_CONF.to_string(),
                            default_mode: Some(DEFAULT_MODE),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                ]),
                restart_policy: Some("Always".to_string()),
                dns_policy: Some("ClusterFirst".to_string()),
                ..Default::default()
            }),
        },
        ..Default::default()
    }
}

pub fn service_spec() -> ServiceSpec {
    ServiceSpec {
        ports: Some(vec![ServicePort {
            name: Some(format!("{PORT}-tcp")),
            protocol: Some("TCP".to_string()),
            port: PORT,
            target_port: Some(IntOrString::Int(PORT)),
            ..Default::default()
        }]),
        selector: Some(labels()),
        type_: Some("ClusterIP".to_string()),
        ..Default::default()
    }
}

pub fn plugin_spec(namespace: &str) -> Value {
    json!({
        "displayName": "Console Plugin NVIDIA GPU Template",
        "service": {
            "name": PLUGIN_NAME,
            "namespace": namespace,
            "port": PORT,
            "basePath": "/",
        },
    })
}

/// Plugin list of the cluster console with ours appended, or `None` when it is already listed.
fn with_plugin(console: &Value) -> Option<Vec<Value>> {
    let mut plugins = console
        .pointer("/spec/plugins")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if plugins.iter().any(|p| p.as_str() == Some(PLUGIN_NAME)) {
        return None;
    }
    plugins.push(Value::from(PLUGIN_NAME));
    Some(plugins)
}

impl ConsolePluginReconciler {
    async fn enable(&self, ctx: &ReconcileContext, owner: &GpuAddon) -> Result<(), ReconcileFailure> {
        let settings = &ctx.settings;

        let spec = serde_json::to_value(deployment_spec(&settings.console_plugin_image))
            .map_err(|e| ReconcileFailure::create(CONDITION_TYPE, e.into()))?;
        upsert(ctx, CONDITION_TYPE, &deployment_key(settings), |object| {
            set_controller_reference(owner, object)?;
            object.labels_mut().extend(labels());
            set_field_if_drifted(object, "spec", spec);
            Ok(())
        })
        .await?;

        let spec = serde_json::to_value(service_spec())
            .map_err(|e| ReconcileFailure::create(CONDITION_TYPE, e.into()))?;
        upsert(ctx, CONDITION_TYPE, &service_key(settings), |object| {
            set_controller_reference(owner, object)?;
            object
                .annotations_mut()
                .insert(SERVING_CERT_ANNOTATION.to_string(), SERVING_CERT.to_string());
            if !object.data.get("spec").is_some_and(|current| contains(current, &spec)) {
                merge_field(object, "spec", spec);
            }
            Ok(())
        })
        .await?;

        let spec = plugin_spec(&settings.addon_namespace);
        upsert(ctx, CONDITION_TYPE, &plugin_key(), |object| {
            set_field(object, "spec", spec);
            Ok(())
        })
        .await?;

        self.register_with_console(ctx).await
    }

    async fn register_with_console(&self, ctx: &ReconcileContext) -> Result<(), ReconcileFailure> {
        let key = console_key();
        let console = ctx
            .store
            .get(&key)
            .await
            .and_then(|console| {
                console.ok_or_else(|| {
                    AddonOperatorError::Precondition(format!("{key} not found"))
                })
            })
            .map_err(|e| ReconcileFailure::lookup(CONDITION_TYPE, e))?;

        let Some(plugins) = with_plugin(&console.data) else {
            return Ok(());
        };
        let patch = json!({
            "metadata": { "resourceVersion": console.metadata.resource_version },
            "spec": { "plugins": plugins },
        });
        ctx.store
            .patch(&key, &patch)
            .await
            .map_err(|e| ReconcileFailure::create(CONDITION_TYPE, e))?;
        info!(plugin = PLUGIN_NAME, "plugin registered with the cluster console");
        Ok(())
    }

    /// Deletes the CR, the Service and the Deployment, in that order.
    async fn remove(&self, ctx: &ReconcileContext) -> AddonOperatorResult<bool> {
        let settings = &ctx.settings;
        let mut gone = true;
        for key in [plugin_key(), service_key(settings), deployment_key(settings)] {
            gone &= delete_object(ctx, &key).await?;
        }
        Ok(gone)
    }
}

#[async_trait]
impl ResourceReconciler<GpuAddon> for ConsolePluginReconciler {
    fn name(&self) -> &'static str {
        "ConsolePlugin"
    }

    fn condition_type(&self) -> &'static str {
        CONDITION_TYPE
    }

    async fn reconcile(&self, ctx: &ReconcileContext, owner: &GpuAddon) -> ReconcileOutcome {
        let supported = version_at_least(ctx.store(), MINIMUM_PLATFORM)
            .await
            .map_err(|e| ReconcileFailure::lookup(CONDITION_TYPE, e))?;
        if !supported {
            info!(plugin = PLUGIN_NAME, "console plugin needs platform {MINIMUM_PLATFORM} or newer");
            return Ok(vec![Condition::new(
                CONDITION_TYPE,
                ConditionStatus::True,
                reason::NOT_SUPPORTED,
                format!("ConsolePlugin is not supported when the platform version is below {MINIMUM_PLATFORM}"),
            )]);
        }

        if owner.spec.console_plugin_enabled {
            self.enable(ctx, owner).await?;
        } else {
            self.remove(ctx).await.map_err(|e| {
                let message = format!("failed to remove console plugin: {e}");
                ReconcileFailure::new(
                    Condition::failure(CONDITION_TYPE, reason::DELETE_FAILED, message),
                    e,
                )
            })?;
        }

        Ok(vec![Condition::success(
            CONDITION_TYPE,
            "ConsolePlugin deployed successfully",
        )])
    }

    async fn delete(&self, ctx: &ReconcileContext) -> AddonOperatorResult<bool> {
        self.remove(ctx).await
    }
}
