use std::fmt;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;

pub const API_GROUP: &str = "nvidia.addons.rh-ecosystem-edge.io";

/// The user-facing add-on object. Its status is derived by the operator on every pass.
#[derive(CustomResource, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "nvidia.addons.rh-ecosystem-edge.io",
    version = "v1alpha1",
    kind = "GPUAddon",
    root = "GpuAddon",
    plural = "gpuaddons",
    derive = "PartialEq",
    status = "AddonStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Console Plugin","type":"boolean","jsonPath":".spec.console_plugin_enabled"}"#
)]
pub struct GpuAddonSpec {
    /// If enabled, the add-on deploys the GPU console plugin. Absent means disabled.
    #[serde(default)]
    pub console_plugin_enabled: bool,

    /// Optional NVAIE pull secret name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nvaie_pullsecret: Option<String>,
}

/// Spec used when the operator creates the object itself.
impl Default for GpuAddonSpec {
    fn default() -> Self {
        Self {
            console_plugin_enabled: true,
            nvaie_pullsecret: None,
        }
    }
}

/// The observability stack object. It has no meaningful spec beyond its identity.
#[derive(CustomResource, Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema, Default)]
#[kube(
    group = "nvidia.addons.rh-ecosystem-edge.io",
    version = "v1alpha1",
    kind = "Monitoring",
    plural = "monitorings",
    derive = "PartialEq",
    status = "AddonStatus",
    namespaced,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
pub struct MonitoringSpec {}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, JsonSchema, Default)]
pub struct AddonStatus {
    #[serde(default)]
    pub phase: AddonPhase,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, JsonSchema, Default)]
pub enum AddonPhase {
    #[default]
    Idle,
    Installing,
    Ready,
    Updating,
    Uninstalling,
    Failed,
}

impl fmt::Display for AddonPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Installing => write!(f, "Installing"),
            Self::Ready => write!(f, "Ready"),
            Self::Updating => write!(f, "Updating"),
            Self::Uninstalling => write!(f, "Uninstalling"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}
