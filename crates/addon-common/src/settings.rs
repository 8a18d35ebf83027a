use std::collections::HashMap;

use config::Environment;
use serde::{Deserialize, Serialize};

use crate::error::AddonResult;

/// Where a managed resource's desired spec comes from.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SpecSource {
    /// Spec is built by the operator itself.
    #[default]
    Direct,
    /// Spec is the first `alm-examples` entry of the vendor CSV.
    CsvTemplate,
}

/// Immutable configuration snapshot, read once from the environment at start-up.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_nfd_csv_prefix")]
    pub nfd_csv_prefix: String,

    #[serde(default = "default_addon_namespace")]
    pub nfd_csv_namespace: String,

    #[serde(default = "default_gpu_csv_prefix")]
    pub gpu_csv_prefix: String,

    #[serde(default = "default_addon_namespace")]
    pub gpu_csv_namespace: String,

    #[serde(rename = "watch_namespace", default = "default_addon_namespace")]
    pub addon_namespace: String,

    #[serde(default = "default_addon_id")]
    pub addon_id: String,

    #[serde(default = "default_addon_label")]
    pub addon_label: String,

    #[serde(default = "default_cr_name")]
    pub cluster_policy_name: String,

    #[serde(default = "default_cr_name")]
    pub nfd_cr_name: String,

    #[serde(
        rename = "related_image_console_plugin",
        default = "default_console_plugin_image"
    )]
    pub console_plugin_image: String,

    #[serde(default = "default_pager_duty_secret_name")]
    pub pager_duty_secret_name: String,

    #[serde(default = "default_dead_mans_snitch_secret_name")]
    pub dead_mans_snitch_secret_name: String,

    #[serde(default)]
    pub nfd_spec_source: SpecSource,

    #[serde(default)]
    pub cluster_policy_spec_source: SpecSource,
}

impl Settings {
    /// Reads the settings from the process environment.
    pub fn from_env() -> AddonResult<Self> {
        Self::from_environment(Environment::default())
    }

    /// Reads the settings from an explicit set of variables instead of the process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> AddonResult<Self> {
        Self::from_environment(Environment::default().source(Some(vars)))
    }

    fn from_environment(env: Environment) -> AddonResult<Self> {
        let s = config::Config::builder().add_source(env).build()?;
        let cfg = s.try_deserialize()?;
        Ok(cfg)
    }

    /// Label carrying the operator version on the objects created by the bootstrap step.
    pub fn version_label(&self) -> String {
        format!("{}-version", self.addon_label)
    }

    /// Label that, set to `true` on the addon ConfigMap, requests the add-on's removal.
    pub fn delete_label(&self) -> String {
        format!("{}-delete", self.addon_label)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nfd_csv_prefix: default_nfd_csv_prefix(),
            nfd_csv_namespace: default_addon_namespace(),
            gpu_csv_prefix: default_gpu_csv_prefix(),
            gpu_csv_namespace: default_addon_namespace(),
            addon_namespace: default_addon_namespace(),
            addon_id: default_addon_id(),
            addon_label: default_addon_label(),
            cluster_policy_name: default_cr_name(),
            nfd_cr_name: default_cr_name(),
            console_plugin_image: default_console_plugin_image(),
            pager_duty_secret_name: default_pager_duty_secret_name(),
            dead_mans_snitch_secret_name: default_dead_mans_snitch_secret_name(),
            nfd_spec_source: SpecSource::Direct,
            cluster_policy_spec_source: SpecSource::Direct,
        }
    }
}

fn default_nfd_csv_prefix() -> String {
    "nfd".to_string()
}

fn default_gpu_csv_prefix() -> String {
    "gpu-operator-certified".to_string()
}

fn default_addon_namespace() -> String {
    "redhat-nvidia-gpu-addon".to_string()
}

fn default_addon_id() -> String {
    "nvidia-gpu-addon".to_string()
}

fn default_addon_label() -> String {
    "api.openshift.com/addon-nvidia-gpu-addon".to_string()
}

fn default_cr_name() -> String {
    "ocp-gpu-addon".to_string()
}

fn default_console_plugin_image() -> String {
    "quay.io/edge-infrastructure/console-plugin-nvidia-gpu@sha256:cec17462944cb2f800e7477101e0470c5f7a07998c012ef7470e14993ebebf40".to_string()
}

fn default_pager_duty_secret_name() -> String {
    "pagerduty".to_string()
}

fn default_dead_mans_snitch_secret_name() -> String {
    "deadmanssnitch".to_string()
}
