pub mod condition;
pub mod crd;
mod finalizer;
pub mod jumpstart;
pub mod monitoring;
pub mod pipeline;
pub mod reconcile;
pub mod status;
pub mod uninstall;

use std::fmt;
use std::sync::Arc;

use addon_common::settings::Settings;
use addon_common::{debug, info, warn};
use crd::{GpuAddon, Monitoring};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{ApiResource, DynamicObject};
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, Resource};
use reconcile::ContextData;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::AddonOperatorResult;
use crate::health::{self, SharedHealthState};
use crate::k8s::{kinds, KubeStore, ObjectStore};
use crate::metrics::{self, Metrics, SharedMetrics};

/// Manager flags.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub metrics_bind_address: String,
    pub health_probe_bind_address: String,
    pub leader_elect: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            metrics_bind_address: ":8080".to_string(),
            health_probe_bind_address: ":8081".to_string(),
            leader_elect: false,
        }
    }
}

/// Runs the bootstrap step, then every controller until a shutdown signal arrives.
pub async fn operator(options: RunOptions, settings: Settings) -> AddonOperatorResult<()> {
    if options.leader_elect {
        warn!("leader election is not supported, assuming a single replica");
    }
    let metrics_address = health::parse_bind_address(&options.metrics_bind_address)?;
    let health_address = health::parse_bind_address(&options.health_probe_bind_address)?;
    let metrics: SharedMetrics = Arc::new(Metrics::new()?);

    let settings = Arc::new(settings);
    let kubernetes_client = Client::try_default().await?;
    let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(kubernetes_client.clone()));

    jumpstart::jumpstart(store.as_ref(), &settings).await?;

    let cancel = CancellationToken::new();
    let context: Arc<ContextData> = Arc::new(ContextData::new(
        store,
        settings.clone(),
        metrics.clone(),
        cancel.clone(),
    ));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
        }
        shutdown.cancel();
    });

    let health_state = SharedHealthState::default();
    let probes = health_address.map(|address| {
        tokio::spawn(health::serve(
            address,
            health::routes(health_state.clone()),
            cancel.clone(),
        ))
    });
    let exporter = metrics_address.map(|address| {
        tokio::spawn(health::serve(address, metrics::routes(metrics), cancel.clone()))
    });

    health_state.set_ready(true);
    info!(version = crate::version::version(), namespace = %settings.addon_namespace, "starting controllers");
    tokio::join!(
        addon_controller(kubernetes_client.clone(), &settings, context.clone()),
        monitoring_controller(kubernetes_client.clone(), &settings, context.clone()),
        uninstall_controller(kubernetes_client, &settings, context),
    );
    health_state.set_ready(false);
    cancel.cancel();

    for server in [probes, exporter].into_iter().flatten() {
        server.await.map_err(anyhow::Error::from)??;
    }
    info!("controllers stopped");
    Ok(())
}

/// Custom-resource children of a GPUAddon, watched dynamically.
fn addon_owned_kinds() -> Vec<ApiResource> {
    vec![kinds::subscription(), kinds::node_feature_discovery()]
}

/// Custom-resource children of a Monitoring object, watched dynamically.
fn monitoring_owned_kinds() -> Vec<ApiResource> {
    vec![
        kinds::prometheus(),
        kinds::alertmanager(),
        kinds::alertmanager_config(),
    ]
}

fn owns_kinds<K>(
    mut controller: Controller<K>,
    client: &Client,
    namespace: &str,
    owned: Vec<ApiResource>,
) -> Controller<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
{
    for resource in owned {
        let api = Api::<DynamicObject>::namespaced_with(client.clone(), namespace, &resource);
        controller = controller.owns_with(api, resource, watcher::Config::default());
    }
    controller
}

async fn addon_controller(client: Client, settings: &Settings, context: Arc<ContextData>) {
    let namespace = &settings.addon_namespace;
    let crd_api: Api<GpuAddon> = Api::namespaced(client.clone(), namespace);
    let shutdown = context.cancel.clone();

    let controller = Controller::new(crd_api, watcher::Config::default())
        .owns(
            Api::<Deployment>::namespaced(client.clone(), namespace),
            watcher::Config::default(),
        )
        .owns(
            Api::<Service>::namespaced(client.clone(), namespace),
            watcher::Config::default(),
        );
    owns_kinds(controller, &client, namespace, addon_owned_kinds())
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(reconcile::reconcile, reconcile::on_error, context)
        .for_each(|recon_result| async move {
            match recon_result {
                Ok((addon, _action)) => debug!(%addon, "GPUAddon reconciled"),
                Err(err) => debug!(error = %err, "GPUAddon reconcile did not complete"),
            }
        })
        .await;
}

async fn monitoring_controller(client: Client, settings: &Settings, context: Arc<ContextData>) {
    let namespace = &settings.addon_namespace;
    let crd_api: Api<Monitoring> = Api::namespaced(client.clone(), namespace);
    let shutdown = context.cancel.clone();

    let controller = Controller::new(crd_api, watcher::Config::default())
        .owns(
            Api::<ConfigMap>::namespaced(client.clone(), namespace),
            watcher::Config::default(),
        )
        .owns(
            Api::<Service>::namespaced(client.clone(), namespace),
            watcher::Config::default(),
        );
    owns_kinds(controller, &client, namespace, monitoring_owned_kinds())
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(monitoring::reconcile, monitoring::on_error, context)
        .for_each(|recon_result| async move {
            match recon_result {
                Ok((monitoring, _action)) => debug!(%monitoring, "Monitoring reconciled"),
                Err(err) => debug!(error = %err, "Monitoring reconcile did not complete"),
            }
        })
        .await;
}

async fn uninstall_controller(client: Client, settings: &Settings, context: Arc<ContextData>) {
    let config_map_api: Api<ConfigMap> = Api::namespaced(client, &settings.addon_namespace);
    let only_addon = watcher::Config::default().fields(&format!("metadata.name={}", settings.addon_id));
    let shutdown = context.cancel.clone();

    Controller::new(config_map_api, only_addon)
        .graceful_shutdown_on(shutdown.cancelled_owned())
        .run(uninstall::reconcile, uninstall::on_error, context)
        .for_each(|recon_result| async move {
            if let Err(err) = recon_result {
                debug!(error = %err, "uninstall trigger did not complete");
            }
        })
        .await;
}
