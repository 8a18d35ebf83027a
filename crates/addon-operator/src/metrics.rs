//! Operator metrics, exported in the Prometheus text format.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};

use crate::error::AddonOperatorResult;

pub const SUBSCRIPTION_INSTALLED: &str = "nvidia_gpuaddon_gpu_operator_subscription_installed";

pub type SharedMetrics = Arc<Metrics>;

#[derive(Debug, Clone)]
pub struct Metrics {
    subscription_installed: IntGauge,
    registry: Registry,
}

impl Metrics {
    pub fn new() -> AddonOperatorResult<Self> {
        let registry = Registry::new();
        let subscription_installed = IntGauge::new(
            SUBSCRIPTION_INSTALLED,
            "Reports whether the NVIDIA GPUAddon GPU Operator OLM Subscription is installed",
        )?;
        registry.register(Box::new(subscription_installed.clone()))?;

        Ok(Self {
            subscription_installed,
            registry,
        })
    }

    pub fn set_subscription_installed(&self, installed: bool) {
        self.subscription_installed.set(i64::from(installed));
    }

    pub fn subscription_installed(&self) -> i64 {
        self.subscription_installed.get()
    }

    pub fn export_text(&self) -> AddonOperatorResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

pub fn routes(metrics: SharedMetrics) -> Router {
    Router::new()
        .route("/metrics", get(export))
        .with_state(metrics)
}

async fn export(State(metrics): State<SharedMetrics>) -> (StatusCode, String) {
    match metrics.export_text() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_gauge() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.subscription_installed(), 0);

        metrics.set_subscription_installed(true);
        assert_eq!(metrics.subscription_installed(), 1);
        metrics.set_subscription_installed(false);
        assert_eq!(metrics.subscription_installed(), 0);
    }

    #[tokio::test]
    async fn test_export_lists_gauge() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.set_subscription_installed(true);

        let (code, body) = export(State(metrics)).await;
        assert_eq!(code, StatusCode::OK);
        assert!(body.contains(&format!("{SUBSCRIPTION_INSTALLED} 1")));
    }
}
