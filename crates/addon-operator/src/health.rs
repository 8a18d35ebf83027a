//! Liveness and readiness probes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use addon_common::info;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::error::{AddonOperatorError, AddonOperatorResult};

pub type SharedHealthState = Arc<HealthState>;

/// Readiness flips to true once the controllers are running.
#[derive(Debug, Default)]
pub struct HealthState {
    ready: AtomicBool,
}

impl HealthState {
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

pub fn routes(health_state: SharedHealthState) -> Router {
    let router = axum::Router::new();
    router
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(health_state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(health_state): State<SharedHealthState>) -> StatusCode {
    if health_state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Parses a manager-style bind address. A bare `:port` binds every interface
/// and `0` disables the endpoint.
pub fn parse_bind_address(address: &str) -> AddonOperatorResult<Option<SocketAddr>> {
    if address == "0" {
        return Ok(None);
    }
    let address = match address.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => address.to_string(),
    };
    address
        .parse()
        .map(Some)
        .map_err(|_| AddonOperatorError::InvalidAddress(address))
}

/// Serves `router` until `cancel` fires.
pub async fn serve(address: SocketAddr, router: Router, cancel: CancellationToken) -> AddonOperatorResult {
    let listener = TcpListener::bind(address).await?;
    info!(%address, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}
