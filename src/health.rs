use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::info;

use crate::consumer::BrokerStatus;

async fn health_handler(State(status): State<BrokerStatus>) -> Response {
    if status.is_connected() {
        (StatusCode::OK, Json(json!({ "checksRun": true }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "checksRun": false })),
        )
            .into_response()
    }
}

pub fn routes(status: BrokerStatus) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(status)
}

/// Liveness endpoint reporting broker-connection status. The worker has no
/// other HTTP surface.
pub async fn serve(bind: SocketAddr, status: BrokerStatus) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind health listener on {}", bind))?;

    info!(%bind, "health endpoint listening");
    axum::serve(listener, routes(status))
        .await
        .context("health server failed")
}
