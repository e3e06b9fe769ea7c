//! HTTP transport: `POST /inventory` and `GET /health`.
//!
//! The handler accepts the same request body as `collect` and returns the
//! validated response. Credential values are used exactly as sent; `env:`
//! references are never resolved against the server's environment.

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cdp_inventory_core::models::InventoryRequest;
use cdp_inventory_core::validation::validate_response;
use cdp_inventory_core::InventoryAggregator;
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    aggregator: InventoryAggregator,
}

impl AppState {
    /// Wraps an aggregator for use by the handlers.
    pub const fn new(aggregator: InventoryAggregator) -> Self {
        Self { aggregator }
    }
}

/// Health check body
#[derive(Debug, Serialize)]
struct HealthCheck {
    status: &'static str,
    version: &'static str,
    platforms: Vec<String>,
}

/// Builds the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/inventory", post(inventory))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Binds `addr` and serves until Ctrl-C.
///
/// # Errors
/// Fails when the address cannot be bound or the server stops with an error.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", listener.local_addr().unwrap_or(addr));

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn inventory(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match InventoryRequest::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let response = match state.aggregator.run_request(request).await {
        Ok(response) => response,
        Err(e) if e.is_request_fatal() => {
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
        Err(e) => {
            error!("Inventory request failed: {e}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    match validate_response(&response) {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => {
            error!("Inventory output failed validation: {e}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "inventory output failed validation",
            )
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthCheck> {
    Json(HealthCheck {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        platforms: state
            .aggregator
            .registry()
            .platforms()
            .map(str::to_string)
            .collect(),
    })
}
