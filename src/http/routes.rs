//! HTTP facade for the room directory
//!
//! Room endpoints are thin pass-throughs to the session manager and are
//! mounted both at the root and under `/api`. The same server carries the
//! realtime WebSocket endpoint, health and Prometheus metrics.

use crate::error::RelayError;
use crate::fanout::ConnectionHub;
use crate::http::ws::ws_handler;
use crate::metrics::MetricsCollector;
use crate::service::health::{HealthCheck, HealthStatus};
use crate::session::SessionManager;
use crate::types::{CreateRoomRequest, RoomId};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

/// Shared state for every HTTP and WebSocket handler
#[derive(Clone)]
pub struct HttpState {
    pub manager: SessionManager,
    pub hub: Arc<ConnectionHub>,
    pub metrics: Arc<MetricsCollector>,
    pub service_name: String,
    /// Capacity of each connection's outbound queue
    pub outbound_queue_size: usize,
    pub is_running: Arc<RwLock<bool>>,
}

/// HTTP server for the relay
pub struct HttpServer {
    config: HttpServerConfig,
    state: HttpState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: HttpState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Bind and serve until [`HttpServer::stop`] is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid HTTP server address")?;

        let app = self.router();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("HTTP server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP server shutdown signal received");
            })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping HTTP server...");
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to HTTP server: {}", e);
        }
        Ok(())
    }
}

fn room_routes() -> Router<HttpState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/invite/{invite_code}", get(get_room_by_invite))
        .route("/rooms/{room_id}", get(get_room))
}

/// Build the full router
pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .merge(room_routes())
        .nest("/api", room_routes())
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Error response in the `{success: false, message}` shape
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        let status = match RelayError::from_anyhow(&error) {
            Some(RelayError::Validation { .. }) => StatusCode::BAD_REQUEST,
            Some(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            _ => {
                error!("Request failed: {:#}", error);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match RelayError::from_anyhow(&error) {
            Some(RelayError::Validation { reason }) => reason.clone(),
            _ => error.to_string(),
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "message": self.message })),
        )
            .into_response()
    }
}

async fn create_room(
    State(state): State<HttpState>,
    payload: std::result::Result<Json<CreateRoomRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError {
        status: StatusCode::BAD_REQUEST,
        message: rejection.body_text(),
    })?;

    let room = state.manager.create_room(request).await?;
    Ok(Json(json!({ "success": true, "room": room })))
}

async fn list_rooms(State(state): State<HttpState>) -> impl IntoResponse {
    let rooms = state.manager.list_rooms().await;
    Json(json!({ "success": true, "rooms": rooms }))
}

async fn get_room(
    State(state): State<HttpState>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let room_id: RoomId = room_id
        .parse()
        .map_err(|_| ApiError::not_found(format!("Room not found: {}", room_id)))?;
    let room = state.manager.get_room(room_id).await?;
    Ok(Json(json!({ "success": true, "room": room })))
}

async fn get_room_by_invite(
    State(state): State<HttpState>,
    Path(invite_code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let room = state.manager.get_room_by_invite(&invite_code).await?;
    Ok(Json(json!({ "success": true, "room": room })))
}

async fn health_handler(State(state): State<HttpState>) -> impl IntoResponse {
    debug!("Health check requested");

    let running = *state.is_running.read().await;
    match HealthCheck::check(&state.manager, &state.hub, &state.service_name, running).await {
        Ok(health) => {
            state.metrics.update_health_status(health.status.as_gauge());
            let code = if health.status == HealthStatus::Unhealthy {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::OK
            };
            (code, Json(json!(health)))
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "service": state.service_name })),
            )
        }
    }
}

async fn metrics_handler(State(state): State<HttpState>) -> Response {
    match crate::metrics::render(&state.metrics) {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}
