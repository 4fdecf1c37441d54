//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::cast::CastSnapshot;
use crate::controller::{ControllerSnapshot, ControllerUpdate};
use crate::error::BridgeResult;

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectDeviceRequest {
    device_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectZoneRequest {
    zone_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectCoreRequest {
    core_id: String,
}

/// Combined snapshot of both sides of the bridge.
#[derive(Serialize)]
pub struct StatusResponse {
    pub controller: ControllerSnapshot,
    pub cast: CastSnapshot,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(get_status))
        .route("/api/cast/select", post(select_device))
        .route("/api/cast/refresh", post(refresh_discovery))
        .route("/api/zones/select", post(select_zone))
        .route("/api/cores/select", post(select_core))
        .route("/api/controller/events", post(ingest_controller_event))
        .route("/images/{id}", get(serve_image))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        controller: state.controller.snapshot(),
        cast: state.cast.snapshot(),
    })
}

async fn select_device(
    State(state): State<AppState>,
    Json(request): Json<SelectDeviceRequest>,
) -> BridgeResult<Json<serde_json::Value>> {
    state.cast.select_device(&request.device_id).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn refresh_discovery(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.cast.refresh_discovery();
    Json(json!({ "ok": true }))
}

async fn select_zone(
    State(state): State<AppState>,
    Json(request): Json<SelectZoneRequest>,
) -> BridgeResult<Json<serde_json::Value>> {
    state.controller.select_zone(&request.zone_id)?;
    Ok(Json(json!({ "ok": true })))
}

async fn select_core(
    State(state): State<AppState>,
    Json(request): Json<SelectCoreRequest>,
) -> BridgeResult<Json<serde_json::Value>> {
    state.controller.select_core(&request.core_id)?;
    Ok(Json(json!({ "ok": true })))
}

/// Ingest endpoint for the controller integration's event stream.
async fn ingest_controller_event(
    State(state): State<AppState>,
    Json(update): Json<ControllerUpdate>,
) -> Json<serde_json::Value> {
    state.controller.apply(update).await;
    Json(json!({ "ok": true }))
}

/// Serves a hosted image with a short public cache window.
async fn serve_image(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.images.get_by_id(&id, Instant::now()) {
        Some((bytes, content_type)) => (
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, "public, max-age=300".to_string()),
            ],
            bytes,
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Image not found" })),
        )
            .into_response(),
    }
}
