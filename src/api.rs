//! HTTP remote-control API.
//!
//! Serves the mobile/web remote surface: volume snapshot, manual override
//! submission, media keys, and a live SSE stream of per-cycle updates.
//! Default port: 5195.

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::DeckConfig;
use crate::drivers::{MediaControl, MediaKey};
use crate::reconcile::OverrideHandle;
use crate::router::DeckSnapshot;

/// Shared state for API handlers.
pub struct ApiState {
    /// Last published per-cycle snapshot.
    pub snapshot: Arc<parking_lot::RwLock<DeckSnapshot>>,
    /// Active configuration.
    pub config: Arc<tokio::sync::RwLock<DeckConfig>>,
    /// Override queue into the reconciliation loop.
    pub overrides: OverrideHandle,
    /// Media-control collaborator.
    pub media: Arc<dyn MediaControl>,
    /// Broadcast channel for snapshot updates.
    pub update_tx: broadcast::Sender<DeckSnapshot>,
}

/// Request body for submitting a manual override.
#[derive(Debug, Deserialize)]
pub struct SetVolumeRequest {
    pub slider: usize,
    /// Raw value in the 0-1023 reading domain.
    pub value: u16,
}

/// API error response.
#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

/// Build the API router.
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/volumes", get(get_volumes))
        .route("/api/volume", post(set_volume))
        .route("/api/config", get(get_config))
        .route("/api/media/:key", post(media_key))
        .route("/api/events", get(events))
        .route("/api/health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /api/volumes - current committed/actual values and override flags
async fn get_volumes(State(state): State<Arc<ApiState>>) -> Json<DeckSnapshot> {
    Json(state.snapshot.read().clone())
}

/// POST /api/volume - pin a slider to a value until the deck moves
async fn set_volume(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<SetVolumeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .overrides
        .add_override(req.slider, req.value)
        .map_err(|e| ApiError {
            error: e.to_string(),
        })?;

    info!("Override queued: slider {} -> {}", req.slider, req.value);

    Ok(Json(serde_json::json!({
        "ok": true,
        "slider": req.slider,
        "value": req.value
    })))
}

/// GET /api/config - the active configuration
async fn get_config(State(state): State<Arc<ApiState>>) -> Json<DeckConfig> {
    Json(state.config.read().await.clone())
}

/// POST /api/media/:key - forward a media key
async fn media_key(
    Path(key): Path<String>,
    State(state): State<Arc<ApiState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(key) = parse_media_key(&key) else {
        return Err(ApiError {
            error: format!(
                "Unknown media key '{}' (expected play-pause, next, previous or stop)",
                key
            ),
        });
    };

    if let Err(e) = state.media.media_key(key).await {
        warn!("Media key {} failed: {}", key.name(), e);
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}

fn parse_media_key(key: &str) -> Option<MediaKey> {
    match key {
        "play-pause" => Some(MediaKey::PlayPause),
        "next" => Some(MediaKey::Next),
        "previous" => Some(MediaKey::Previous),
        "stop" => Some(MediaKey::Stop),
        _ => None,
    }
}

/// GET /api/events - SSE stream of per-cycle snapshot updates
async fn events(
    State(state): State<Arc<ApiState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.update_tx.subscribe()).filter_map(|update| {
        // A lagged subscriber just skips to the next snapshot.
        update
            .ok()
            .and_then(|snapshot| Event::default().json_data(&snapshot).ok())
            .map(Ok::<_, Infallible>)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /api/health - health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// Start the API server.
pub async fn start_server(state: Arc<ApiState>, port: u16) -> Result<()> {
    let router = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting remote API server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
