//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::response::{api_ok, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::{ChatcastError, ChatcastResult};
use crate::services::StreamEndProcessor;
use crate::surface::{CallbackAction, Command};
use crate::transport::TransportEvent;
use crate::types::{ChannelId, UserRef};

const SERVICE_ID: &str = "chatcast";

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CommandRequest {
    text: String,
    user: UserRef,
}

#[derive(Deserialize)]
struct CallbackRequest {
    data: String,
    user: UserRef,
}

/// How an enqueued source is admitted.
#[derive(Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum EnqueueMode {
    /// Resolve now, download, then queue.
    #[default]
    Query,
    /// Stream a URL directly.
    Stream,
    /// Queue metadata; resolve when it reaches the head.
    Deferred,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueRequest {
    query: String,
    user: UserRef,
    #[serde(default)]
    front: bool,
    #[serde(default)]
    origin: Option<ChannelId>,
    #[serde(default)]
    mode: EnqueueMode,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
struct StreamEndedRequest {
    channel: ChannelId,
    generation: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/channels", get(list_channels))
        .route("/api/channels/{id}", get(get_channel))
        .route("/api/channels/{id}/commands", post(handle_command))
        .route("/api/channels/{id}/callbacks", post(handle_callback))
        .route("/api/channels/{id}/enqueue", post(handle_enqueue))
        .route("/api/channels/{id}/skip", post(handle_skip))
        .route("/api/channels/{id}/stop", post(handle_stop))
        .route("/api/channels/{id}/pause", post(handle_pause))
        .route("/api/channels/{id}/resume", post(handle_resume))
        .route("/api/transport/stream-ended", post(handle_stream_ended))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let max_queue_size = state.config.read().max_queue_size;
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "channels": state.controller.channels().len(),
        "limits": {
            "maxQueueSize": max_queue_size
        }
    }))
}

async fn list_channels(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "channels": state.controller.channels() }))
}

async fn get_channel(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ChatcastResult<impl IntoResponse> {
    let snapshot = state
        .controller
        .snapshot(ChannelId(id))
        .await
        .ok_or_else(|| ChatcastError::ChannelNotFound(id.to_string()))?;
    Ok(api_success(snapshot))
}

/// Runs a chat command as if it had been typed in the channel.
async fn handle_command(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(payload): Json<CommandRequest>,
) -> ChatcastResult<impl IntoResponse> {
    let prefix = state.surface.prefix();
    let command = Command::parse(prefix, &payload.text).ok_or_else(|| {
        ChatcastError::InvalidRequest(format!("not a command: {}", payload.text))
    })?;
    let reply = state
        .surface
        .handle_command(ChannelId(id), payload.user, command)
        .await;
    Ok(api_success(reply))
}

/// Runs an inline button press.
async fn handle_callback(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(payload): Json<CallbackRequest>,
) -> ChatcastResult<impl IntoResponse> {
    let action = CallbackAction::parse(&payload.data).ok_or_else(|| {
        ChatcastError::InvalidRequest(format!("unknown callback: {}", payload.data))
    })?;
    let reply = state
        .surface
        .handle_callback(ChannelId(id), payload.user, action)
        .await;
    Ok(api_success(reply))
}

async fn handle_enqueue(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(payload): Json<EnqueueRequest>,
) -> ChatcastResult<impl IntoResponse> {
    let channel = ChannelId(id);
    let origin = payload.origin.unwrap_or(channel);
    let controller = &state.controller;
    let title = payload.title.as_deref();

    let result = match payload.mode {
        EnqueueMode::Query => {
            controller
                .enqueue_query(channel, origin, &payload.query, payload.user, payload.front)
                .await
        }
        EnqueueMode::Stream => {
            controller
                .enqueue_stream_url(channel, origin, &payload.query, title, payload.user, payload.front)
                .await
        }
        EnqueueMode::Deferred => {
            controller
                .enqueue_deferred(channel, origin, &payload.query, title, payload.user, payload.front)
                .await
        }
    }?;
    Ok(api_success(result))
}

async fn handle_skip(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ChatcastResult<impl IntoResponse> {
    let outcome = state.controller.skip(ChannelId(id)).await?;
    Ok(api_success(outcome))
}

async fn handle_stop(Path(id): Path<i64>, State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.controller.stop(ChannelId(id)).await)
}

async fn handle_pause(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ChatcastResult<impl IntoResponse> {
    state.controller.pause(ChannelId(id)).await?;
    Ok(api_ok())
}

async fn handle_resume(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ChatcastResult<impl IntoResponse> {
    state.controller.resume(ChannelId(id)).await?;
    Ok(api_ok())
}

/// Ingress for stream-end notifications from an out-of-process transport.
async fn handle_stream_ended(
    State(state): State<AppState>,
    Json(payload): Json<StreamEndedRequest>,
) -> impl IntoResponse {
    let event = TransportEvent::StreamEnded {
        channel: payload.channel,
        generation: payload.generation,
    };
    let outcome = StreamEndProcessor::process(&state.controller, event).await;
    api_success(outcome)
}
