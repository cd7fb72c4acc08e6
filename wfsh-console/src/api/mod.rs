//! REST API implementation for the flowsheet console
//!
//! Renderer-facing HTTP surface. Mutation handlers resolve the current show
//! via show control, hand the intent to the reconciliation engine, and relay
//! the settled result; optimistic progress reaches renderers over SSE.

pub mod handlers;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, patch, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use wfsh_common::api::ErrorResponse;

use crate::backend::ShowControl;
use crate::error::Error;
use crate::flowsheet::FlowsheetEngine;
use crate::sse::SseBroadcaster;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Reconciliation engine
    pub engine: Arc<FlowsheetEngine>,
    /// SSE broadcaster for renderer connections
    pub broadcaster: SseBroadcaster,
    /// On-air status source
    pub show_control: Arc<dyn ShowControl>,
    /// Server port
    pub port: u16,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check (no prefix for health endpoint)
        .route("/health", get(health_check))
        // API v1 routes
        .nest(
            "/api/v1",
            Router::new()
                // Flowsheet state
                .route("/flowsheet", get(handlers::get_flowsheet))
                // Entry intents
                .route("/flowsheet/songs", post(handlers::add_song))
                .route("/flowsheet/messages", post(handlers::add_message))
                .route("/flowsheet/breakpoints", post(handlers::add_breakpoint))
                .route("/flowsheet/:id", patch(handlers::update_entry))
                .route("/flowsheet/:id", delete(handlers::remove_entry))
                .route("/flowsheet/:id/move", post(handlers::move_entry))
                // History pagination and reconciliation
                .route("/flowsheet/pages", post(handlers::load_more))
                .route("/flowsheet/resync", post(handlers::resync))
                // Local queue
                .route("/queue", get(handlers::get_queue))
                .route("/queue", post(handlers::queue_add))
                .route("/queue/reorder", post(handlers::queue_reorder))
                .route("/queue/:item_id", delete(handlers::queue_remove))
                .route("/queue/:item_id/promote", post(handlers::promote))
                // On-air status passthrough
                .route("/onair", get(handlers::get_onair))
                // SSE events
                .route("/events", get(handlers::sse_handler)),
        )
        .with_state(state)
        // Enable CORS for local renderer access
        .layer(CorsLayer::permissive())
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "module": "wfsh-console",
        "version": env!("CARGO_PKG_VERSION"),
        "port": state.port,
    }))
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Error::InvalidField(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new("invalid_field", e.to_string()),
            ),
            Error::Classification(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse::new("classification", e.to_string()),
            ),
            Error::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("not_found", msg),
            ),
            Error::OrderingConflict(msg) => (
                StatusCode::CONFLICT,
                ErrorResponse::new("ordering_conflict", msg),
            ),
            Error::InvalidState(msg) => (
                StatusCode::CONFLICT,
                ErrorResponse::new("invalid_state", msg),
            ),
            Error::BackendRequest {
                status,
                code,
                message,
            } => {
                // Backend rejections keep their status so renderers can tell
                // a validation refusal from an unreachable backend.
                let http = status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .filter(|s| s.is_client_error())
                    .unwrap_or(if code == "timeout" {
                        StatusCode::GATEWAY_TIMEOUT
                    } else {
                        StatusCode::BAD_GATEWAY
                    });
                (http, ErrorResponse::new(code, message))
            }
            Error::ChannelDisconnected => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new("channel_disconnected", "live update channel is down"),
            ),
            Error::Config(msg) | Error::Http(msg) | Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new("internal", msg),
            ),
        };

        (status, Json(body)).into_response()
    }
}
