//! HTTP request handlers
//!
//! Thin adapters between the HTTP surface and the reconciliation engine.
//! Mutation handlers block until the intent settles; the optimistic state is
//! visible over SSE in the meantime.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use wfsh_common::model::{Entry, EntryFieldUpdate, EntryId, QueueItem, ShowId};

use crate::api::AppState;
use crate::backend::OnAirStatus;
use crate::error::Error;
use crate::flowsheet::{FlowsheetSnapshot, MoveTarget, NewSong};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AddMessageRequest {
    message: String,
}

#[derive(Debug, Deserialize)]
pub struct AddBreakpointRequest {
    message: String,
    day: NaiveDate,
    time: NaiveTime,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    target: MoveTarget,
}

#[derive(Debug, Deserialize)]
pub struct QueueReorderRequest {
    from: usize,
    to: usize,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    queue: Vec<QueueItem>,
}

#[derive(Debug, Serialize)]
pub struct LoadMoreResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

// ============================================================================
// Flowsheet State
// ============================================================================

/// GET /flowsheet - Current sequence, queue, pagination and channel state
pub async fn get_flowsheet(State(state): State<AppState>) -> Json<FlowsheetSnapshot> {
    Json(state.engine.snapshot().await)
}

// ============================================================================
// Entry Intents
// ============================================================================

/// POST /flowsheet/songs - Add a song at the top of the current show
pub async fn add_song(
    State(state): State<AppState>,
    Json(req): Json<NewSong>,
) -> Result<Json<Entry>, Error> {
    let show_id = require_on_air(&state).await?;
    let entry = state.engine.add_song(show_id, req).await?;
    Ok(Json(entry))
}

/// POST /flowsheet/messages - Add a free-text message entry
pub async fn add_message(
    State(state): State<AppState>,
    Json(req): Json<AddMessageRequest>,
) -> Result<Json<Entry>, Error> {
    let show_id = require_on_air(&state).await?;
    let entry = state.engine.add_message(show_id, req.message).await?;
    Ok(Json(entry))
}

/// POST /flowsheet/breakpoints - Add a scheduling breakpoint
pub async fn add_breakpoint(
    State(state): State<AppState>,
    Json(req): Json<AddBreakpointRequest>,
) -> Result<Json<Entry>, Error> {
    let show_id = require_on_air(&state).await?;
    let entry = state
        .engine
        .add_breakpoint(show_id, req.message, req.day, req.time)
        .await?;
    Ok(Json(entry))
}

/// PATCH /flowsheet/:id - Update a single field on an entry
pub async fn update_entry(
    State(state): State<AppState>,
    Path(id): Path<EntryId>,
    Json(update): Json<EntryFieldUpdate>,
) -> Result<Json<Entry>, Error> {
    let entry = state.engine.update_entry_field(id, update).await?;
    Ok(Json(entry))
}

/// DELETE /flowsheet/:id - Remove an entry
///
/// Removing an entry that is already gone succeeds without a backend call.
pub async fn remove_entry(
    State(state): State<AppState>,
    Path(id): Path<EntryId>,
) -> Result<StatusCode, Error> {
    state.engine.remove_entry(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /flowsheet/:id/move - Move an entry within its show's sequence
pub async fn move_entry(
    State(state): State<AppState>,
    Path(id): Path<EntryId>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<Entry>, Error> {
    let entry = state.engine.move_entry(id, req.target).await?;
    Ok(Json(entry))
}

// ============================================================================
// History Pagination and Reconciliation
// ============================================================================

/// POST /flowsheet/pages - Load the next history page
///
/// Returns `in_flight` without fetching when a page load is already running.
pub async fn load_more(
    State(state): State<AppState>,
) -> Result<Json<LoadMoreResponse>, Error> {
    match state.engine.load_more().await? {
        Some(page) => Ok(Json(LoadMoreResponse {
            status: "loaded".to_string(),
            page: Some(page),
        })),
        None => Ok(Json(LoadMoreResponse {
            status: "in_flight".to_string(),
            page: None,
        })),
    }
}

/// POST /flowsheet/resync - Rebuild local state from the backend
pub async fn resync(State(state): State<AppState>) -> Result<Json<StatusResponse>, Error> {
    info!("Manual resync requested");
    state.engine.resync().await?;
    Ok(Json(StatusResponse {
        status: "resynced".to_string(),
    }))
}

// ============================================================================
// Local Queue
// ============================================================================

/// GET /queue - Current local queue in presentation order
pub async fn get_queue(State(state): State<AppState>) -> Json<QueueResponse> {
    let snapshot = state.engine.snapshot().await;
    Json(QueueResponse {
        queue: snapshot.queue,
    })
}

/// POST /queue - Stage a song in the local queue
pub async fn queue_add(
    State(state): State<AppState>,
    Json(song): Json<NewSong>,
) -> Json<QueueItem> {
    Json(state.engine.queue_add(song).await)
}

/// POST /queue/reorder - Move a queue item between positions
pub async fn queue_reorder(
    State(state): State<AppState>,
    Json(req): Json<QueueReorderRequest>,
) -> Result<StatusCode, Error> {
    state.engine.queue_reorder(req.from, req.to).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /queue/:item_id - Discard a queue item
pub async fn queue_remove(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<StatusCode, Error> {
    match state.engine.queue_remove(item_id).await {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(Error::NotFound(format!("queue item {item_id}"))),
    }
}

/// POST /queue/:item_id/promote - Move a queue item into the flowsheet
pub async fn promote(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<Json<Entry>, Error> {
    let show_id = require_on_air(&state).await?;
    let entry = state.engine.promote(item_id, show_id).await?;
    Ok(Json(entry))
}

// ============================================================================
// On-Air Status
// ============================================================================

/// GET /onair - Current show-control status
pub async fn get_onair(State(state): State<AppState>) -> Result<Json<OnAirStatus>, Error> {
    Ok(Json(state.show_control.current_show().await?))
}

// ============================================================================
// SSE
// ============================================================================

/// GET /events - SSE stream of flowsheet events
pub async fn sse_handler(State(state): State<AppState>) -> impl IntoResponse {
    state.broadcaster.handle_sse_connection().await
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolve the show entries should land under, rejecting when off air.
async fn require_on_air(state: &AppState) -> Result<ShowId, Error> {
    let status = state.show_control.current_show().await?;
    if !status.live {
        return Err(Error::InvalidState("no show is on air".to_string()));
    }
    status
        .show_id
        .ok_or_else(|| Error::Internal("show control reported live without a show id".to_string()))
}
