//! Waiting list, table and seat handlers.
//!
//! Every mutation answers with the authoritative sub-tree so a surface can
//! replace its optimistic state with it.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::api::dto::{
    AddWaitlistEntryRequest, AssignSeatRequest, CreateTableRequest, RemoveWaitlistEntryParams,
    ReorderWaitlistRequest, TablesResponse, WaitlistResponse,
};
use crate::app_state::AppState;
use crate::client::RecordStore;
use crate::domain::EventId;
use crate::error::{ErrorResponse, SyncError};

/// `POST /events/{id}/waitinglist`: Append a player.
///
/// # Errors
///
/// - [`SyncError::InvalidRequest`] for an empty name.
/// - [`SyncError::Conflict`] if the id is already in the room or the event
///   has ended.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/waitinglist",
    tag = "Room",
    summary = "Add a player to the waiting list",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    request_body = AddWaitlistEntryRequest,
    responses(
        (status = 201, description = "Updated waiting list", body = WaitlistResponse),
        (status = 400, description = "Empty name", body = ErrorResponse),
        (status = 409, description = "Duplicate player or ended event", body = ErrorResponse),
    )
)]
pub async fn add_waitlist_entry(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
    Json(req): Json<AddWaitlistEntryRequest>,
) -> Result<impl IntoResponse, SyncError> {
    let entry_id = req.id.unwrap_or_else(Uuid::new_v4);
    let waiting_list = state
        .registry
        .add_waitlist_entry(id, entry_id, &req.name)
        .await?;
    Ok((StatusCode::CREATED, Json(WaitlistResponse { waiting_list })))
}

/// `DELETE /events/{id}/waitinglist?entryId=`: Remove a player.
///
/// # Errors
///
/// [`SyncError::NotFound`] for an unknown entry.
#[utoipa::path(
    delete,
    path = "/api/v1/events/{id}/waitinglist",
    tag = "Room",
    summary = "Remove a player from the waiting list",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
        RemoveWaitlistEntryParams,
    ),
    responses(
        (status = 200, description = "Updated waiting list", body = WaitlistResponse),
        (status = 404, description = "Unknown entry", body = ErrorResponse),
    )
)]
pub async fn remove_waitlist_entry(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
    Query(params): Query<RemoveWaitlistEntryParams>,
) -> Result<impl IntoResponse, SyncError> {
    let waiting_list = state
        .registry
        .remove_waitlist_entry(id, params.entry_id)
        .await?;
    Ok(Json(WaitlistResponse { waiting_list }))
}

/// `PATCH /events/{id}/waitinglist`: Move a player.
///
/// # Errors
///
/// [`SyncError::NotFound`] for an unknown entry.
#[utoipa::path(
    patch,
    path = "/api/v1/events/{id}/waitinglist",
    tag = "Room",
    summary = "Reorder the waiting list",
    description = "Moves one entry to a new 0-based index; out-of-range indexes clamp to the end. Positions are renumbered densely.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    request_body = ReorderWaitlistRequest,
    responses(
        (status = 200, description = "Updated waiting list", body = WaitlistResponse),
        (status = 404, description = "Unknown entry", body = ErrorResponse),
    )
)]
pub async fn reorder_waitlist(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
    Json(req): Json<ReorderWaitlistRequest>,
) -> Result<impl IntoResponse, SyncError> {
    let waiting_list = state
        .registry
        .reorder_waitlist(id, req.entry_id, req.new_index)
        .await?;
    Ok(Json(WaitlistResponse { waiting_list }))
}

/// `POST /events/{id}/tables`: Add an empty table.
///
/// # Errors
///
/// [`SyncError::Conflict`] if the table id exists or the event has ended.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/tables",
    tag = "Room",
    summary = "Add a table",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    request_body = CreateTableRequest,
    responses(
        (status = 201, description = "All tables", body = TablesResponse),
        (status = 409, description = "Duplicate table or ended event", body = ErrorResponse),
    )
)]
pub async fn create_table(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
    body: Option<Json<CreateTableRequest>>,
) -> Result<impl IntoResponse, SyncError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let table_id = req.id.unwrap_or_else(Uuid::new_v4);
    let tables = state.registry.create_table(id, table_id).await?;
    Ok((StatusCode::CREATED, Json(TablesResponse { tables })))
}

/// `DELETE /events/{id}/tables/{tableId}`: Remove a table.
///
/// # Errors
///
/// [`SyncError::NotFound`] for an unknown table.
#[utoipa::path(
    delete,
    path = "/api/v1/events/{id}/tables/{table_id}",
    tag = "Room",
    summary = "Remove a table",
    description = "Removes the table and renumbers the remaining ones.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
        ("table_id" = uuid::Uuid, Path, description = "Table UUID"),
    ),
    responses(
        (status = 200, description = "Remaining tables", body = TablesResponse),
        (status = 404, description = "Unknown table", body = ErrorResponse),
    )
)]
pub async fn delete_table(
    State(state): State<AppState>,
    Path((id, table_id)): Path<(EventId, Uuid)>,
) -> Result<impl IntoResponse, SyncError> {
    let tables = state.registry.delete_table(id, table_id).await?;
    Ok(Json(TablesResponse { tables }))
}

/// `POST /events/{id}/tables/{tableId}/seats/{seatIndex}`: Seat a
/// waiting player.
///
/// # Errors
///
/// - [`SyncError::NotFound`] for an unknown table or seat.
/// - [`SyncError::Conflict`] if the seat is taken or the player is no
///   longer waiting.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/tables/{table_id}/seats/{seat_index}",
    tag = "Room",
    summary = "Assign a seat",
    description = "Moves the named player from the waiting list into an empty seat. Returns tables and waiting list together.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
        ("table_id" = uuid::Uuid, Path, description = "Table UUID"),
        ("seat_index" = usize, Path, description = "0-based seat index"),
    ),
    request_body = AssignSeatRequest,
    responses(
        (status = 200, description = "Room state", body = serde_json::Value),
        (status = 404, description = "Unknown table or seat", body = ErrorResponse),
        (status = 409, description = "Seat taken or player not waiting", body = ErrorResponse),
    )
)]
pub async fn assign_seat(
    State(state): State<AppState>,
    Path((id, table_id, seat_index)): Path<(EventId, Uuid, usize)>,
    Json(req): Json<AssignSeatRequest>,
) -> Result<impl IntoResponse, SyncError> {
    let room = state
        .registry
        .assign_seat(id, table_id, seat_index, req.player_id)
        .await?;
    Ok(Json(room))
}

/// `DELETE /events/{id}/tables/{tableId}/seats/{seatIndex}`: Empty a
/// seat.
///
/// # Errors
///
/// [`SyncError::NotFound`] for an unknown table or seat.
#[utoipa::path(
    delete,
    path = "/api/v1/events/{id}/tables/{table_id}/seats/{seat_index}",
    tag = "Room",
    summary = "Empty a seat",
    description = "Clears the seat. The player is not put back on the waiting list.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
        ("table_id" = uuid::Uuid, Path, description = "Table UUID"),
        ("seat_index" = usize, Path, description = "0-based seat index"),
    ),
    responses(
        (status = 200, description = "Room state", body = serde_json::Value),
        (status = 404, description = "Unknown table or seat", body = ErrorResponse),
    )
)]
pub async fn empty_seat(
    State(state): State<AppState>,
    Path((id, table_id, seat_index)): Path<(EventId, Uuid, usize)>,
) -> Result<impl IntoResponse, SyncError> {
    let room = state.registry.empty_seat(id, table_id, seat_index).await?;
    Ok(Json(room))
}

/// Room routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/events/{id}/waitinglist",
            post(add_waitlist_entry)
                .delete(remove_waitlist_entry)
                .patch(reorder_waitlist),
        )
        .route("/events/{id}/tables", post(create_table))
        .route("/events/{id}/tables/{table_id}", delete(delete_table))
        .route(
            "/events/{id}/tables/{table_id}/seats/{seat_index}",
            post(assign_seat).delete(empty_seat),
        )
}
