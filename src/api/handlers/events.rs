//! Event CRUD handlers: create, list, get, patch, delete.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{CreateEventRequest, EventListParams, EventListResponse};
use crate::app_state::AppState;
use crate::client::RecordStore;
use crate::domain::{Event, EventId, EventPatch};
use crate::error::{ErrorResponse, SyncError};

/// `POST /events`: Create a scheduled event.
///
/// # Errors
///
/// Returns [`SyncError::MalformedRecord`] for inconsistent settings and
/// [`SyncError::InvalidRequest`] if the requested id is taken.
#[utoipa::path(
    post,
    path = "/api/v1/events",
    tag = "Events",
    summary = "Create an event",
    description = "Creates a SCHEDULED event. The event type follows the `settings.type` tag; tables and waitlist start empty.",
    request_body = serde_json::Value,
    responses(
        (status = 201, description = "Event created", body = serde_json::Value),
        (status = 400, description = "Invalid settings", body = ErrorResponse),
    )
)]
pub async fn create_event(
    State(state): State<AppState>,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, SyncError> {
    let mut event = Event::scheduled(req.name, req.settings);
    if let Some(id) = req.id {
        event.id = id;
    }
    state.registry.insert(event.clone()).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// `GET /events`: List events, optionally by status.
///
/// # Errors
///
/// Infallible in practice; kept fallible for handler uniformity.
#[utoipa::path(
    get,
    path = "/api/v1/events",
    tag = "Events",
    summary = "List events",
    description = "Returns all events ordered by creation time, optionally filtered by lifecycle status.",
    params(EventListParams),
    responses(
        (status = 200, description = "Event list", body = EventListResponse),
    )
)]
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventListParams>,
) -> Result<impl IntoResponse, SyncError> {
    let data = state.registry.list(params.status).await;
    let total = data.len();
    Ok(Json(EventListResponse { data, total }))
}

/// `GET /events/{id}`: Full event aggregate.
///
/// # Errors
///
/// Returns [`SyncError::EventNotFound`] if the event does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}",
    tag = "Events",
    summary = "Get an event",
    description = "Returns the event with its settings, tables and waiting list.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    responses(
        (status = 200, description = "Event", body = serde_json::Value),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
) -> Result<impl IntoResponse, SyncError> {
    Ok(Json(state.registry.get(id).await?))
}

/// `PATCH /events/{id}`: Update status, settings, end time or summary.
///
/// # Errors
///
/// - [`SyncError::EventNotFound`] if the event does not exist.
/// - [`SyncError::InvalidTransition`] for an illegal status change.
/// - [`SyncError::MalformedRecord`] if the settings switch event type or
///   leave the level or period index out of range.
#[utoipa::path(
    patch,
    path = "/api/v1/events/{id}",
    tag = "Events",
    summary = "Update an event",
    description = "Applies a partial update. Status changes must follow SCHEDULED -> ACTIVE -> ENDED; ending an ended event is a no-op.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Updated event", body = serde_json::Value),
        (status = 400, description = "Settings out of range or of another event type", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
        (status = 409, description = "Illegal status transition", body = ErrorResponse),
    )
)]
pub async fn patch_event(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
    Json(patch): Json<EventPatch>,
) -> Result<impl IntoResponse, SyncError> {
    Ok(Json(state.registry.update_event(id, patch).await?))
}

/// `DELETE /events/{id}`: Remove an event.
///
/// # Errors
///
/// Returns [`SyncError::EventNotFound`] if the event does not exist.
#[utoipa::path(
    delete,
    path = "/api/v1/events/{id}",
    tag = "Events",
    summary = "Delete an event",
    description = "Removes the event. Surfaces following it tear down on their next poll.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    responses(
        (status = 204, description = "Event deleted"),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<EventId>,
) -> Result<impl IntoResponse, SyncError> {
    state.registry.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Event routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(create_event).get(list_events))
        .route(
            "/events/{id}",
            get(get_event).patch(patch_event).delete(delete_event),
        )
}
