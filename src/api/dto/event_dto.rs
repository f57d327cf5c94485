//! Event DTOs for create, list and patch operations.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{Event, EventId, EventStatus, TimerState};

/// Request body for `POST /events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    /// Client-chosen id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Initial timer settings; the event type is derived from the variant.
    pub settings: TimerState,
}

/// Query parameters for `GET /events`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct EventListParams {
    /// Only return events in this status.
    #[serde(default)]
    pub status: Option<EventStatus>,
}

/// Response body for `GET /events`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventListResponse {
    /// Events ordered by creation time.
    #[schema(value_type = Vec<Object>)]
    pub data: Vec<Event>,
    /// Number of events returned.
    pub total: usize,
}
