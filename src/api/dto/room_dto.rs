//! Waitlist, table and seat DTOs.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::{Table, WaitlistEntry};

/// Request body for `POST /events/{id}/waitinglist`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddWaitlistEntryRequest {
    /// Client-generated entry id so optimistic and confirmed state agree;
    /// generated by the server when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Player name.
    pub name: String,
}

/// Query parameters for `DELETE /events/{id}/waitinglist`.
#[derive(Debug, Clone, Serialize, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct RemoveWaitlistEntryParams {
    /// Entry to remove.
    pub entry_id: Uuid,
}

/// Request body for `PATCH /events/{id}/waitinglist`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReorderWaitlistRequest {
    /// Entry to move.
    pub entry_id: Uuid,
    /// Target 0-based index in the list.
    pub new_index: usize,
}

/// Response body of every waitlist mutation: the full updated list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistResponse {
    /// Entries in position order.
    #[schema(value_type = Vec<Object>)]
    pub waiting_list: Vec<WaitlistEntry>,
}

/// Request body for `POST /events/{id}/tables`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTableRequest {
    /// Client-generated table id; generated by the server when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

/// Response body of table mutations: all tables after renumbering.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TablesResponse {
    /// Tables in number order.
    #[schema(value_type = Vec<Object>)]
    pub tables: Vec<Table>,
}

/// Request body for `POST /events/{id}/tables/{tableId}/seats/{seatIndex}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignSeatRequest {
    /// Waiting player to seat. The request fails with a conflict if the
    /// player is no longer on the waitlist.
    pub player_id: Uuid,
}
