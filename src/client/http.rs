//! HTTP client for the record store REST API.
//!
//! Maps the wire error envelope back into [`SyncError`] so callers can
//! classify failures: `404` is authoritative deletion, connection failures
//! and `5xx` are transient, `409` is a lost race.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::RecordStore;
use crate::api::dto::{
    AddWaitlistEntryRequest, AssignSeatRequest, CreateEventRequest, CreateTableRequest,
    ReorderWaitlistRequest, TablesResponse, WaitlistResponse,
};
use crate::domain::{Event, EventId, EventPatch, RoomState, Table, TimerState, WaitlistEntry};
use crate::error::{ErrorResponse, SyncError};

/// Connect timeout for record-store requests.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// [`RecordStore`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRecordStore {
    /// HTTP client with configured timeouts.
    client: Client,
    /// Base URL including the API prefix, without trailing slash
    /// (e.g. `http://127.0.0.1:3000/api/v1`).
    base_url: String,
}

impl HttpRecordStore {
    /// Creates a client for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Internal`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build HTTP client");
                SyncError::Internal(format!("http client: {e}"))
            })?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// Base URL requests are issued against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /events`: creates an event. Used by operator tooling and tests.
    ///
    /// # Errors
    ///
    /// Transport, upstream or validation errors from the record store.
    pub async fn create_event(
        &self,
        id: Option<EventId>,
        name: &str,
        settings: TimerState,
    ) -> Result<Event, SyncError> {
        let request = CreateEventRequest {
            id,
            name: name.to_string(),
            settings,
        };
        let event_id = id.unwrap_or_default();
        let event: Event = self
            .send(event_id, self.client.post(self.url("/events")).json(&request))
            .await?;
        event.validate()?;
        Ok(event)
    }

    /// `DELETE /events/{id}`.
    ///
    /// # Errors
    ///
    /// [`SyncError::EventNotFound`] if already gone; transport or upstream
    /// errors otherwise.
    pub async fn delete_event(&self, event_id: EventId) -> Result<(), SyncError> {
        let response = self
            .client
            .delete(self.url(&format!("/events/{event_id}")))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(error_from_response(event_id, response).await)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn event_url(&self, event_id: EventId, rest: &str) -> String {
        self.url(&format!("/events/{event_id}{rest}"))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        event_id: EventId,
        request: RequestBuilder,
    ) -> Result<T, SyncError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(error_from_response(event_id, response).await);
        }
        response.json::<T>().await.map_err(|e| {
            tracing::warn!(%event_id, error = %e, "unparseable record store response");
            SyncError::MalformedRecord(e.to_string())
        })
    }
}

fn transport_error(e: reqwest::Error) -> SyncError {
    tracing::debug!(error = %e, "record store request failed");
    SyncError::Transport(e.to_string())
}

async fn error_from_response(event_id: EventId, response: reqwest::Response) -> SyncError {
    let status = response.status();
    let body = response.json::<ErrorResponse>().await.ok().map(|r| r.error);
    if status.is_server_error() {
        tracing::warn!(%event_id, %status, "record store returned server error");
    }
    SyncError::from_wire(status.as_u16(), event_id, body)
}

#[async_trait::async_trait]
impl RecordStore for HttpRecordStore {
    async fn get_event(&self, event_id: EventId) -> Result<Event, SyncError> {
        let event: Event = self
            .send(event_id, self.client.get(self.event_url(event_id, "")))
            .await?;
        if event.id != event_id {
            return Err(SyncError::MalformedRecord(format!(
                "asked for event {event_id}, got {}",
                event.id
            )));
        }
        event.validate()?;
        Ok(event)
    }

    async fn update_event(&self, event_id: EventId, patch: EventPatch) -> Result<Event, SyncError> {
        let event: Event = self
            .send(
                event_id,
                self.client.patch(self.event_url(event_id, "")).json(&patch),
            )
            .await?;
        event.validate()?;
        Ok(event)
    }

    async fn add_waitlist_entry(
        &self,
        event_id: EventId,
        entry_id: Uuid,
        name: &str,
    ) -> Result<Vec<WaitlistEntry>, SyncError> {
        let request = AddWaitlistEntryRequest {
            id: Some(entry_id),
            name: name.to_string(),
        };
        let response: WaitlistResponse = self
            .send(
                event_id,
                self.client
                    .post(self.event_url(event_id, "/waitinglist"))
                    .json(&request),
            )
            .await?;
        Ok(response.waiting_list)
    }

    async fn remove_waitlist_entry(
        &self,
        event_id: EventId,
        entry_id: Uuid,
    ) -> Result<Vec<WaitlistEntry>, SyncError> {
        let response: WaitlistResponse = self
            .send(
                event_id,
                self.client
                    .delete(self.event_url(event_id, "/waitinglist"))
                    .query(&[("entryId", entry_id.to_string())]),
            )
            .await?;
        Ok(response.waiting_list)
    }

    async fn reorder_waitlist(
        &self,
        event_id: EventId,
        entry_id: Uuid,
        new_index: usize,
    ) -> Result<Vec<WaitlistEntry>, SyncError> {
        let request = ReorderWaitlistRequest {
            entry_id,
            new_index,
        };
        let response: WaitlistResponse = self
            .send(
                event_id,
                self.client
                    .patch(self.event_url(event_id, "/waitinglist"))
                    .json(&request),
            )
            .await?;
        Ok(response.waiting_list)
    }

    async fn create_table(&self, event_id: EventId, table_id: Uuid) -> Result<Vec<Table>, SyncError> {
        let request = CreateTableRequest { id: Some(table_id) };
        let response: TablesResponse = self
            .send(
                event_id,
                self.client
                    .post(self.event_url(event_id, "/tables"))
                    .json(&request),
            )
            .await?;
        Ok(response.tables)
    }

    async fn delete_table(&self, event_id: EventId, table_id: Uuid) -> Result<Vec<Table>, SyncError> {
        let response: TablesResponse = self
            .send(
                event_id,
                self.client
                    .delete(self.event_url(event_id, &format!("/tables/{table_id}"))),
            )
            .await?;
        Ok(response.tables)
    }

    async fn assign_seat(
        &self,
        event_id: EventId,
        table_id: Uuid,
        seat_index: usize,
        player_id: Uuid,
    ) -> Result<RoomState, SyncError> {
        let request = AssignSeatRequest { player_id };
        let room: RoomState = self
            .send(
                event_id,
                self.client
                    .post(self.event_url(
                        event_id,
                        &format!("/tables/{table_id}/seats/{seat_index}"),
                    ))
                    .json(&request),
            )
            .await?;
        room.validate()?;
        Ok(room)
    }

    async fn empty_seat(
        &self,
        event_id: EventId,
        table_id: Uuid,
        seat_index: usize,
    ) -> Result<RoomState, SyncError> {
        let room: RoomState = self
            .send(
                event_id,
                self.client.delete(self.event_url(
                    event_id,
                    &format!("/tables/{table_id}/seats/{seat_index}"),
                )),
            )
            .await?;
        room.validate()?;
        Ok(room)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::CustomClock;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> HttpRecordStore {
        let Ok(store) = HttpRecordStore::new(format!("{}/api/v1/", server.uri()), Duration::from_secs(2)) else {
            panic!("client build failed");
        };
        store
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let Ok(store) = HttpRecordStore::new("http://localhost:3000/api/v1/", Duration::from_secs(1)) else {
            panic!("client build failed");
        };
        assert_eq!(store.base_url(), "http://localhost:3000/api/v1");
    }

    #[tokio::test]
    async fn get_event_parses_and_validates() {
        let server = MockServer::start().await;
        let event = Event::scheduled("c", TimerState::Custom(CustomClock::new(60)));
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/events/{}", event.id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(&event))
            .mount(&server)
            .await;

        let fetched = store_for(&server).get_event(event.id).await;
        assert_eq!(fetched.ok(), Some(event));
    }

    #[tokio::test]
    async fn not_found_maps_to_event_not_found() {
        let server = MockServer::start().await;
        let id = EventId::new();
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/events/{id}")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = store_for(&server).get_event(id).await;
        assert_eq!(result, Err(SyncError::EventNotFound(id)));
    }

    #[tokio::test]
    async fn mismatched_record_is_malformed() {
        let server = MockServer::start().await;
        let mut event = Event::scheduled("c", TimerState::Custom(CustomClock::new(60)));
        let id = event.id;
        event.event_type = crate::domain::EventType::Poker;
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/events/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(&event))
            .mount(&server)
            .await;

        let result = store_for(&server).get_event(id).await;
        assert!(matches!(result, Err(SyncError::MalformedRecord(_))));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        let id = EventId::new();
        Mock::given(method("POST"))
            .and(path(format!("/api/v1/events/{id}/tables")))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let Err(e) = store_for(&server).create_table(id, Uuid::new_v4()).await else {
            panic!("expected failure");
        };
        assert!(e.is_transient());
    }

    #[tokio::test]
    async fn conflict_body_is_decoded() {
        let server = MockServer::start().await;
        let id = EventId::new();
        let body = serde_json::json!({"error": {"code": 2003, "message": "seat taken"}});
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409).set_body_json(body))
            .mount(&server)
            .await;

        let result = store_for(&server)
            .assign_seat(id, Uuid::new_v4(), 0, Uuid::new_v4())
            .await;
        assert_eq!(result, Err(SyncError::Conflict("seat taken".to_string())));
    }

    #[tokio::test]
    async fn remove_waitlist_entry_sends_query() {
        let server = MockServer::start().await;
        let id = EventId::new();
        let entry = Uuid::new_v4();
        Mock::given(method("DELETE"))
            .and(path(format!("/api/v1/events/{id}/waitinglist")))
            .and(query_param("entryId", entry.to_string()))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"waitingList": []})),
            )
            .mount(&server)
            .await;

        let result = store_for(&server).remove_waitlist_entry(id, entry).await;
        assert_eq!(result.ok(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn unreachable_store_is_transport_error() {
        let Ok(store) = HttpRecordStore::new("http://127.0.0.1:9", Duration::from_millis(500)) else {
            panic!("client build failed");
        };
        let result = store.get_event(EventId::new()).await;
        assert!(matches!(result, Err(SyncError::Transport(_))));
    }
}
