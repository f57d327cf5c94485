//! `OpenAPI` document for the reference record store.

use utoipa::OpenApi;

/// `OpenAPI` documentation for `/api/v1/*` and `/health`.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "tableclock record store",
        version = env!("CARGO_PKG_VERSION"),
        description = "Reference record store for events, tables, seats and waiting lists"
    ),
    paths(
        crate::api::handlers::events::create_event,
        crate::api::handlers::events::list_events,
        crate::api::handlers::events::get_event,
        crate::api::handlers::events::patch_event,
        crate::api::handlers::events::delete_event,
        crate::api::handlers::room::add_waitlist_entry,
        crate::api::handlers::room::remove_waitlist_entry,
        crate::api::handlers::room::reorder_waitlist,
        crate::api::handlers::room::create_table,
        crate::api::handlers::room::delete_table,
        crate::api::handlers::room::assign_seat,
        crate::api::handlers::room::empty_seat,
        crate::api::handlers::system::health_handler,
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::error::ErrorBody,
            crate::domain::EventStatus,
            crate::domain::EventType,
            crate::api::dto::HealthResponse,
            crate::api::dto::EventListResponse,
            crate::api::dto::AddWaitlistEntryRequest,
            crate::api::dto::ReorderWaitlistRequest,
            crate::api::dto::WaitlistResponse,
            crate::api::dto::CreateTableRequest,
            crate::api::dto::TablesResponse,
            crate::api::dto::AssignSeatRequest,
        )
    ),
    tags(
        (name = "Events", description = "Event lifecycle and settings"),
        (name = "Room", description = "Waiting list, tables and seats"),
        (name = "System", description = "Health"),
    ),
)]
pub struct ApiDoc;

/// Returns the generated document as pretty JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}
