//! Error types with HTTP status code mapping.
//!
//! [`SyncError`] is the central error type for the synchronization engine
//! and the reference record store. Each variant maps to a numeric code and
//! an HTTP status so the same value can travel over the wire and be
//! reconstructed on the client side by [`crate::client::HttpRecordStore`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::domain::EventId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "event not found: 6b1c...",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Error enum shared by the engine, the record-store client and the
/// reference record store.
///
/// # Error Code Ranges
///
/// | Range     | Category             | HTTP Status                  |
/// |-----------|----------------------|------------------------------|
/// | 1000–1999 | Validation           | 400 Bad Request              |
/// | 2000–2999 | State / Not Found    | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Transport / Server   | 500 / 502                    |
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Event with the given ID does not exist in the record store.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// A nested resource (table, seat, waitlist entry) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request or local precondition failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A record failed validation at the record-store boundary.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The mutation lost a race against another surface.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Lifecycle transition not permitted from the current status.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// Network-level failure talking to the record store.
    #[error("transport error: {0}")]
    Transport(String),

    /// Record store answered with an unexpected status.
    #[error("record store returned {status}: {message}")]
    Upstream {
        /// HTTP status code returned by the record store.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// Local persisted key-value store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::MalformedRecord(_) => 1002,
            Self::EventNotFound(_) => 2001,
            Self::NotFound(_) => 2002,
            Self::Conflict(_) => 2003,
            Self::InvalidTransition { .. } => 2004,
            Self::Internal(_) => 3000,
            Self::Storage(_) => 3001,
            Self::Transport(_) => 3002,
            Self::Upstream { .. } => 3003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::MalformedRecord(_) => StatusCode::BAD_REQUEST,
            Self::EventNotFound(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if the record store reported the resource as gone.
    ///
    /// A not-found answer on poll is authoritative and is never retried.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::EventNotFound(_) | Self::NotFound(_))
    }

    /// Returns `true` for failures worth retrying on the next poll tick.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Rebuilds an error from a record-store error body.
    ///
    /// `event_id` is the event the failed request addressed; it is used to
    /// reconstruct [`SyncError::EventNotFound`].
    #[must_use]
    pub fn from_wire(status: u16, event_id: EventId, body: Option<ErrorBody>) -> Self {
        let Some(body) = body else {
            return match status {
                404 => Self::EventNotFound(event_id),
                _ => Self::Upstream {
                    status,
                    message: String::new(),
                },
            };
        };
        match body.code {
            1001 => Self::InvalidRequest(body.message),
            1002 => Self::MalformedRecord(body.message),
            2001 => Self::EventNotFound(event_id),
            2002 => Self::NotFound(body.message),
            2003 | 2004 => Self::Conflict(body.message),
            _ => Self::Upstream {
                status,
                message: body.message,
            },
        }
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
