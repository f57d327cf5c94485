//! Data Transfer Objects for REST request/response serialization.
//!
//! Shared by the axum handlers and [`crate::client::HttpRecordStore`], so
//! both ends of the wire agree on one shape. Field names are camelCase.

pub mod common_dto;
pub mod event_dto;
pub mod room_dto;

pub use common_dto::*;
pub use event_dto::*;
pub use room_dto::*;
