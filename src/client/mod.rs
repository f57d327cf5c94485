//! Record-store clients.

pub mod http;
pub mod record_store;

pub use http::HttpRecordStore;
pub use record_store::RecordStore;
