//! Local persisted state: key-value backends, the anchor record and the
//! per-surface event cache.

pub mod anchor_store;
pub mod event_cache;
pub mod kv;

pub use anchor_store::AnchorStore;
pub use event_cache::{CacheState, EventCache};
pub use kv::{
    ACTIVE_EVENT_KEY, FileStore, KeyValueStore, MemoryStore, ROOM_STATE_KEY, TIMER_ANCHOR_KEY,
};
