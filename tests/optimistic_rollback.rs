//! Optimistic room mutations against a failing record store.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tableclock::client::{HttpRecordStore, RecordStore};
use tableclock::domain::{CustomClock, Event, TimerState};
use tableclock::error::SyncError;
use tableclock::service::RoomStateManager;
use tableclock::store::{EventCache, KeyValueStore, MemoryStore, ROOM_STATE_KEY};

struct Fixture {
    rooms: RoomStateManager,
    cache: EventCache,
    event: Event,
    kv: Arc<dyn KeyValueStore>,
}

async fn manager(server: &MockServer) -> Fixture {
    let Ok(store) = HttpRecordStore::new(server.uri(), Duration::from_secs(2)) else {
        panic!("client build failed");
    };
    let event = Event::scheduled("rollback", TimerState::Custom(CustomClock::new(60)));
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let cache = EventCache::new(Arc::clone(&kv), event.id);
    cache.set_event(event.clone());
    let store: Arc<dyn RecordStore> = Arc::new(store);
    Fixture {
        rooms: RoomStateManager::new(store, cache.clone()),
        cache,
        event,
        kv,
    }
}

fn tables_body(request: &wiremock::Request) -> serde_json::Value {
    let body: serde_json::Value =
        serde_json::from_slice(&request.body).unwrap_or(serde_json::Value::Null);
    let seats: Vec<serde_json::Value> = (1..=9)
        .map(|position| serde_json::json!({"position": position, "playerId": null, "playerName": null}))
        .collect();
    serde_json::json!({
        "tables": [{"id": body["id"].clone(), "number": 1, "seats": seats}]
    })
}

async fn mount_table_add(server: &MockServer, event: &Event) {
    Mock::given(method("POST"))
        .and(path(format!("/events/{}/tables", event.id)))
        .respond_with(|request: &wiremock::Request| {
            ResponseTemplate::new(201).set_body_json(tables_body(request))
        })
        .mount(server)
        .await;
}

/// Answers waitlist appends with the full list accumulated so far.
async fn mount_waitlist_add(server: &MockServer, event: &Event) {
    let list: Arc<Mutex<Vec<serde_json::Value>>> = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("POST"))
        .and(path(format!("/events/{}/waitinglist", event.id)))
        .respond_with(move |request: &wiremock::Request| {
            let body: serde_json::Value =
                serde_json::from_slice(&request.body).unwrap_or(serde_json::Value::Null);
            let mut list = list.lock();
            let position = list.len() + 1;
            list.push(serde_json::json!({
                "id": body["id"].clone(),
                "name": body["name"].clone(),
                "position": position,
            }));
            ResponseTemplate::new(201)
                .set_body_json(serde_json::json!({ "waitingList": list.clone() }))
        })
        .mount(server)
        .await;
}

#[tokio::test]
async fn server_error_rolls_back_waitlist_add() {
    let server = MockServer::start().await;
    let f = manager(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/events/{}/waitinglist", f.event.id)))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let before = f.cache.room();
    let result = f.rooms.add_to_waitlist("Ana").await;
    assert!(matches!(result, Err(SyncError::Upstream { status: 500, .. })));
    assert_eq!(f.cache.room(), before);
    assert!(f.rooms.room().waiting_list.is_empty());
}

#[tokio::test]
async fn confirmed_add_takes_server_answer() {
    let server = MockServer::start().await;
    let f = manager(&server).await;
    mount_table_add(&server, &f.event).await;

    let Ok(table) = f.rooms.add_table().await else {
        panic!("add table failed");
    };
    assert_eq!(table.number, 1);
    assert_eq!(f.cache.room().tables.len(), 1);
}

#[tokio::test]
async fn unreachable_store_rolls_back_table_add() {
    let server = MockServer::start().await;
    let f = manager(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/events/{}/tables", f.event.id)))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert!(f.rooms.add_table().await.is_err());
    assert!(f.cache.room().tables.is_empty());
    assert!(matches!(
        f.rooms.remove_table(Uuid::new_v4()).await,
        Err(SyncError::NotFound(_))
    ));
}

#[tokio::test]
async fn failed_table_removal_restores_the_table() {
    let server = MockServer::start().await;
    let f = manager(&server).await;
    mount_table_add(&server, &f.event).await;
    let Ok(table) = f.rooms.add_table().await else {
        panic!("add table failed");
    };
    Mock::given(method("DELETE"))
        .and(path(format!("/events/{}/tables/{}", f.event.id, table.id)))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let before = f.cache.room();
    let result = f.rooms.remove_table(table.id).await;
    assert!(matches!(result, Err(SyncError::Upstream { status: 502, .. })));
    assert_eq!(f.cache.room(), before);
    assert_eq!(f.cache.room().tables[0].id, table.id);
}

#[tokio::test]
async fn failed_reorder_restores_waitlist_order() {
    let server = MockServer::start().await;
    let f = manager(&server).await;
    mount_waitlist_add(&server, &f.event).await;
    let Ok(_) = f.rooms.add_to_waitlist("Ana").await else {
        panic!("add failed");
    };
    let Ok(bo) = f.rooms.add_to_waitlist("Bo").await else {
        panic!("add failed");
    };
    Mock::given(method("PATCH"))
        .and(path(format!("/events/{}/waitinglist", f.event.id)))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let before = f.cache.room();
    let result = f.rooms.reorder_waitlist(bo.id, 0).await;
    assert!(matches!(result, Err(SyncError::Upstream { status: 500, .. })));
    assert_eq!(f.cache.room(), before);
    let names: Vec<_> = f.cache.room().waiting_list.into_iter().map(|e| e.name).collect();
    assert_eq!(names, ["Ana", "Bo"]);
}

#[tokio::test]
async fn failed_empty_seat_keeps_player_seated() {
    let server = MockServer::start().await;
    let f = manager(&server).await;
    mount_table_add(&server, &f.event).await;
    let Ok(table) = f.rooms.add_table().await else {
        panic!("add table failed");
    };
    let mut seated = None;
    f.cache.update_room(|room| {
        room.push_waitlist(Uuid::new_v4(), "Cy");
        seated = room.assign_seat(table.id, 2, None).ok();
    });
    let Some(player) = seated else {
        panic!("seating failed");
    };
    Mock::given(method("DELETE"))
        .and(path(format!("/events/{}/tables/{}/seats/2", f.event.id, table.id)))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let before = f.cache.room();
    let result = f.rooms.empty_seat(table.id, 2).await;
    assert!(matches!(result, Err(SyncError::Upstream { status: 503, .. })));
    assert_eq!(f.cache.room(), before);
    assert_eq!(f.cache.room().seat_count(player.id), 1);
}

#[tokio::test]
async fn confirmation_after_teardown_is_dropped() {
    let server = MockServer::start().await;
    let f = manager(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("/events/{}/tables", f.event.id)))
        .respond_with(|request: &wiremock::Request| {
            ResponseTemplate::new(201)
                .set_body_json(tables_body(request))
                .set_delay(Duration::from_millis(300))
        })
        .mount(&server)
        .await;

    let rooms = f.rooms.clone();
    let pending = tokio::spawn(async move { rooms.add_table().await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    f.cache.clear();

    let Ok(result) = pending.await else {
        panic!("task panicked");
    };
    assert!(result.is_ok());
    assert!(f.cache.event().is_none());
    assert!(f.cache.room().tables.is_empty());
    assert_eq!(f.kv.get(ROOM_STATE_KEY).ok(), Some(None));
}
