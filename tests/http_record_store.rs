//! `HttpRecordStore` against the reference router over a real socket.

#![allow(clippy::panic)]

mod common;

use uuid::Uuid;

use common::{TestServer, poker_settings};
use tableclock::client::RecordStore;
use tableclock::domain::{CustomClock, EventPatch, EventStatus, EventSummary, TimerState};
use tableclock::error::SyncError;

#[tokio::test]
async fn event_round_trip_over_http() {
    let server = TestServer::start().await;
    let client = server.client();

    let Ok(created) = client.create_event(None, "Sunday main", poker_settings()).await else {
        panic!("create failed");
    };
    assert_eq!(created.status, EventStatus::Scheduled);
    assert_eq!(server.registry.len().await, 1);

    let activate = EventPatch {
        status: Some(EventStatus::Active),
        ..EventPatch::default()
    };
    let Ok(active) = client.update_event(created.id, activate).await else {
        panic!("activate failed");
    };
    assert_eq!(active.status, EventStatus::Active);

    let Ok(fetched) = client.get_event(created.id).await else {
        panic!("get failed");
    };
    assert_eq!(fetched, active);

    let back = EventPatch {
        status: Some(EventStatus::Scheduled),
        ..EventPatch::default()
    };
    assert!(matches!(
        client.update_event(created.id, back).await,
        Err(SyncError::Conflict(_))
    ));

    let end = EventPatch {
        status: Some(EventStatus::Ended),
        summary: Some(EventSummary::from_settings(&fetched.settings)),
        ended_at: Some(chrono::Utc::now()),
        ..EventPatch::default()
    };
    let Ok(ended) = client.update_event(created.id, end.clone()).await else {
        panic!("end failed");
    };
    assert_eq!(ended.status, EventStatus::Ended);
    assert!(client.update_event(created.id, end).await.is_ok());

    assert!(client.delete_event(created.id).await.is_ok());
    assert!(matches!(
        client.get_event(created.id).await,
        Err(SyncError::EventNotFound(id)) if id == created.id
    ));
    server.stop().await;
}

#[tokio::test]
async fn room_operations_over_http() {
    let server = TestServer::start().await;
    let client = server.client();
    let Ok(event) = client.create_event(None, "", poker_settings()).await else {
        panic!("create failed");
    };
    let id = event.id;

    let (ana, ben) = (Uuid::new_v4(), Uuid::new_v4());
    assert!(client.add_waitlist_entry(id, ana, "Ana").await.is_ok());
    let Ok(list) = client.add_waitlist_entry(id, ben, "Ben").await else {
        panic!("add failed");
    };
    assert_eq!(list.iter().map(|e| e.position).collect::<Vec<_>>(), vec![1, 2]);

    let Ok(list) = client.reorder_waitlist(id, ben, 0).await else {
        panic!("reorder failed");
    };
    assert_eq!(list.first().map(|e| e.id), Some(ben));

    let table = Uuid::new_v4();
    let Ok(tables) = client.create_table(id, table).await else {
        panic!("table failed");
    };
    assert_eq!(tables.len(), 1);

    let Ok(room) = client.assign_seat(id, table, 0, ben).await else {
        panic!("seat failed");
    };
    assert_eq!(room.seat_of(ben), Some((1, 1)));
    assert_eq!(room.waiting_list.len(), 1);

    assert!(matches!(
        client.assign_seat(id, table, 1, ben).await,
        Err(SyncError::Conflict(_))
    ));
    assert!(matches!(
        client.assign_seat(id, table, 0, ana).await,
        Err(SyncError::Conflict(_))
    ));
    assert!(matches!(
        client.remove_waitlist_entry(id, Uuid::new_v4()).await,
        Err(SyncError::NotFound(_))
    ));

    let Ok(room) = client.empty_seat(id, table, 0).await else {
        panic!("empty failed");
    };
    assert_eq!(room.seat_of(ben), None);
    assert_eq!(room.waiting_list.len(), 1);

    let Ok(list) = client.remove_waitlist_entry(id, ana).await else {
        panic!("remove failed");
    };
    assert!(list.is_empty());
    let Ok(tables) = client.delete_table(id, table).await else {
        panic!("delete table failed");
    };
    assert!(tables.is_empty());
    server.stop().await;
}

#[tokio::test]
async fn settings_must_keep_event_type() {
    let server = TestServer::start().await;
    let client = server.client();
    let Ok(event) = client.create_event(None, "", poker_settings()).await else {
        panic!("create failed");
    };
    let patch = EventPatch {
        settings: Some(TimerState::Custom(CustomClock::new(60))),
        ..EventPatch::default()
    };
    assert!(matches!(
        client.update_event(event.id, patch).await,
        Err(SyncError::MalformedRecord(_))
    ));
    server.stop().await;
}
