//! Control and display surfaces of one profile following an event served
//! by the reference record store.

#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{TestServer, eventually, poker_settings};
use tableclock::client::RecordStore;
use tableclock::domain::{EventStatus, SignalChannel};
use tableclock::engine::{Clock, ManualClock};
use tableclock::service::{
    EndReason, Surface, SurfaceContext, SurfaceOptions, SurfaceRole, SurfaceStatus, active_event,
};
use tableclock::store::MemoryStore;

const WAIT: Duration = Duration::from_secs(3);

fn context(server: &TestServer, clock: &Arc<ManualClock>) -> SurfaceContext {
    let store: Arc<dyn RecordStore> = Arc::new(server.client());
    SurfaceContext {
        store,
        kv: Arc::new(MemoryStore::new()),
        signals: SignalChannel::new(64),
        clock: Arc::clone(clock) as Arc<dyn Clock>,
        options: SurfaceOptions {
            tick_interval: Duration::from_millis(10),
            poll_interval: Duration::from_millis(100),
        },
    }
}

#[tokio::test]
async fn display_mirrors_control_and_ends_with_it() {
    let server = TestServer::start().await;
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let ctx = context(&server, &clock);
    let Ok(event) = server.client().create_event(None, "Main event", poker_settings()).await else {
        panic!("create failed");
    };

    let control = Surface::open(SurfaceRole::Control, event.id, &ctx);
    let loaded = eventually(WAIT, || control.cache().event().is_some()).await;
    assert!(loaded, "control never loaded the event");
    assert!(control.activate().await.is_ok());

    let Some(followed) = active_event(ctx.kv.as_ref()) else {
        panic!("activation did not record the active event");
    };
    let display = Surface::open(SurfaceRole::Display, followed, &ctx);

    let Some(rooms) = control.rooms() else {
        panic!("control has no room manager");
    };
    assert!(rooms.add_to_waitlist("Ana").await.is_ok());
    let Ok(table) = rooms.add_table().await else {
        panic!("add table failed");
    };
    assert!(rooms.assign_seat(table.id, 4).await.is_ok());

    let seated = eventually(WAIT, || {
        let room = display.cache().room();
        room.tables.len() == 1 && room.waiting_list.is_empty()
    })
    .await;
    assert!(seated, "display never saw the seating");

    assert!(control.start().await.is_ok());
    clock.advance_ms(15 * 60 * 1000 + 30_000);
    let rolled = eventually(WAIT, || {
        let view = display.view().borrow().clone();
        view.running && view.remaining_seconds == 15 * 60 - 30
    })
    .await;
    assert!(rolled, "display did not roll into level 2");
    let control_view = control.view().borrow().clone();
    assert_eq!(control_view.remaining_seconds, 15 * 60 - 30);

    let Ok(Some(_)) = control.end().await else {
        panic!("end failed");
    };
    let ended = eventually(WAIT, || display.is_ended()).await;
    assert!(ended, "display never tore down");
    assert_eq!(
        *display.status().borrow(),
        SurfaceStatus::Ended {
            reason: EndReason::EndedRemotely
        }
    );
    assert_eq!(active_event(ctx.kv.as_ref()), None);

    let Ok(stored) = server.registry.get(event.id).await else {
        panic!("event missing");
    };
    assert_eq!(stored.status, EventStatus::Ended);
    assert!(stored.summary.is_some());

    control.shutdown().await;
    display.shutdown().await;
    server.stop().await;
}

#[tokio::test]
async fn deleted_event_tears_down_display() {
    let server = TestServer::start().await;
    let clock = Arc::new(ManualClock::new(0));
    let ctx = context(&server, &clock);
    let client = server.client();
    let Ok(event) = client.create_event(None, "", poker_settings()).await else {
        panic!("create failed");
    };

    let display = Surface::open(SurfaceRole::Display, event.id, &ctx);
    let loaded = eventually(WAIT, || display.cache().event().is_some()).await;
    assert!(loaded);
    assert!(client.delete_event(event.id).await.is_ok());

    let ended = eventually(WAIT, || display.is_ended()).await;
    assert!(ended);
    assert_eq!(
        *display.status().borrow(),
        SurfaceStatus::Ended {
            reason: EndReason::Deleted
        }
    );
    server.stop().await;
}
