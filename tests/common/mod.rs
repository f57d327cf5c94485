//! Shared helpers for integration tests.

#![allow(dead_code, clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use tableclock::api;
use tableclock::app_state::AppState;
use tableclock::client::HttpRecordStore;
use tableclock::domain::{BlindLevel, EventRegistry, PokerClock, TimerState};

/// Reference record store bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<EventRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let registry = Arc::new(EventRegistry::new());
        let app = api::build_router().with_state(AppState {
            registry: Arc::clone(&registry),
        });
        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                panic!("server failed: {e}");
            }
        });
        Self {
            addr,
            registry,
            shutdown: Some(shutdown),
            task,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    pub fn client(&self) -> HttpRecordStore {
        let Ok(client) = HttpRecordStore::new(self.base_url(), Duration::from_secs(2)) else {
            panic!("client build failed");
        };
        client
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

pub fn poker_settings() -> TimerState {
    TimerState::Poker(PokerClock::new(vec![
        BlindLevel {
            id: 1,
            small_blind: 25,
            big_blind: 50,
            duration_minutes: 15,
        },
        BlindLevel {
            id: 2,
            small_blind: 50,
            big_blind: 100,
            duration_minutes: 15,
        },
    ]))
}

/// Polls `check` every 20 ms until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
