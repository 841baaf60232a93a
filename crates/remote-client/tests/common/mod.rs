//! Shared helpers: a recording render sink and a throwaway HTTP server.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use axum::Router;
use remote_client::classifier::GenericEvent;
use remote_client::store::Snapshot;
use remote_client::RenderSink;
use serde_json::Value;

#[derive(Default)]
pub struct Recorder {
    pub cycles: Mutex<Vec<(Snapshot, Vec<GenericEvent>)>>,
    pub updates: Mutex<Vec<(String, Value)>>,
}

impl Recorder {
    pub fn cycle_count(&self) -> usize {
        self.cycles.lock().unwrap().len()
    }
}

impl RenderSink for Recorder {
    fn on_state_update(&self, snapshot: &Snapshot, events: &[GenericEvent]) {
        self.cycles
            .lock()
            .unwrap()
            .push((snapshot.clone(), events.to_vec()));
    }

    fn on_property_update(&self, name: &str, value: &Value) {
        self.updates
            .lock()
            .unwrap()
            .push((name.to_string(), value.clone()));
    }
}

/// Serves `app` on an ephemeral local port and returns its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

/// Polls `check` every 10 ms until it holds or `limit` elapses.
pub async fn wait_for<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
