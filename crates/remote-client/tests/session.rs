//! Event feed reconnection against a local mock bridge.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use common::{serve, wait_for, Recorder};
use futures_util::stream::{self, StreamExt};
use remote_client::{RemoteClient, RetryPolicy, Session, SessionState, StateStore, SyncError};
use serde_json::json;
use tokio::time::Instant;

const VOLUME_LINE: &str = "{\"event\":\"property-change\",\"id\":1,\"name\":\"volume\",\"data\":42}\n";

#[derive(Default)]
struct Hits {
    count: AtomicUsize,
    times: Mutex<Vec<Instant>>,
}

impl Hits {
    fn record(&self) -> usize {
        self.times.lock().unwrap().push(Instant::now());
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// Fails the first five requests, then streams one line and stays open.
async fn flaky_feed(State(hits): State<Arc<Hits>>) -> Response {
    if hits.record() <= 5 {
        return (StatusCode::SERVICE_UNAVAILABLE, "mpv not running").into_response();
    }
    let body = stream::iter(vec![Ok::<_, std::io::Error>(VOLUME_LINE)]).chain(stream::pending());
    Body::from_stream(body).into_response()
}

/// Streams one line and closes the body.
async fn short_feed(State(hits): State<Arc<Hits>>) -> Response {
    hits.record();
    let body = stream::iter(vec![
        Ok::<_, std::io::Error>(VOLUME_LINE),
        Ok("{\"event\":\"end-file\",\"reason\":\"quit\"}\n"),
    ]);
    Body::from_stream(body).into_response()
}

/// Streams one line, then aborts the body with a read error, five times over.
/// The sixth connection stays open.
async fn failing_mid_stream(State(hits): State<Arc<Hits>>) -> Response {
    let head = stream::iter(vec![Ok::<_, std::io::Error>(VOLUME_LINE)]);
    if hits.record() <= 5 {
        let abort = stream::once(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "player went away",
            ))
        });
        return Body::from_stream(head.chain(abort)).into_response();
    }
    Body::from_stream(head.chain(stream::pending())).into_response()
}

async fn broken_feed(State(hits): State<Arc<Hits>>) -> StatusCode {
    hits.record();
    StatusCode::INTERNAL_SERVER_ERROR
}

fn session(base: &str, store: StateStore, sink: Arc<Recorder>, retry: RetryPolicy) -> Session {
    let remote = RemoteClient::new(base);
    Session::new(&remote, "/event", store, sink).with_retry(retry)
}

fn retry_every(ms: u64) -> RetryPolicy {
    RetryPolicy {
        delay: Duration::from_millis(ms),
        max_retries: None,
    }
}

#[tokio::test]
async fn test_recovers_after_five_consecutive_failures() {
    let hits = Arc::new(Hits::default());
    let app = Router::new()
        .route("/event", get(flaky_feed))
        .with_state(hits.clone());
    let base = serve(app).await;

    let store = StateStore::with_placeholders();
    let sink = Arc::new(Recorder::default());
    let session = Arc::new(session(&base, store.clone(), sink.clone(), retry_every(50)));
    let mut state_rx = session.subscribe();
    let task = {
        let session = session.clone();
        tokio::spawn(async move { session.run().await })
    };

    let synced = wait_for(Duration::from_secs(5), || {
        let store = store.clone();
        async move { store.get("volume").await == Some(json!(42)) }
    })
    .await;
    assert!(synced, "volume never arrived");

    // Exactly one new attempt per backoff, each at least one delay apart.
    assert_eq!(hits.count(), 6);
    let times = hits.times.lock().unwrap().clone();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(50));
    }

    // The open connection keeps the session streaming; no further attempts.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hits.count(), 6);
    assert_eq!(*state_rx.borrow_and_update(), SessionState::Streaming);

    // One render on connect (placeholders) and one for the frame.
    assert_eq!(sink.cycle_count(), 2);
    task.abort();
}

#[tokio::test]
async fn test_recovers_after_five_mid_stream_failures() {
    let hits = Arc::new(Hits::default());
    let app = Router::new()
        .route("/event", get(failing_mid_stream))
        .with_state(hits.clone());
    let base = serve(app).await;

    let store = StateStore::new();
    let sink = Arc::new(Recorder::default());
    let session = Arc::new(session(&base, store.clone(), sink.clone(), retry_every(50)));
    let mut state_rx = session.subscribe();
    let task = {
        let session = session.clone();
        tokio::spawn(async move { session.run().await })
    };

    let reached = wait_for(Duration::from_secs(10), || {
        let hits = hits.clone();
        async move { hits.count() >= 6 }
    })
    .await;
    assert!(reached, "session stopped reconnecting after a mid-stream error");

    // The sixth connection stays open: no seventh attempt.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(hits.count(), 6);
    let times = hits.times.lock().unwrap().clone();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(50));
    }
    assert_eq!(*state_rx.borrow_and_update(), SessionState::Streaming);
    assert_eq!(store.get("volume").await, Some(json!(42)));

    // Every connection reached Streaming and rendered on connect.
    assert!(sink.cycle_count() >= 6);
    task.abort();
}

#[tokio::test]
async fn test_end_of_body_triggers_reconnect() {
    let hits = Arc::new(Hits::default());
    let app = Router::new()
        .route("/event", get(short_feed))
        .with_state(hits.clone());
    let base = serve(app).await;

    let store = StateStore::new();
    let sink = Arc::new(Recorder::default());
    let session = Arc::new(session(&base, store.clone(), sink.clone(), retry_every(30)));
    let task = {
        let session = session.clone();
        tokio::spawn(async move { session.run().await })
    };

    let reconnected = wait_for(Duration::from_secs(5), || {
        let hits = hits.clone();
        async move { hits.count() >= 3 }
    })
    .await;
    task.abort();
    assert!(reconnected, "session stopped reconnecting");

    assert_eq!(store.get("volume").await, Some(json!(42)));
    let cycles = sink.cycles.lock().unwrap();
    let forwarded: Vec<_> = cycles
        .iter()
        .flat_map(|(_, events)| events.iter().filter_map(|e| e.kind().map(str::to_owned)))
        .collect();
    assert!(forwarded.iter().all(|kind| kind == "end-file"));
    assert!(!forwarded.is_empty());
}

#[tokio::test]
async fn test_bounded_retries_return_last_error() {
    let hits = Arc::new(Hits::default());
    let app = Router::new()
        .route("/event", get(broken_feed))
        .with_state(hits.clone());
    let base = serve(app).await;

    let sink = Arc::new(Recorder::default());
    let retry = RetryPolicy {
        delay: Duration::from_millis(10),
        max_retries: Some(2),
    };
    let session = session(&base, StateStore::new(), sink.clone(), retry);

    let err = tokio::time::timeout(Duration::from_secs(5), session.run())
        .await
        .expect("session should give up");
    assert!(
        matches!(err, SyncError::Status(code) if code == StatusCode::INTERNAL_SERVER_ERROR),
        "unexpected error: {err}"
    );
    assert_eq!(hits.count(), 3);
    assert_eq!(sink.cycle_count(), 0);
    assert_eq!(*session.subscribe().borrow(), SessionState::Backoff);
}

#[tokio::test]
async fn test_refused_connection_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let retry = RetryPolicy {
        delay: Duration::from_millis(10),
        max_retries: Some(1),
    };
    let session = session(&base, StateStore::new(), Arc::new(Recorder::default()), retry);

    let err = tokio::time::timeout(Duration::from_secs(5), session.run())
        .await
        .expect("session should give up");
    assert!(matches!(err, SyncError::Transport(_)));
}
