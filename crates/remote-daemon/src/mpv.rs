//! mpv JSON IPC connection with separated reader/writer tasks.
//!
//! ```text
//!   connect(path, events)
//!         │
//!         ├── writer_task   ← PendingRequest via mpsc, one JSON line each → socket
//!         └── reader_task   ← JSON lines from socket
//!                                ├── has request_id → matching oneshot reply
//!                                └── unsolicited event → events channel (if any)
//! ```
//!
//! The bridge keeps one long-lived connection for property reads/writes and
//! commands, and opens one more per `/event` subscriber, because
//! `observe_property` registrations belong to the connection.
//!
//! Unix: domain socket.  Windows: named pipe `\\.\pipe\<name>`.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

const REPLY_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum MpvError {
    #[error("Can't connect to mpv ipc server")]
    Connect(#[source] std::io::Error),
    /// mpv answered with an `error` other than "success".
    #[error("{0}")]
    Command(String),
    #[error("Disconnected from mpv")]
    Disconnected,
    #[error("mpv IPC timeout for req={0}")]
    Timeout(u64),
    #[error("mpv IPC encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

type Reply = oneshot::Sender<Result<Value, MpvError>>;
type PendingMap = Arc<Mutex<HashMap<u64, Reply>>>;

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: Reply,
}

/// A message mpv sent without being asked (event or property-change).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }
}

/// Cloneable handle to one IPC connection.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
    closed: Arc<AtomicBool>,
}

impl MpvHandle {
    /// Sends a command array and returns mpv's `data` (or `"success"` when the
    /// reply has none).
    pub async fn send(&self, command: Value) -> Result<Value, MpvError> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| MpvError::Disconnected)?;

        tokio::time::timeout(
            tokio::time::Duration::from_secs(REPLY_TIMEOUT_SECS),
            reply_rx,
        )
        .await
        .map_err(|_| MpvError::Timeout(req_id))?
        .map_err(|_| MpvError::Disconnected)?
    }

    /// True once either IO task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed() || self.closed.load(Ordering::Relaxed)
    }

    pub async fn get_property(&self, name: &str) -> Result<Value, MpvError> {
        self.send(json!(["get_property", name])).await
    }

    pub async fn observe_property(&self, id: u64, name: &str) -> Result<(), MpvError> {
        self.send(json!(["observe_property", id, name])).await?;
        debug!("mpv: observe_property id={} name={}", id, name);
        Ok(())
    }
}

/// Connects to a running mpv.  Unsolicited events go to `events`, or are
/// dropped when it is `None`.
#[cfg(unix)]
pub async fn connect(
    path: &str,
    events: Option<mpsc::Sender<MpvEvent>>,
) -> Result<MpvHandle, MpvError> {
    let stream = UnixStream::connect(path).await.map_err(MpvError::Connect)?;
    info!("mpv: connected to {}", path);
    let (read_half, write_half) = stream.into_split();
    Ok(start_io_tasks(read_half, write_half, events))
}

#[cfg(windows)]
pub async fn connect(
    path: &str,
    events: Option<mpsc::Sender<MpvEvent>>,
) -> Result<MpvHandle, MpvError> {
    let pipe = ClientOptions::new().open(path).map_err(MpvError::Connect)?;
    info!("mpv: connected to named pipe {}", path);
    let (read_half, write_half) = tokio::io::split(pipe);
    Ok(start_io_tasks(read_half, write_half, events))
}

fn start_io_tasks<R, W>(
    read_half: R,
    write_half: W,
    events: Option<mpsc::Sender<MpvEvent>>,
) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel.  Writer inserts, reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let closed = Arc::new(AtomicBool::new(false));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(
        BufReader::new(read_half),
        pending,
        events,
        closed.clone(),
    ));

    MpvHandle { tx: cmd_tx, closed }
}

async fn fail_pending(pending: &PendingMap) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(MpvError::Disconnected));
    }
}

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: PendingMap,
    events: Option<mpsc::Sender<MpvEvent>>,
    closed: Arc<AtomicBool>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let read = tokio::select! {
            read = reader.read_line(&mut line) => read,
            _ = subscriber_gone(events.as_ref()) => {
                debug!("mpv reader: event subscriber gone");
                break;
            }
        };
        match read {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(Value::as_u64) {
                    let mut map = pending.lock().await;
                    match map.remove(&req_id) {
                        Some(tx) => {
                            let _ = tx.send(reply_result(val));
                        }
                        None => debug!("mpv reader: response for unknown req={}", req_id),
                    }
                } else if let Some(events) = &events {
                    if events.send(MpvEvent { raw: val }).await.is_err() {
                        debug!("mpv reader: event subscriber gone");
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                break;
            }
        }
    }
    closed.store(true, Ordering::Relaxed);
    fail_pending(&pending).await;
}

/// Resolves once the event receiver is dropped.  Never resolves for a
/// connection without one.
async fn subscriber_gone(events: Option<&mpsc::Sender<MpvEvent>>) {
    match events {
        Some(tx) => tx.closed().await,
        None => std::future::pending().await,
    }
}

/// `{"error":"success","data":...}` → data; any other `error` → `Command`.
fn reply_result(mut val: Value) -> Result<Value, MpvError> {
    match val.get("error").and_then(Value::as_str) {
        Some("success") => Ok(match val.get_mut("data") {
            Some(data) => data.take(),
            None => json!("success"),
        }),
        Some(err) => Err(MpvError::Command(err.to_string())),
        None => Err(MpvError::Command("unknown error".to_string())),
    }
}

async fn writer_task<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<PendingRequest>,
    pending: PendingMap,
) where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(MpvError::Disconnected));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}
