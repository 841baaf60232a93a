use crate::mpv::{self, MpvError, MpvHandle};
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures_util::stream;
use remote_proto::config::DaemonConfig;
use remote_proto::protocol::{
    CommandRequest, ErrorBody, PropertyWrite, COMMAND_PATH, EVENT_PATH, PROPERTY_PATH,
};
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared state behind every route: the allow-lists and the lazily
/// (re)opened command connection.
pub struct Bridge {
    config: DaemonConfig,
    conn: Mutex<Option<MpvHandle>>,
}

impl Bridge {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    async fn command_conn(&self) -> Result<MpvHandle, MpvError> {
        let mut conn = self.conn.lock().await;
        if let Some(handle) = conn.as_ref().filter(|h| !h.is_closed()) {
            return Ok(handle.clone());
        }
        let handle = mpv::connect(&self.config.ipc_socket, None).await?;
        *conn = Some(handle.clone());
        Ok(handle)
    }

    async fn run(&self, command: Value) -> Result<Value, ApiError> {
        let handle = self.command_conn().await?;
        Ok(handle.send(command).await?)
    }

    fn check_property(&self, name: &str) -> Result<(), ApiError> {
        if self.config.allowed_properties.iter().any(|p| p == name) {
            Ok(())
        } else {
            Err(ApiError::bad_request(format!("Property '{}' is not allowed", name)))
        }
    }

    fn check_command(&self, name: &str) -> Result<(), ApiError> {
        if self.config.allowed_commands.iter().any(|c| c == name) {
            Ok(())
        } else {
            Err(ApiError::bad_request(format!("Command '{}' is not allowed", name)))
        }
    }

    fn shows_on_osd(&self, name: &str) -> bool {
        self.config.osd_properties.iter().any(|p| p == name)
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<MpvError> for ApiError {
    fn from(err: MpvError) -> Self {
        let status = match err {
            MpvError::Command(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!("HTTP API: mpv request failed: {}", err);
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody::new(self.message))).into_response()
    }
}

/// Text form of a value for `osd-msg-bar set`.
fn osd_text(value: &Value) -> String {
    match value {
        Value::Bool(true) => "yes".to_string(),
        Value::Bool(false) => "no".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn set_command(write: PropertyWrite, osd: bool) -> Value {
    if osd {
        let text = osd_text(&write.value);
        json!(["osd-msg-bar", "set", write.name, text])
    } else {
        json!(["set_property", write.name, write.value])
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))
}

pub fn router(bridge: Arc<Bridge>) -> Router {
    let cors = bridge.config.cors;
    let app = Router::new()
        .route("/property/:name", get(get_property))
        .route(PROPERTY_PATH, post(set_property))
        .route(COMMAND_PATH, post(run_command))
        .route(EVENT_PATH, get(event_feed))
        .with_state(bridge);
    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

pub async fn serve(config: DaemonConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP bridge listening on http://{} (mpv ipc: {})", addr, config.ipc_socket);

    let app = router(Arc::new(Bridge::new(config)));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("HTTP bridge shutting down");
        })
        .await?;
    Ok(())
}

async fn get_property(
    State(bridge): State<Arc<Bridge>>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    bridge.check_property(&name)?;
    let value = bridge.command_conn().await?.get_property(&name).await?;
    let mut body = Map::new();
    body.insert(name, value);
    Ok(Json(Value::Object(body)))
}

async fn set_property(
    State(bridge): State<Arc<Bridge>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let write = PropertyWrite::from_json(parse_body(&body)?)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    bridge.check_property(&write.name)?;
    info!("HTTP API: set {} = {}", write.name, write.value);
    let osd = bridge.shows_on_osd(&write.name);
    bridge.run(set_command(write, osd)).await?;
    Ok(StatusCode::OK)
}

async fn run_command(
    State(bridge): State<Arc<Bridge>>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: CommandRequest = parse_body(&body)?;
    bridge.check_command(&req.cmd)?;
    info!("HTTP API: command {} {:?}", req.cmd, req.args);
    let mut command = vec![json!("osd-msg-bar"), Value::String(req.cmd)];
    command.extend(req.args);
    Ok(Json(bridge.run(Value::Array(command)).await?))
}

/// One IPC connection per subscriber; its observers and events die with the
/// response body.
async fn event_feed(State(bridge): State<Arc<Bridge>>) -> Result<Response, ApiError> {
    let (event_tx, event_rx) = mpsc::channel(256);
    let handle = mpv::connect(&bridge.config.ipc_socket, Some(event_tx)).await?;
    for (idx, name) in bridge.config.observed_properties.iter().enumerate() {
        handle.observe_property(idx as u64 + 1, name).await?;
    }
    info!("HTTP API: event subscriber attached");

    // The handle rides along in the stream state so the writer stays open.
    let lines = stream::unfold((event_rx, handle), |(mut rx, handle)| async move {
        let Some(event) = rx.recv().await else {
            return None;
        };
        debug!("event feed: {}", event.event_name().unwrap_or("?"));
        let mut line = event.raw.to_string();
        line.push('\n');
        Some((Ok::<_, Infallible>(line), (rx, handle)))
    });

    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}
