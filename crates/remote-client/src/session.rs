//! Long-lived event feed connection.
//!
//! ```text
//!   Connecting ──2xx──▶ Streaming ──error / end of body──▶ Backoff
//!       ▲                                                    │
//!       └────────────────── retry delay ─────────────────────┘
//! ```
//!
//! There is no terminal state unless the retry policy sets `max_retries`.
//! A connection that stalls without erroring is not detected.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use remote_proto::config::StreamConfig;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::classifier::apply_frame;
use crate::command::RemoteClient;
use crate::decoder::FrameDecoder;
use crate::error::SyncError;
use crate::sink::RenderSink;
use crate::store::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Backoff,
}

/// Fixed-delay reconnection.  No growth, no jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Consecutive failed connections tolerated before `run` returns.
    /// `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(3000),
            max_retries: None,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            delay: config.retry_delay(),
            max_retries: config.max_retries,
        }
    }

    fn gives_up_after(&self, failures: u32) -> bool {
        self.max_retries.is_some_and(|max| failures > max)
    }
}

pub struct Session {
    remote: RemoteClient,
    event_url: String,
    store: StateStore,
    sink: Arc<dyn RenderSink>,
    retry: RetryPolicy,
    frame_limit: Option<usize>,
    state_tx: watch::Sender<SessionState>,
}

impl Session {
    pub fn new(
        remote: &RemoteClient,
        event_path: &str,
        store: StateStore,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Connecting);
        Self {
            remote: remote.clone(),
            event_url: remote.url(event_path),
            store,
            sink,
            retry: RetryPolicy::default(),
            frame_limit: None,
            state_tx,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_frame_limit(mut self, limit: usize) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Connects, streams, backs off, and connects again.  Only returns when
    /// the retry policy gives up, with the error that exhausted it.
    pub async fn run(&self) -> SyncError {
        let mut failures = 0u32;
        loop {
            let (streamed, err) = self.attempt().await;
            if streamed {
                failures = 0;
            }
            failures += 1;

            self.state_tx.send_replace(SessionState::Backoff);
            if self.retry.gives_up_after(failures) {
                warn!("event feed: {}; giving up after {} failures", err, failures);
                return err;
            }
            warn!(
                "event feed: {}; reconnecting in {:?}",
                err, self.retry.delay
            );
            tokio::time::sleep(self.retry.delay).await;
        }
    }

    /// One connection lifetime.  Reports whether the feed reached `Streaming`
    /// and the error that ended it.
    async fn attempt(&self) -> (bool, SyncError) {
        self.state_tx.send_replace(SessionState::Connecting);
        debug!("event feed: connecting to {}", self.event_url);

        let resp = match self.remote.http().get(&self.event_url).send().await {
            Ok(resp) => resp,
            Err(e) => return (false, e.into()),
        };
        let status = resp.status();
        if !status.is_success() {
            return (false, SyncError::Status(status));
        }

        info!("event feed: connected");
        self.state_tx.send_replace(SessionState::Streaming);
        let snapshot = self.store.snapshot().await;
        self.sink.on_state_update(&snapshot, &[]);

        let mut decoder = match self.frame_limit {
            Some(limit) => FrameDecoder::with_limit(limit),
            None => FrameDecoder::new(),
        };
        let err = drive_feed(
            resp.bytes_stream(),
            &mut decoder,
            &self.store,
            self.sink.as_ref(),
        )
        .await;
        (true, err)
    }
}

/// Pumps a feed body through decoder, classifier and store, notifying the
/// sink once per frame cycle.  Always ends in an error: a read failure, a
/// malformed line, an oversized frame, or the body running out.
pub async fn drive_feed<S, B, E>(
    body: S,
    decoder: &mut FrameDecoder,
    store: &StateStore,
    sink: &dyn RenderSink,
) -> SyncError
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut body = std::pin::pin!(body);

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => return SyncError::transport(e),
        };
        let lines = match decoder.push(chunk.as_ref()) {
            Ok(Some(lines)) => lines,
            Ok(None) => continue,
            Err(e) => return e,
        };
        let events = match apply_frame(store, &lines).await {
            Ok(events) => events,
            Err(e) => return e,
        };
        debug!(
            "event feed: frame of {} lines, {} events forwarded",
            lines.len(),
            events.len()
        );
        let snapshot = store.snapshot().await;
        sink.on_state_update(&snapshot, &events);
    }

    if decoder.pending() > 0 {
        debug!(
            "event feed: dropping {} bytes of unterminated line",
            decoder.pending()
        );
    }
    SyncError::UnexpectedTermination
}
