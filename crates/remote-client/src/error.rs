use reqwest::StatusCode;
use thiserror::Error;

/// Everything that can go wrong while mirroring or driving the remote player.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connection refused, read failure, or an unreadable reply.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Non-2xx reply without a usable error body.  Always the case when the
    /// event feed refuses the initial request.
    #[error("request failed with status {0}")]
    Status(StatusCode),

    #[error("malformed message {line:?}: {source}")]
    MalformedMessage {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// The feed body ended.  The feed is infinite, so this is always a failure.
    #[error("event stream ended unexpectedly")]
    UnexpectedTermination,

    #[error("no newline within {limit} buffered bytes")]
    FrameTooLarge { limit: usize },

    /// Structured `{ "error": ... }` reply from the remote side.
    #[error("{0}")]
    Remote(String),
}

impl SyncError {
    pub fn transport<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SyncError::Transport(Box::new(err))
    }

    /// True for the kinds the stream session turns into a reconnect.
    pub fn is_stream_failure(&self) -> bool {
        !matches!(self, SyncError::Remote(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::transport(err)
    }
}
