//! Live mirror of an mpv property table.
//!
//! ```text
//!   /event ──chunks──▶ FrameDecoder ──lines──▶ classify ──▶ StateStore ──▶ RenderSink
//!                                                   └── generic events ──────┘
//!   /property/time-pos ◀── Poller (every 500 ms) ──▶ StateStore ──▶ RenderSink
//!   /property, /command ◀── RemoteClient (UI actions, never touches the store)
//! ```

pub mod classifier;
pub mod command;
pub mod decoder;
pub mod error;
pub mod poller;
pub mod session;
pub mod sink;
pub mod store;

pub use command::RemoteClient;
pub use error::SyncError;
pub use poller::Poller;
pub use session::{RetryPolicy, Session, SessionState};
pub use sink::RenderSink;
pub use store::StateStore;
