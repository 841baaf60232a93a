use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use remote_proto::config::PollConfig;
use serde_json::Value;
use tracing::{trace, warn};

use crate::command::RemoteClient;
use crate::error::SyncError;
use crate::sink::RenderSink;
use crate::store::StateStore;

/// Fetches one fast-changing property on a timer.  The playback position
/// changes many times a second, so it is kept off the event feed.
pub struct Poller {
    remote: RemoteClient,
    property: String,
    interval: Duration,
    store: StateStore,
    sink: Arc<dyn RenderSink>,
}

impl Poller {
    pub fn new(remote: &RemoteClient, store: StateStore, sink: Arc<dyn RenderSink>) -> Self {
        Self::from_config(remote, &PollConfig::default(), store, sink)
    }

    pub fn from_config(
        remote: &RemoteClient,
        config: &PollConfig,
        store: StateStore,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        Self {
            remote: remote.clone(),
            property: config.property.clone(),
            interval: config.interval(),
            store,
            sink,
        }
    }

    /// Runs until the task is dropped.
    pub async fn run(&self) {
        let remote = &self.remote;
        let name = self.property.as_str();
        poll_loop(
            self.interval,
            name,
            &self.store,
            self.sink.as_ref(),
            move || remote.get_property(name),
        )
        .await
    }
}

/// Wait, fetch, store, notify, repeat.  A failed fetch is logged and the next
/// tick still happens.
pub async fn poll_loop<F, Fut>(
    interval: Duration,
    name: &str,
    store: &StateStore,
    sink: &dyn RenderSink,
    mut fetch: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Value, SyncError>>,
{
    loop {
        tokio::time::sleep(interval).await;
        match fetch().await {
            Ok(value) => {
                trace!("poll {} = {}", name, value);
                store.set(name, value.clone()).await;
                sink.on_property_update(name, &value);
            }
            Err(e) => warn!("poll {}: {}", name, e),
        }
    }
}
