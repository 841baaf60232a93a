use serde_json::Value;
use std::sync::Mutex;

use crate::classifier::GenericEvent;
use crate::store::Snapshot;

/// Consumer of synchronized state (a UI, a logger, a test probe).
///
/// Called from the session and poller tasks; implementations must return
/// quickly and must not fail.
pub trait RenderSink: Send + Sync {
    /// Once per frame cycle, and once when a feed connection comes up (with an
    /// empty batch).
    fn on_state_update(&self, snapshot: &Snapshot, events: &[GenericEvent]);

    /// Once per successful poll tick, scoped to the polled key.
    fn on_property_update(&self, name: &str, value: &Value);
}

/// Prints changed properties and forwarded events to stdout.
#[derive(Default)]
pub struct ConsoleSink {
    last: Mutex<Snapshot>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn stamp() -> String {
        chrono::Local::now().format("%H:%M:%S%.3f").to_string()
    }
}

impl RenderSink for ConsoleSink {
    fn on_state_update(&self, snapshot: &Snapshot, events: &[GenericEvent]) {
        let now = Self::stamp();
        if let Ok(mut last) = self.last.lock() {
            for (name, value) in snapshot {
                if last.get(name) != Some(value) {
                    println!("{} {} = {}", now, name, value);
                }
            }
            *last = snapshot.clone();
        }
        for event in events {
            println!("{} event {}", now, event.raw);
        }
    }

    fn on_property_update(&self, name: &str, value: &Value) {
        if let Ok(mut last) = self.last.lock() {
            if last.get(name) == Some(value) {
                return;
            }
            last.insert(name.to_string(), value.clone());
        }
        println!("{} {} = {}", Self::stamp(), name, value);
    }
}
