use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Point-in-time copy of the property table, ordered by name.
pub type Snapshot = Map<String, Value>;

/// Shared, last-write-wins property table.
///
/// Cloning gives another handle onto the same table.  Writes replace a single
/// key; nothing spans keys and nothing is ever removed.
#[derive(Clone, Default)]
pub struct StateStore {
    props: Arc<RwLock<HashMap<String, Value>>>,
}

impl StateStore {
    /// Empty table.  Every key is unknown until something reports it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table seeded with the placeholders a fresh client starts from.
    pub fn with_placeholders() -> Self {
        let props = [
            ("duration", json!(0)),
            ("mute", json!(false)),
            ("pause", json!(false)),
            ("playlist", json!([])),
            ("time-pos", json!(0)),
            ("track-list", json!([])),
            ("volume", json!(100)),
            ("volume-max", json!(130)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            props: Arc::new(RwLock::new(props)),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.props.read().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.props.write().await.insert(key.into(), value);
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.props
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.props.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.props.read().await.is_empty()
    }
}
