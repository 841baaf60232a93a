use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Discriminator value of a property-change notification on the event feed.
pub const PROPERTY_CHANGE: &str = "property-change";

/// Field names the feed uses to name a message's kind.  mpv emits `event`;
/// `kind` is accepted as well.
pub const DISCRIMINATOR_FIELDS: [&str; 2] = ["event", "kind"];

/// Routes served by the bridge.
pub const EVENT_PATH: &str = "/event";
pub const PROPERTY_PATH: &str = "/property";
pub const COMMAND_PATH: &str = "/command";

/// Body of every non-2xx reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// `POST /command` body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandRequest {
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// `POST /property` body: a single-entry object `{ <name>: value }`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyWrite {
    pub name: String,
    pub value: Value,
}

impl PropertyWrite {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert(self.name.clone(), self.value.clone());
        Value::Object(obj)
    }

    /// Accepts only an object with exactly one entry.
    pub fn from_json(value: Value) -> anyhow::Result<Self> {
        let Value::Object(obj) = value else {
            anyhow::bail!("Expected a JSON object");
        };
        if obj.len() != 1 {
            anyhow::bail!("Expected a single property");
        }
        let (name, value) = obj
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Expected a single property"))?;
        Ok(Self { name, value })
    }
}

/// Returns the kind of a feed message, looking at `event` then `kind`.
pub fn message_kind(message: &Value) -> Option<&str> {
    DISCRIMINATOR_FIELDS
        .iter()
        .find_map(|field| message.get(*field).and_then(Value::as_str))
}
