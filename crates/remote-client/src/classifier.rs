//! Sorts feed messages into property updates (merged into the store) and
//! everything else (forwarded to the render sink untouched).

use remote_proto::protocol::{message_kind, PROPERTY_CHANGE};
use serde_json::Value;

use crate::error::SyncError;
use crate::store::StateStore;

/// A feed message that is not a value-carrying property change.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericEvent {
    pub raw: Value,
}

impl GenericEvent {
    /// e.g. "file-loaded", "end-file", or "property-change" without data.
    pub fn kind(&self) -> Option<&str> {
        message_kind(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Property { name: String, value: Value },
    Event(GenericEvent),
}

pub fn parse_line(line: &str) -> Result<Value, SyncError> {
    serde_json::from_str(line).map_err(|source| SyncError::MalformedMessage {
        line: line.to_string(),
        source,
    })
}

/// `null` data counts as absent: the property lost its value and there is
/// nothing to store.
pub fn classify(message: Value) -> Classified {
    if message_kind(&message) == Some(PROPERTY_CHANGE) {
        let name = message.get("name").and_then(Value::as_str);
        let data = message.get("data").filter(|d| !d.is_null());
        if let (Some(name), Some(data)) = (name, data) {
            return Classified::Property {
                name: name.to_string(),
                value: data.clone(),
            };
        }
    }
    Classified::Event(GenericEvent { raw: message })
}

/// Runs one frame cycle.  Every line is parsed before anything is applied, so
/// a malformed line leaves the store untouched for the whole batch.  Returns
/// the generic events in feed order.
pub async fn apply_frame(
    store: &StateStore,
    lines: &[String],
) -> Result<Vec<GenericEvent>, SyncError> {
    let messages = lines
        .iter()
        .map(|line| parse_line(line))
        .collect::<Result<Vec<_>, _>>()?;

    let mut events = Vec::new();
    for message in messages {
        match classify(message) {
            Classified::Property { name, value } => store.set(name, value).await,
            Classified::Event(event) => events.push(event),
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_property_change_is_stored_and_suppressed() {
        let store = StateStore::new();
        let events = apply_frame(
            &store,
            &lines(&[r#"{"kind":"property-change","name":"volume","data":42}"#]),
        )
        .await
        .unwrap();
        assert!(events.is_empty());
        assert_eq!(store.get("volume").await, Some(json!(42)));
    }

    #[tokio::test]
    async fn test_mpv_event_field_is_understood() {
        let store = StateStore::new();
        let events = apply_frame(
            &store,
            &lines(&[r#"{"event":"property-change","id":3,"name":"pause","data":true}"#]),
        )
        .await
        .unwrap();
        assert!(events.is_empty());
        assert_eq!(store.get("pause").await, Some(json!(true)));
    }

    #[tokio::test]
    async fn test_absent_data_is_forwarded() {
        let store = StateStore::with_placeholders();
        let before = store.snapshot().await;
        let events = apply_frame(
            &store,
            &lines(&[
                r#"{"event":"property-change","name":"duration"}"#,
                r#"{"event":"property-change","name":"volume","data":null}"#,
            ]),
        )
        .await
        .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), Some("property-change"));
        assert_eq!(store.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_other_kinds_forwarded_verbatim_in_order() {
        let store = StateStore::new();
        let events = apply_frame(
            &store,
            &lines(&[
                r#"{"event":"start-file","playlist_entry_id":1}"#,
                r#"{"event":"property-change","name":"mute","data":false}"#,
                r#"{"event":"end-file","reason":"eof"}"#,
            ]),
        )
        .await
        .unwrap();
        let kinds: Vec<_> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![Some("start-file"), Some("end-file")]);
        assert_eq!(events[1].raw, json!({"event":"end-file","reason":"eof"}));
        assert_eq!(store.get("mute").await, Some(json!(false)));
    }

    #[tokio::test]
    async fn test_later_message_in_batch_wins() {
        let store = StateStore::new();
        apply_frame(
            &store,
            &lines(&[
                r#"{"event":"property-change","name":"volume","data":10}"#,
                r#"{"event":"property-change","name":"volume","data":90}"#,
            ]),
        )
        .await
        .unwrap();
        assert_eq!(store.get("volume").await, Some(json!(90)));
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let msg = lines(&[r#"{"event":"property-change","name":"playlist","data":[{"filename":"a.mkv"}]}"#]);
        let once = StateStore::new();
        apply_frame(&once, &msg).await.unwrap();
        let twice = StateStore::new();
        apply_frame(&twice, &msg).await.unwrap();
        apply_frame(&twice, &msg).await.unwrap();
        assert_eq!(once.snapshot().await, twice.snapshot().await);
    }

    #[tokio::test]
    async fn test_malformed_line_rejects_whole_batch() {
        let store = StateStore::new();
        let err = apply_frame(
            &store,
            &lines(&[
                r#"{"event":"property-change","name":"volume","data":5}"#,
                r#"{"event":"prop"#,
            ]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::MalformedMessage { .. }));
        assert_eq!(store.get("volume").await, None);
    }

    #[test]
    fn test_property_change_without_name_is_an_event() {
        let classified = classify(json!({"event":"property-change","data":1}));
        assert!(matches!(classified, Classified::Event(_)));
    }
}
