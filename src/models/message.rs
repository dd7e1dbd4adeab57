//! Announcement messages

use serde::Serialize;
use serde_json::Value;

use super::{int_field, str_field};

/// One announcement in an organization's log. Append-only: never edited
/// or removed once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub content: String,
    #[serde(rename = "senderId")]
    pub sender: String,
    /// Milliseconds since epoch. Monotonic per sender, not across senders.
    pub timestamp: i64,
}

impl Message {
    /// Decode a raw store document. Never fails; missing or mistyped
    /// fields default to their zero value.
    pub fn from_value(v: &Value) -> Self {
        Self {
            content: str_field(v, "content"),
            sender: str_field(v, "senderId"),
            timestamp: int_field(v, "timestamp"),
        }
    }
}

/// Decode a message-log snapshot. Non-object entries are skipped; a
/// malformed record does not blank out the rest.
pub fn decode_messages(docs: &[Value]) -> Vec<Message> {
    docs.iter()
        .filter(|v| v.is_object())
        .map(Message::from_value)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_defaults_missing_fields() {
        let msg = Message::from_value(&json!({"content": "hello"}));
        assert_eq!(msg.content, "hello");
        assert_eq!(msg.sender, "");
        assert_eq!(msg.timestamp, 0);
    }

    #[test]
    fn test_decode_tolerates_mistyped_fields() {
        let msg = Message::from_value(&json!({
            "content": 42,
            "senderId": ["not", "a", "string"],
            "timestamp": "1700000000123"
        }));
        assert_eq!(msg.content, "");
        assert_eq!(msg.sender, "");
        // Stringified numbers are accepted.
        assert_eq!(msg.timestamp, 1_700_000_000_123);
    }

    #[test]
    fn test_decode_messages_skips_non_objects() {
        let docs = vec![
            json!({"content": "a", "senderId": "u1", "timestamp": 1}),
            json!("garbage"),
            json!({"content": "b", "senderId": "u1", "timestamp": 2}),
        ];
        let msgs = decode_messages(&docs);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "a");
        assert_eq!(msgs[1].content, "b");
    }

    #[test]
    fn test_wire_serialization_field_names() {
        let msg = Message {
            content: "Midterm Friday".into(),
            sender: "u1".into(),
            timestamp: 1234,
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["senderId"], "u1");
        assert_eq!(v["timestamp"], 1234);
    }
}
