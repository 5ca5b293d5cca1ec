use std::collections::HashMap;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub enum MessageDirection {
    #[default]
    Incoming,
    Outgoing,
}

/// One unit of communication, inbound or outbound.
///
/// A message is created by a backend (inbound) or by application logic
/// (outbound) and is owned by exactly one dispatch call at a time. The
/// `backend` field names the backend the message belongs to; for outgoing
/// messages this decides where `send` is routed. Applications attach any
/// per-phase state they need in `metadata`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct Message {
    pub id: String,                       // Unique ID (UUID or backend-provided)
    pub direction: MessageDirection,      // Incoming or Outgoing
    pub timestamp: DateTime<Utc>,         // When it was sent or received
    pub backend: String,                  // Owning backend, e.g. "gsm0", "http"
    pub from: Option<String>,             // Sender identity (phone number, handle)
    pub to: Option<String>,               // Recipient identity
    pub text: String,                     // Payload text
    pub metadata: HashMap<String, Value>, // Per-phase state attached by apps
}

impl Message {
    /// A fresh inbound message as a backend would hand it to the router.
    pub fn incoming(backend: &str, from: Option<String>, text: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            direction: MessageDirection::Incoming,
            timestamp: Utc::now(),
            backend: backend.to_string(),
            from,
            to: None,
            text: text.to_string(),
            metadata: HashMap::new(),
        }
    }

    /// A fresh outbound message bound to `backend`.
    pub fn outgoing(backend: &str, to: Option<String>, text: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            direction: MessageDirection::Outgoing,
            timestamp: Utc::now(),
            backend: backend.to_string(),
            from: None,
            to,
            text: text.to_string(),
            metadata: HashMap::new(),
        }
    }

    /// An outbound reply to this message on the same backend, addressed to
    /// the original sender.
    pub fn reply(&self, text: &str) -> Self {
        Self::outgoing(&self.backend, self.from.clone(), text)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.metadata.get(name)
    }

    pub fn set(&mut self, name: String, value: Value) {
        self.metadata.insert(name, value);
    }

    pub fn remove(&mut self, name: &str) {
        self.metadata.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_incoming_message_creation() {
        let msg = Message::incoming("gsm0", Some("+45550001".into()), "hello");
        assert_eq!(msg.backend, "gsm0");
        assert_eq!(msg.direction, MessageDirection::Incoming);
        assert_eq!(msg.text, "hello");
        assert!(msg.metadata.is_empty());
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn test_reply_targets_original_sender() {
        let msg = Message::incoming("gsm0", Some("+45550001".into()), "ping");
        let reply = msg.reply("pong");
        assert_eq!(reply.backend, "gsm0");
        assert_eq!(reply.to, Some("+45550001".to_string()));
        assert_eq!(reply.direction, MessageDirection::Outgoing);
        assert_ne!(reply.id, msg.id);
    }

    #[test]
    fn test_set_and_get_metadata() {
        let mut msg = Message::incoming("gsm0", None, "");
        msg.set("lang".to_string(), json!("en"));

        assert_eq!(msg.get("lang"), Some(&json!("en")));
        assert_eq!(msg.get("missing"), None);
    }

    #[test]
    fn test_remove_metadata() {
        let mut msg = Message::incoming("gsm0", None, "");
        msg.set("to_remove".to_string(), json!("bye"));

        assert!(msg.get("to_remove").is_some());
        msg.remove("to_remove");
        assert!(msg.get("to_remove").is_none());
    }

    #[test]
    fn test_metadata_overwrite() {
        let mut msg = Message::incoming("gsm0", None, "");
        msg.set("key".to_string(), json!("first"));
        msg.set("key".to_string(), json!("second"));

        assert_eq!(msg.get("key"), Some(&json!("second")));
    }
}
