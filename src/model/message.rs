use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of inbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Message,
    Broadcast,
    ShutdownRequest,
    ShutdownApproved,
    PlanApproved,
    PlanRejected,
}

/// One entry in a per-agent inbox (`teams/<team>/inboxes/<agent>.json`).
///
/// The uuid `id` lets clients deduplicate across retries; ordering within an
/// inbox is by insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub color: String,
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at_ms: Option<i64>,
}

impl InboxMessage {
    pub fn new(
        from: &str,
        to: &str,
        kind: MessageType,
        content: &str,
        summary: Option<String>,
        color: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            kind,
            content: content.to_string(),
            summary,
            color: color.to_string(),
            timestamp_ms: crate::model::now_ms(),
            read_at_ms: None,
        }
    }

    pub fn is_unread(&self) -> bool {
        self.read_at_ms.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_are_unique() {
        let a = InboxMessage::new("lead", "r1", MessageType::Message, "ping", None, "blue");
        let b = InboxMessage::new("lead", "r1", MessageType::Message, "ping", None, "blue");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_wire_format() {
        let msg = InboxMessage::new(
            "lead",
            "r1",
            MessageType::ShutdownRequest,
            "please stop",
            Some("shutdown".into()),
            "blue",
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "shutdown_request");
        assert_eq!(json["from"], "lead");
        assert_eq!(json["summary"], "shutdown");
        // Unread: readAtMs must be absent, not null.
        assert!(json.get("readAtMs").is_none());

        let back: InboxMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_read_marker() {
        let mut msg = InboxMessage::new("lead", "r1", MessageType::Message, "hi", None, "blue");
        assert!(msg.is_unread());
        msg.read_at_ms = Some(crate::model::now_ms());
        assert!(!msg.is_unread());
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("readAtMs").is_some());
    }
}
