//! Wire-level events for the persistent push connection.
//!
//! JSON framing is `{"event": "...", "data": ...}` with camelCase payload
//! fields, matching what browser clients already speak.

use serde::{Deserialize, Serialize};

use crate::db::models::Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        sender_id: String,
        receiver_id: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    DeleteMessage {
        message_id: String,
        sender_id: String,
    },
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full online-user-id set, broadcast on every connect/disconnect.
    GetOnlineUsers(Vec<String>),
    /// Pushed to the receiver's live connection.
    NewMessage(Message),
    /// Send confirmation to the originating connection.
    MessageSent(Message),
    #[serde(rename_all = "camelCase")]
    MessageSendError {
        message: String,
        details: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    MessageDeleted {
        message_id: String,
        conversation_id: String,
        sender_id: String,
    },
    #[serde(rename_all = "camelCase")]
    MessageDeleteError {
        message: String,
        details: serde_json::Value,
    },
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_parse_wire_format() {
        let raw = r#"{"event":"sendMessage","data":{"senderId":"a","receiverId":"b","message":"hi"}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::SendMessage {
                sender_id,
                receiver_id,
                message,
            } => {
                assert_eq!(sender_id, "a");
                assert_eq!(receiver_id, "b");
                assert_eq!(message, "hi");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let ping: ClientEvent = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert!(matches!(ping, ClientEvent::Ping));
    }

    #[test]
    fn server_events_serialize_wire_format() {
        let event = ServerEvent::MessageDeleted {
            message_id: "m1".to_string(),
            conversation_id: "c1".to_string(),
            sender_id: "a".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "messageDeleted");
        assert_eq!(json["data"]["messageId"], "m1");
        assert_eq!(json["data"]["conversationId"], "c1");

        let online = ServerEvent::GetOnlineUsers(vec!["a".to_string(), "b".to_string()]);
        let json = serde_json::to_value(&online).unwrap();
        assert_eq!(json["event"], "getOnlineUsers");
        assert_eq!(json["data"][0], "a");
    }

    #[test]
    fn message_payload_uses_camel_case() {
        let msg = Message {
            id: "m1".to_string(),
            sender_id: "a".to_string(),
            receiver_id: "b".to_string(),
            body: "hello".to_string(),
            conversation_id: "c1".to_string(),
            created_at: 42,
        };
        let json = serde_json::to_value(ServerEvent::NewMessage(msg)).unwrap();
        assert_eq!(json["event"], "newMessage");
        assert_eq!(json["data"]["senderId"], "a");
        assert_eq!(json["data"]["message"], "hello");
        assert_eq!(json["data"]["createdAt"], 42);
    }
}
