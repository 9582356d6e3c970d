use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub avatar_url: String,
    pub gender: String,
    /// Persisted copy of Presence Table membership, updated best-effort.
    /// May lag the live table briefly; used for display only.
    pub is_online: bool,
    pub last_active_at: i64,
    #[serde(skip_serializing, default)]
    pub password_hash: Vec<u8>,
    #[serde(skip_serializing, default)]
    pub password_salt: Vec<u8>,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: i64,
    pub created_at: i64,
}

/// A two-party conversation. Participants are stored normalized
/// (`participant_a < participant_b`) so the pair is order-independent.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    /// Serialized as `message` to match the wire format.
    #[serde(rename = "message")]
    pub body: String,
    pub conversation_id: String,
    /// Epoch milliseconds at the server when the message was created.
    pub created_at: i64,
}
