//! The delivery engine: validate, persist, locate the recipient's live
//! connection, deduplicate, push, acknowledge.
//!
//! Both the request/response path (`api::chat`) and the push path
//! (`api::ws`) run through [`DeliveryEngine::send`], so persisted state is
//! identical no matter which transport carried the send.

use std::sync::Arc;

use sqlx::{Pool, Sqlite};
use tracing::{debug, warn};

use crate::db::models::Message;
use crate::db::{ConversationRepository, MessageRepository, UserRepository};
use crate::error::AppError;
use crate::realtime::dedup::DedupWindow;
use crate::realtime::events::ServerEvent;
use crate::realtime::presence::PresenceTable;

/// Who may delete a message. The wire-level `deleteMessage` event is a
/// sender-only variant; the request/response surface allows either
/// participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    AnyParticipant,
    SenderOnly,
}

/// Payload broadcast to both participants when a message is removed.
#[derive(Debug, Clone)]
pub struct DeletionNotice {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
}

pub struct DeliveryEngine {
    db: Pool<Sqlite>,
    presence: Arc<PresenceTable>,
    dedup: Arc<DedupWindow>,
}

impl DeliveryEngine {
    pub fn new(db: Pool<Sqlite>, presence: Arc<PresenceTable>, dedup: Arc<DedupWindow>) -> Self {
        Self {
            db,
            presence,
            dedup,
        }
    }

    /// Send a message from `sender_id` to `receiver_id`.
    ///
    /// Validates, resolves the conversation for the unordered pair,
    /// persists message + sequence entry, and pushes `newMessage` to the
    /// receiver's live connection if one exists and the dedup window has
    /// not seen the id. Returns the created message for the caller to
    /// acknowledge the sender with.
    pub async fn send(
        &self,
        sender_id: &str,
        receiver_id: &str,
        body: &str,
    ) -> Result<Message, AppError> {
        if body.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Message content is required".to_string(),
            ));
        }

        UserRepository::get_by_id(&self.db, sender_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Sender {} not found", sender_id)))?;
        UserRepository::get_by_id(&self.db, receiver_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Receiver {} not found", receiver_id)))?;

        let conversation =
            ConversationRepository::find_or_create(&self.db, sender_id, receiver_id).await?;

        // Single id-generation point for both transports: a content hash
        // over (sender, receiver, body, server time).
        let created_at = chrono::Utc::now().timestamp_millis();
        let id = derive_message_id(sender_id, receiver_id, body, created_at);

        let message = MessageRepository::create(
            &self.db,
            id,
            sender_id.to_string(),
            receiver_id.to_string(),
            body.to_string(),
            conversation.id.clone(),
            created_at,
        )
        .await?;
        ConversationRepository::append_message(&self.db, &conversation.id, &message.id).await?;

        self.push_to_receiver(&message).await;

        Ok(message)
    }

    /// Push `newMessage` to the receiver if connected. Fire-and-forget: a
    /// missing or stale connection is a no-op, never an error.
    async fn push_to_receiver(&self, message: &Message) {
        let Some(tx) = self.presence.lookup(&message.receiver_id).await else {
            debug!(
                receiver_id = %message.receiver_id,
                "Receiver offline, skipping push"
            );
            return;
        };

        if !self.dedup.should_deliver(&message.id).await {
            debug!(message_id = %message.id, "Already delivered, skipping push");
            return;
        }

        if tx.send(ServerEvent::NewMessage(message.clone())).is_err() {
            debug!(
                receiver_id = %message.receiver_id,
                "Receiver connection closed mid-push"
            );
        }
    }

    /// Delete a message on behalf of `requester_id`.
    ///
    /// The sequence entry is removed before the record; a crash in between
    /// leaves a dangling id that read paths skip. Both participants' live
    /// connections are notified if present.
    pub async fn delete(
        &self,
        requester_id: &str,
        message_id: &str,
        scope: DeleteScope,
    ) -> Result<DeletionNotice, AppError> {
        let message = MessageRepository::get_by_id(&self.db, message_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Message {} not found", message_id)))?;

        let authorized = match scope {
            DeleteScope::SenderOnly => message.sender_id == requester_id,
            DeleteScope::AnyParticipant => {
                message.sender_id == requester_id || message.receiver_id == requester_id
            }
        };
        if !authorized {
            return Err(AppError::Forbidden(
                "Not authorized to delete this message".to_string(),
            ));
        }

        ConversationRepository::remove_message(&self.db, &message.conversation_id, message_id)
            .await?;
        MessageRepository::delete(&self.db, message_id).await?;

        let notice = DeletionNotice {
            message_id: message_id.to_string(),
            conversation_id: message.conversation_id.clone(),
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id.clone(),
        };
        self.notify_deletion(&notice).await;

        Ok(notice)
    }

    async fn notify_deletion(&self, notice: &DeletionNotice) {
        let event = ServerEvent::MessageDeleted {
            message_id: notice.message_id.clone(),
            conversation_id: notice.conversation_id.clone(),
            sender_id: notice.sender_id.clone(),
        };

        for user_id in [&notice.sender_id, &notice.receiver_id] {
            if let Some(tx) = self.presence.lookup(user_id).await {
                if tx.send(event.clone()).is_err() {
                    warn!(user_id = %user_id, "Failed to notify deletion, connection closed");
                }
            }
        }
    }

    /// Conversation history between two users, arrival-ordered. Empty when
    /// no conversation exists yet.
    pub async fn history(&self, user_id: &str, peer_id: &str) -> Result<Vec<Message>, AppError> {
        let Some(conversation) =
            ConversationRepository::find_by_participants(&self.db, user_id, peer_id).await?
        else {
            return Ok(Vec::new());
        };

        MessageRepository::get_for_conversation(&self.db, &conversation.id).await
    }
}

/// Content-derived message id: blake3 over the send's identifying fields
/// plus the server timestamp, so retries of identical fields at the same
/// instant collapse while unrelated sends never collide.
fn derive_message_id(sender_id: &str, receiver_id: &str, body: &str, at_millis: i64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(sender_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(receiver_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(body.as_bytes());
    hasher.update(b"\x00");
    hasher.update(&at_millis.to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_ids_differ_across_inputs() {
        let a = derive_message_id("u1", "u2", "hi", 1000);
        let b = derive_message_id("u1", "u2", "hi", 1001);
        let c = derive_message_id("u2", "u1", "hi", 1000);
        let d = derive_message_id("u1", "u2", "hi!", 1000);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn message_id_is_deterministic() {
        let a = derive_message_id("u1", "u2", "hi", 1000);
        let b = derive_message_id("u1", "u2", "hi", 1000);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
