use sqlx::{Pool, Sqlite};

use crate::db::models::Message;
use crate::error::AppError;

pub struct MessageRepository;

impl MessageRepository {
    /// Insert a message with a caller-supplied id. Id generation lives in the
    /// delivery engine so both send paths share one generation point.
    pub async fn create(
        pool: &Pool<Sqlite>,
        id: String,
        sender_id: String,
        receiver_id: String,
        body: String,
        conversation_id: String,
        created_at: i64,
    ) -> Result<Message, AppError> {
        sqlx::query(
            r#"
INSERT INTO messages (id, sender_id, receiver_id, body, conversation_id, created_at)
VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&sender_id)
        .bind(&receiver_id)
        .bind(&body)
        .bind(&conversation_id)
        .bind(created_at)
        .execute(pool)
        .await?;

        Ok(Message {
            id,
            sender_id,
            receiver_id,
            body,
            conversation_id,
            created_at,
        })
    }

    pub async fn get_by_id(pool: &Pool<Sqlite>, id: &str) -> Result<Option<Message>, AppError> {
        let message = sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(message)
    }

    /// Messages for a conversation in arrival order. The inner join against
    /// the sequence table silently skips ids whose record no longer exists.
    pub async fn get_for_conversation(
        pool: &Pool<Sqlite>,
        conversation_id: &str,
    ) -> Result<Vec<Message>, AppError> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
SELECT m.id, m.sender_id, m.receiver_id, m.body, m.conversation_id, m.created_at
FROM conversation_messages cm
JOIN messages m ON m.id = cm.message_id
WHERE cm.conversation_id = ?
ORDER BY cm.position ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(pool)
        .await?;

        Ok(messages)
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }
}
