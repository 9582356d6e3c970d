use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::db::models::Conversation;
use crate::error::AppError;

pub struct ConversationRepository;

/// Order a participant pair so `{A,B}` and `{B,A}` map to the same row.
pub fn normalize_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl ConversationRepository {
    pub async fn find_by_participants(
        pool: &Pool<Sqlite>,
        a: &str,
        b: &str,
    ) -> Result<Option<Conversation>, AppError> {
        let (first, second) = normalize_pair(a, b);

        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE participant_a = ? AND participant_b = ?",
        )
        .bind(first)
        .bind(second)
        .fetch_optional(pool)
        .await?;

        Ok(conversation)
    }

    /// Atomic lookup-or-create for an unordered participant pair. The unique
    /// index on the normalized pair means concurrent first-contact sends race
    /// on the insert, one wins, and the re-select returns the canonical row
    /// for everyone.
    pub async fn find_or_create(
        pool: &Pool<Sqlite>,
        a: &str,
        b: &str,
    ) -> Result<Conversation, AppError> {
        let (first, second) = normalize_pair(a, b);
        let id = Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().timestamp_millis();

        sqlx::query(
            r#"
INSERT INTO conversations (id, participant_a, participant_b, created_at)
VALUES (?, ?, ?, ?)
ON CONFLICT (participant_a, participant_b) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(first)
        .bind(second)
        .bind(created_at)
        .execute(pool)
        .await?;

        let conversation = Self::find_by_participants(pool, first, second)
            .await?
            .ok_or_else(|| {
                AppError::Internal("Conversation missing after find-or-create".to_string())
            })?;

        Ok(conversation)
    }

    /// Append a message id to the conversation's arrival-ordered sequence.
    pub async fn append_message(
        pool: &Pool<Sqlite>,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO conversation_messages (conversation_id, message_id) VALUES (?, ?)",
        )
        .bind(conversation_id)
        .bind(message_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn remove_message(
        pool: &Pool<Sqlite>,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            "DELETE FROM conversation_messages WHERE conversation_id = ? AND message_id = ?",
        )
        .bind(conversation_id)
        .bind(message_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// The raw id sequence in arrival order. Ids may be dangling if a delete
    /// crashed between the sequence update and the record delete.
    pub async fn message_ids(
        pool: &Pool<Sqlite>,
        conversation_id: &str,
    ) -> Result<Vec<String>, AppError> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
SELECT message_id FROM conversation_messages
WHERE conversation_id = ?
ORDER BY position ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(pool)
        .await?;

        Ok(ids)
    }
}
