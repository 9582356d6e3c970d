use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::db::models::User;
use crate::error::AppError;

pub struct UserRepository;

impl UserRepository {
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        pool: &Pool<Sqlite>,
        username: String,
        full_name: String,
        gender: String,
        avatar_url: String,
        password_hash: &[u8; 32],
        password_salt: &[u8; 32],
    ) -> Result<User, AppError> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();

        let user = sqlx::query_as::<_, User>(
            r#"
INSERT INTO users (id, username, full_name, avatar_url, gender, is_online,
                   last_active_at, password_hash, password_salt, created_at)
VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&username)
        .bind(&full_name)
        .bind(&avatar_url)
        .bind(&gender)
        .bind(now)
        .bind(password_hash.as_slice())
        .bind(password_salt.as_slice())
        .bind(now)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn get_by_username(
        pool: &Pool<Sqlite>,
        username: &str,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    pub async fn get_by_id(pool: &Pool<Sqlite>, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    /// All users except `excluded_id`, for the contact list.
    pub async fn get_others(
        pool: &Pool<Sqlite>,
        excluded_id: &str,
    ) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE id != ? ORDER BY username ASC",
        )
        .bind(excluded_id)
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    /// Update the persisted online flag and last-active timestamp. Callers
    /// treat failures as non-fatal to the connection lifecycle.
    pub async fn set_online(
        pool: &Pool<Sqlite>,
        id: &str,
        online: bool,
    ) -> Result<(), AppError> {
        let now = chrono::Utc::now().timestamp_millis();

        sqlx::query("UPDATE users SET is_online = ?, last_active_at = ? WHERE id = ?")
            .bind(online)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }
}
