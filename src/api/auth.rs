use argon2::Argon2;
use axum::{extract::State, Extension, Json};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::db::{models::User, SessionRepository, UserRepository};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: String,
    pub username: String,
    pub password: String,
    pub confirm_password: String,
    pub gender: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if req.full_name.is_empty()
        || req.username.is_empty()
        || req.password.is_empty()
        || req.gender.is_empty()
    {
        return Err(AppError::InvalidInput("All fields are required".to_string()));
    }
    if req.password != req.confirm_password {
        return Err(AppError::InvalidInput("Passwords do not match".to_string()));
    }
    if UserRepository::get_by_username(&state.db, &req.username)
        .await?
        .is_some()
    {
        return Err(AppError::InvalidInput(
            "Username already exists. Try a different username.".to_string(),
        ));
    }

    let salt = generate_salt();
    let hash = hash_password(&req.password, &salt)?;
    let avatar_url = avatar_for(&req.gender, &req.username);

    let user = UserRepository::create(
        &state.db,
        req.username,
        req.full_name,
        req.gender,
        avatar_url,
        &hash,
        &salt,
    )
    .await?;

    let session =
        SessionRepository::create(&state.db, user.id.clone(), state.config.session_expiry_hours)
            .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");

    Ok(Json(AuthResponse {
        user,
        token: session.token,
    }))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    if req.username.is_empty() || req.password.is_empty() {
        return Err(AppError::InvalidInput("All fields are required".to_string()));
    }

    let user = UserRepository::get_by_username(&state.db, &req.username)
        .await?
        .ok_or_else(|| AppError::Auth("Incorrect username or password".to_string()))?;

    let salt: [u8; 32] = user
        .password_salt
        .as_slice()
        .try_into()
        .map_err(|_| AppError::Internal("Corrupt password salt".to_string()))?;
    let stored: [u8; 32] = user
        .password_hash
        .as_slice()
        .try_into()
        .map_err(|_| AppError::Internal("Corrupt password hash".to_string()))?;

    if !verify_password(&req.password, &stored, &salt)? {
        return Err(AppError::Auth("Incorrect username or password".to_string()));
    }

    let session =
        SessionRepository::create(&state.db, user.id.clone(), state.config.session_expiry_hours)
            .await?;

    Ok(Json(AuthResponse {
        user,
        token: session.token,
    }))
}

/// POST /api/auth/logout (requires auth)
pub async fn logout(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
    headers: axum::http::HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Some(token) = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        SessionRepository::delete(&state.db, token).await?;
    }

    // The push connection going away will re-broadcast presence; this is the
    // lagging persisted copy for display.
    if let Err(e) = UserRepository::set_online(&state.db, &user_id, false).await {
        tracing::warn!(user_id = %user_id, error = %e, "Failed to mark user offline");
    }

    Ok(Json(serde_json::json!({ "message": "Logged out successfully" })))
}

/// GET /api/auth/me (requires auth)
pub async fn me(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
) -> Result<Json<User>, AppError> {
    let user = UserRepository::get_by_id(&state.db, &user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

fn avatar_for(gender: &str, username: &str) -> String {
    let style = if gender == "male" { "boy" } else { "girl" };
    format!(
        "https://avatar.iran.liara.run/public/{}?username={}",
        style, username
    )
}

/// Generate a cryptographically secure random salt
fn generate_salt() -> [u8; 32] {
    rand::thread_rng().gen()
}

/// Hash a password with Argon2id using the provided salt
fn hash_password(password: &str, salt: &[u8]) -> Result<[u8; 32], AppError> {
    let argon2 = Argon2::default();
    let mut hash = [0u8; 32];

    argon2
        .hash_password_into(password.as_bytes(), salt, &mut hash)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

    Ok(hash)
}

fn verify_password(
    password: &str,
    stored_hash: &[u8; 32],
    salt: &[u8],
) -> Result<bool, AppError> {
    let computed = hash_password(password, salt)?;
    Ok(computed == *stored_hash)
}
