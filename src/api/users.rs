use axum::{extract::State, Extension, Json};

use crate::api::state::AppState;
use crate::db::{models::User, UserRepository};
use crate::error::AppError;

/// GET /api/users (requires auth) - everyone except the requester, for the
/// contact sidebar. Credentials are stripped by the serializer.
pub async fn get_other_users(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
) -> Result<Json<Vec<User>>, AppError> {
    let users = UserRepository::get_others(&state.db, &user_id).await?;
    Ok(Json(users))
}
