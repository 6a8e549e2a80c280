//! Axum route handlers for the current user.

use axum::{extract::State, Json};

use crate::auth::Identity;
use crate::errors::AppError;
use crate::models::User;
use crate::state::AppState;

/// GET /api/users/me
pub async fn handle_get_me(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<User>, AppError> {
    identity.require_user()?;
    let user = identity
        .load_user(&state.repo)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(user))
}

/// PUT /api/users/me
///
/// Syncs the user record from the session claims.
pub async fn handle_sync_me(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<User>, AppError> {
    let claims = identity.claims().ok_or(AppError::Unauthorized)?;

    let user = state.repo.upsert_user(claims.to_new_user()).await?;

    Ok(Json(user))
}
