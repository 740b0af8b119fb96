use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{middleware::AuthUser, AppState};

pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state.core.find_user(user_id).await?;
    Ok(Json(user.sanitized()))
}

/// Deletes the caller's account. Its tokens stop resolving immediately.
pub async fn delete_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.core.delete_user(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Issues a non-expiring opaque token for the caller.
pub async fn create_api_key(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let issued = state.core.issue_api_key(user_id).await?;
    Ok((StatusCode::CREATED, Json(issued)))
}
