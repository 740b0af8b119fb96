use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::{RefreshRequest, RegisterRequest, TokenRequest},
    utils::{Password, ValidatedJson},
    AppState,
};

#[tracing::instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .core
        .register_user(&req.email, &Password::new(req.password))
        .await?;

    Ok((StatusCode::CREATED, Json(user.sanitized())))
}

/// Issues a token of the requested kind, or a signed pair when no kind is given.
#[tracing::instrument(skip_all)]
pub async fn token(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<TokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let password = Password::new(req.password);

    let body = match req.kind.as_deref() {
        Some(kind) => {
            let issued = state.core.issue_token(&req.email, &password, kind).await?;
            serde_json::to_value(issued)
        }
        None => {
            let pair = state.core.login(&req.email, &password).await?;
            serde_json::to_value(pair)
        }
    }
    .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode token: {}", e)))?;

    Ok(Json(body))
}

#[tracing::instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let issued = state.core.refresh(&req.refresh_token).await?;
    Ok(Json(issued))
}
